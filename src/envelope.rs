//! Scan event envelope
//!
//! Every event sent to a client carries a server-stamped `request` block;
//! backend-produced fields are layered on top by shallow JSON merge. The
//! envelope persists for the life of a session, so top-level fields set by
//! an earlier event remain visible in later ones unless overwritten.

use crate::proto::strelka::Attributes;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Server-stamped request block embedded in every outbound event.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStamp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributesStamp>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Unix second of dispatch
    pub time: i64,
}

/// Client-supplied attributes as they appear inside the request block.
#[derive(Debug, Clone, Serialize)]
pub struct AttributesStamp {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub org_id: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl From<&Attributes> for AttributesStamp {
    fn from(attr: &Attributes) -> Self {
        Self {
            org_id: attr.org_id.clone(),
            metadata: attr.metadata.clone(),
        }
    }
}

/// Mutable event envelope for one session.
pub struct EventEnvelope {
    fields: Map<String, Value>,
}

impl EventEnvelope {
    /// Seed an envelope with the request stamp.
    pub fn new(stamp: RequestStamp) -> serde_json::Result<Self> {
        let mut fields = Map::new();
        fields.insert("request".to_string(), serde_json::to_value(stamp)?);
        Ok(Self { fields })
    }

    /// Merge a backend payload into the envelope and serialize the result.
    ///
    /// Top-level keys from the payload overwrite existing keys; keys the
    /// payload does not mention are left as-is.
    pub fn merge(&mut self, payload: &str) -> serde_json::Result<String> {
        let incoming: Map<String, Value> = serde_json::from_str(payload)?;
        for (key, value) in incoming {
            self.fields.insert(key, value);
        }
        serde_json::to_string(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stamp() -> RequestStamp {
        RequestStamp {
            attributes: Some(AttributesStamp {
                org_id: "acme".to_string(),
                metadata: HashMap::new(),
            }),
            client: "cli".to_string(),
            id: "req-1".to_string(),
            source: "upload".to_string(),
            time: 1_700_000_000,
        }
    }

    #[test]
    fn test_stamp_omits_empty_fields() {
        let stamp = RequestStamp {
            attributes: None,
            client: String::new(),
            id: "req-1".to_string(),
            source: String::new(),
            time: 42,
        };
        let value = serde_json::to_value(stamp).unwrap();
        assert_eq!(value, json!({"id": "req-1", "time": 42}));
    }

    #[test]
    fn test_merge_layers_payload_over_stamp() {
        let mut envelope = EventEnvelope::new(stamp()).unwrap();
        let event = envelope.merge(r#"{"scanner":"x","flags":[1,2]}"#).unwrap();

        let parsed: Value = serde_json::from_str(&event).unwrap();
        assert_eq!(parsed["scanner"], "x");
        assert_eq!(parsed["flags"], json!([1, 2]));
        assert_eq!(parsed["request"]["id"], "req-1");
        assert_eq!(parsed["request"]["attributes"]["org_id"], "acme");
    }

    #[test]
    fn test_fields_accumulate_across_events() {
        let mut envelope = EventEnvelope::new(stamp()).unwrap();
        envelope.merge(r#"{"scanner":"x","depth":3}"#).unwrap();
        let second = envelope.merge(r#"{"scanner":"y"}"#).unwrap();

        let parsed: Value = serde_json::from_str(&second).unwrap();
        // overwritten by the second event
        assert_eq!(parsed["scanner"], "y");
        // set by the first event, untouched by the second
        assert_eq!(parsed["depth"], 3);
    }

    #[test]
    fn test_payload_wins_over_request_block() {
        let mut envelope = EventEnvelope::new(stamp()).unwrap();
        let event = envelope.merge(r#"{"request":{"id":"backend"}}"#).unwrap();

        let parsed: Value = serde_json::from_str(&event).unwrap();
        assert_eq!(parsed["request"], json!({"id": "backend"}));
    }

    #[test]
    fn test_non_object_payload_is_an_error() {
        let mut envelope = EventEnvelope::new(stamp()).unwrap();
        assert!(envelope.merge("FIN-ish garbage").is_err());
        assert!(envelope.merge(r#"["not","an","object"]"#).is_err());
    }
}
