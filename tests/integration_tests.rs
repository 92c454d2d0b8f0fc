//! Integration tests for strelka-frontend
//!
//! Note: the session flows require a running broker. These tests cover the
//! broker-free surface: config documents, key derivation, and envelope
//! assembly.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use strelka_frontend::broker;
use strelka_frontend::config::{FrontendConfig, SinkMode};
use strelka_frontend::envelope::{AttributesStamp, EventEnvelope, RequestStamp};
use tempfile::tempdir;

#[test]
fn test_config_round_trip_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frontend.yaml");
    std::fs::write(
        &path,
        r#"
server: "0.0.0.0:57314"
coordinator:
  addr: "coordinator:6379"
  db: 1
gatekeeper:
  addr: "gatekeeper:6379"
  db: 2
  ttl: 1800
response:
  report: 60
"#,
    )
    .unwrap();

    let conf = FrontendConfig::load(&path).unwrap();
    assert_eq!(conf.coordinator.url(), "redis://coordinator:6379/1");

    let gk = conf.gatekeeper.as_ref().unwrap();
    assert_eq!(gk.broker().url(), "redis://gatekeeper:6379/2");
    assert_eq!(
        conf.response.mode().unwrap(),
        SinkMode::Report(std::time::Duration::from_secs(60))
    );
}

#[test]
fn test_config_load_rejects_missing_file() {
    let dir = tempdir().unwrap();
    assert!(FrontendConfig::load(&dir.path().join("absent.yaml")).is_err());
}

#[test]
fn test_config_load_rejects_ambiguous_response() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frontend.yaml");
    std::fs::write(
        &path,
        r#"
server: "0.0.0.0:57314"
coordinator:
  addr: "coordinator:6379"
response:
  log: "/tmp/out.log"
  report: 60
"#,
    )
    .unwrap();

    assert!(FrontendConfig::load(&path).is_err());
}

#[test]
fn test_content_fingerprint_addresses_cache() {
    // The cache key is the SHA-256 of the concatenated upload, chunk order
    // preserved.
    let mut hasher = Sha256::new();
    hasher.update(b"hel");
    hasher.update(b"lo");
    let chunked = broker::cache_key(&hasher.finalize());

    let whole = broker::cache_key(&Sha256::digest(b"hello"));
    assert_eq!(chunked, whole);
    assert!(chunked.starts_with("hash:"));
    assert_eq!(chunked.len(), "hash:".len() + 64);
}

#[test]
fn test_envelope_replays_cached_events_with_fresh_stamp() {
    // A cache hit replays backend payloads under a newly stamped request
    // block; the payload fields ride on top.
    let stamp = RequestStamp {
        attributes: Some(AttributesStamp {
            org_id: "acme".to_string(),
            metadata: HashMap::from([("env".to_string(), "prod".to_string())]),
        }),
        client: "client-1".to_string(),
        id: "req-1".to_string(),
        source: "ingest".to_string(),
        time: 1_700_000_000,
    };
    let mut envelope = EventEnvelope::new(stamp).unwrap();

    let event = envelope.merge(r#"{"scanner":"x"}"#).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&event).unwrap();

    assert_eq!(parsed["scanner"], "x");
    assert_eq!(parsed["request"]["id"], "req-1");
    assert_eq!(parsed["request"]["time"], 1_700_000_000);
    assert_eq!(parsed["request"]["attributes"]["metadata"]["env"], "prod");
}
