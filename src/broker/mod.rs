//! Broker client layer
//!
//! Typed handles to two logically distinct Redis instances: the
//! *coordinator* holds task queues and live per-session buffers, the
//! *gatekeeper* holds the content-addressed result cache. All key
//! construction lives here so the keyspace reads in one place.

mod coordinator;
mod gatekeeper;

pub use coordinator::{Batch, Coordinator};
pub use gatekeeper::{CacheRewrite, Gatekeeper};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use redis::aio::MultiplexedConnection;

/// Sorted set of ready scan sessions, scored by deadline-unix-seconds
pub const TASKS_KEY: &str = "tasks";

/// Sorted set of ready rule-compilation sessions
pub const TASKS_COMPILE_KEY: &str = "tasks_compile_yara";

/// Sorted set of ready rule-sync sessions
pub const TASKS_SYNC_KEY: &str = "tasks_compile_and_sync_yara";

/// List of uploaded byte chunks for a session
pub fn data_key(id: &str) -> String {
    format!("data:{id}")
}

/// List of scan events emitted by the backend for a session
pub fn event_key(id: &str) -> String {
    format!("event:{id}")
}

/// Per-session tenant tag
pub fn org_key(id: &str) -> String {
    format!("org_id:{id}")
}

/// Content-addressed cache entry for a fingerprint
pub fn cache_key(digest: &[u8]) -> String {
    format!("hash:{}", hex::encode(digest))
}

/// Rule-source upload list for a compile session
pub fn compile_key(id: &str) -> String {
    format!("yara:compile:{id}")
}

/// Completion queue for a compile session
pub fn compile_done_key(id: &str) -> String {
    format!("yara:compile:done:{id}")
}

/// Rule-entry upload list for a sync session
pub fn sync_key(id: &str) -> String {
    format!("yara:compile_and_sync:{id}")
}

/// Completion queue for a sync session
pub fn sync_done_key(id: &str) -> String {
    format!("yara:compile_and_sync:done:{id}")
}

/// Installed rule-set fingerprint for a tenant
pub fn rules_hash_key(org_id: &str) -> String {
    format!("yara:hash:{org_id}")
}

/// Count of backends that applied the last sync
pub fn synced_count_key(id: &str) -> String {
    format!("yara:synced:{id}")
}

/// Open a multiplexed connection and verify readiness with a PING.
async fn open(config: &BrokerConfig) -> BrokerResult<MultiplexedConnection> {
    let url = config.url();
    let client = redis::Client::open(url.as_str()).map_err(|e| BrokerError::ConnectionFailed {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    let mut conn = tokio::time::timeout(
        config.read_timeout(),
        client.get_multiplexed_async_connection(),
    )
    .await
    .map_err(|_| BrokerError::ConnectionFailed {
        url: url.clone(),
        reason: "connection timed out".to_string(),
    })?
    .map_err(|e| BrokerError::ConnectionFailed {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(|e| BrokerError::ConnectionFailed {
            url,
            reason: e.to_string(),
        })?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn test_session_keys() {
        assert_eq!(data_key("abc"), "data:abc");
        assert_eq!(event_key("abc"), "event:abc");
        assert_eq!(org_key("abc"), "org_id:abc");
    }

    #[test]
    fn test_rule_keys() {
        assert_eq!(compile_key("abc"), "yara:compile:abc");
        assert_eq!(compile_done_key("abc"), "yara:compile:done:abc");
        assert_eq!(sync_key("abc"), "yara:compile_and_sync:abc");
        assert_eq!(sync_done_key("abc"), "yara:compile_and_sync:done:abc");
        assert_eq!(rules_hash_key("acme"), "yara:hash:acme");
        assert_eq!(synced_count_key("abc"), "yara:synced:abc");
    }

    #[test]
    fn test_cache_key_is_lowercase_hex() {
        let digest = Sha256::digest(b"abc");
        assert_eq!(
            cache_key(&digest),
            "hash:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
