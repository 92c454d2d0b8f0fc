//! Coordinator broker handle
//!
//! Wraps a multiplexed Redis connection with the operations the session
//! flows need: pipelined per-frame writes, task-set inserts, blocking
//! event pops, and point reads.

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

/// Handle to the coordinator broker instance.
///
/// Cheap to clone; all clones share the underlying multiplexed connection
/// and are safe for concurrent use across sessions.
#[derive(Clone)]
pub struct Coordinator {
    conn: MultiplexedConnection,
}

impl Coordinator {
    /// Connect to the coordinator and verify readiness.
    pub async fn connect(config: &BrokerConfig) -> BrokerResult<Self> {
        let conn = super::open(config).await?;
        Ok(Self { conn })
    }

    /// Flush one batch of writes as a single pipeline round-trip.
    ///
    /// An empty batch skips the round-trip entirely.
    pub async fn flush(&self, batch: Batch) -> BrokerResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        batch.pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Insert a session into a task set, scored by its deadline.
    pub async fn enqueue_task(&self, queue: &str, id: &str, deadline_unix: i64) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(queue, id, deadline_unix).await?;
        Ok(())
    }

    /// Blocking-pop the next element from an event list.
    ///
    /// Returns `None` when the pop window elapses with no element. A reply
    /// that is not the `[queue, payload]` pair promised by BLPOP is a
    /// protocol error.
    pub async fn pop_event(&self, key: &str, window: Duration) -> BrokerResult<Option<String>> {
        let mut conn = self.conn.clone();
        let reply: Option<Vec<String>> = conn.blpop(key, window.as_secs_f64()).await?;
        match reply {
            None => Ok(None),
            Some(parts) => match <[String; 2]>::try_from(parts) {
                Ok([_queue, payload]) => Ok(Some(payload)),
                Err(parts) => Err(BrokerError::MalformedReply {
                    expected: 2,
                    got: parts.len(),
                }),
            },
        }
    }

    /// Delete a key.
    pub async fn delete(&self, key: &str) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    /// Point-read a key; `None` when absent.
    pub async fn fetch(&self, key: &str) -> BrokerResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}

/// Builder for one pipelined batch of coordinator writes.
///
/// The session flows stage everything one inbound frame produces into a
/// batch and flush it before reading the next frame.
pub struct Batch {
    pipe: redis::Pipeline,
    queued: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            pipe: redis::pipe(),
            queued: 0,
        }
    }

    /// SET a key with a relative expiry.
    ///
    /// SET..EX rejects non-positive expiries, so an already-elapsed TTL is
    /// floored at one second.
    pub fn set_with_ttl(&mut self, key: &str, value: &str, ttl: Duration) {
        self.pipe
            .set_ex(key, value, ttl.as_secs().max(1))
            .ignore();
        self.queued += 1;
    }

    /// RPUSH a byte chunk onto a list.
    pub fn push_chunk(&mut self, key: &str, data: &[u8]) {
        self.pipe.rpush(key, data).ignore();
        self.queued += 1;
    }

    /// RPUSH a string payload onto a list.
    pub fn push_value(&mut self, key: &str, value: &str) {
        self.pipe.rpush(key, value).ignore();
        self.queued += 1;
    }

    /// EXPIREAT a key at an absolute unix second.
    pub fn expire_at(&mut self, key: &str, deadline_unix: i64) {
        self.pipe.expire_at(key, deadline_unix).ignore();
        self.queued += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_tracks_queued_commands() {
        let mut batch = Batch::new();
        assert!(batch.is_empty());

        batch.push_chunk("data:abc", b"hello");
        assert!(!batch.is_empty());

        batch.set_with_ttl("org_id:abc", "acme", Duration::from_secs(60));
        batch.expire_at("data:abc", 1_700_000_000);
        assert_eq!(batch.queued, 3);
    }

    #[test]
    fn test_elapsed_ttl_floors_at_one_second() {
        let mut batch = Batch::new();
        // must not panic or stage an invalid zero expiry
        batch.set_with_ttl("org_id:abc", "acme", Duration::ZERO);
        assert!(!batch.is_empty());
    }
}
