//! Gatekeeper broker handle
//!
//! Content-addressed cache of previously emitted scan events. A non-empty
//! list under `hash:<hex>` is a cache hit; on a miss the list is rewritten
//! atomically while the live events stream by.

use crate::config::GatekeeperConfig;
use crate::error::BrokerResult;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

/// Handle to the gatekeeper broker instance.
#[derive(Clone)]
pub struct Gatekeeper {
    conn: MultiplexedConnection,
    ttl: Duration,
}

impl Gatekeeper {
    /// Connect to the gatekeeper and verify readiness.
    pub async fn connect(config: &GatekeeperConfig) -> BrokerResult<Self> {
        let conn = super::open(&config.broker()).await?;
        Ok(Self {
            conn,
            ttl: config.ttl(),
        })
    }

    /// Full cached event list for a fingerprint; empty means miss.
    pub async fn cached_events(&self, key: &str) -> BrokerResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let events: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(events)
    }

    /// Open an atomic rewrite of a cache entry.
    ///
    /// The delete of the old list, every appended event, and the final TTL
    /// are buffered client-side and executed as one MULTI/EXEC at commit,
    /// so a concurrent reader never observes a partially rewritten entry.
    /// Dropping the rewrite without committing sends nothing.
    pub fn begin_rewrite(&self, key: &str) -> CacheRewrite {
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        CacheRewrite {
            conn: self.conn.clone(),
            pipe,
            key: key.to_string(),
            ttl: self.ttl,
        }
    }
}

/// In-flight atomic rewrite of one cache entry.
pub struct CacheRewrite {
    conn: MultiplexedConnection,
    pipe: redis::Pipeline,
    key: String,
    ttl: Duration,
}

impl CacheRewrite {
    /// Queue one event payload for the rewritten list.
    pub fn append(&mut self, payload: &str) {
        self.pipe.rpush(&self.key, payload).ignore();
    }

    /// Apply the TTL and execute the whole rewrite atomically.
    pub async fn commit(mut self) -> BrokerResult<()> {
        self.pipe.expire(&self.key, self.ttl.as_secs() as i64).ignore();
        self.pipe.query_async::<()>(&mut self.conn).await?;
        Ok(())
    }
}
