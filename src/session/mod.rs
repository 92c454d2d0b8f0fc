//! Per-RPC session state
//!
//! A session is created when a streaming RPC arrives, owns a freshly
//! minted id plus the deadline snapshotted from the RPC, and is dropped
//! when the RPC completes. No two sessions share mutable state; every
//! broker key a session touches is derived from its id.

pub mod rules;
pub mod scan;

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Sentinel terminating a result or done queue.
pub(crate) const FIN: &str = "FIN";

/// How long one blocking pop against an event queue may wait. A session
/// whose deadline elapses mid-pop still observes it within this window.
pub(crate) const POP_WINDOW: Duration = Duration::from_secs(5);

/// Backoff applied after a transient broker error while draining events.
pub(crate) const POP_ERR_BACKOFF: Duration = Duration::from_millis(250);

/// Identity and deadline for one streaming RPC.
pub struct Session {
    id: String,
    deadline: DateTime<Utc>,
}

impl Session {
    /// Mint a session for an RPC with the given absolute deadline.
    pub fn new(deadline: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            deadline,
        }
    }

    /// Opaque session identifier; broker keys are derived from this even
    /// when the client supplies its own request id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deadline as the unix-second score used by the task sets.
    pub fn deadline_unix(&self) -> i64 {
        self.deadline.timestamp()
    }

    /// Time left until the deadline, floored at zero.
    pub fn time_remaining(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        Utc::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_session_ids_are_unique() {
        let deadline = Utc::now() + TimeDelta::seconds(60);
        let a = Session::new(deadline);
        let b = Session::new(deadline);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_deadline_accessors() {
        let deadline = Utc::now() + TimeDelta::seconds(60);
        let session = Session::new(deadline);

        assert_eq!(session.deadline_unix(), deadline.timestamp());
        assert!(!session.expired());
        assert!(session.time_remaining() > Duration::from_secs(50));
    }

    #[test]
    fn test_elapsed_deadline() {
        let session = Session::new(Utc::now() - TimeDelta::seconds(1));
        assert!(session.expired());
        assert_eq!(session.time_remaining(), Duration::ZERO);
    }
}
