//! Error types for strelka-frontend
//!
//! Split by domain:
//! - Broker (Redis) transport and protocol errors
//! - Configuration errors
//!
//! Session flows speak `tonic::Status` at the RPC boundary; broker errors
//! convert into statuses at that seam.

use std::path::PathBuf;
use thiserror::Error;
use tonic::Status;

/// Top-level error type for strelka-frontend
#[derive(Error, Debug)]
pub enum FrontendError {
    /// Broker (Redis) errors
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broker (Redis) errors
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Connection or readiness probe failed
    #[error("failed to connect to broker at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A reply did not have the shape the broker protocol promises
    #[error("malformed broker reply: expected {expected} elements, got {got}")]
    MalformedReply { expected: usize, got: usize },

    /// Redis error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl BrokerError {
    /// Whether a drain loop may back off and retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Redis(_))
    }
}

impl From<BrokerError> for Status {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::MalformedReply { .. } => Status::internal(err.to_string()),
            _ => Status::unavailable(err.to_string()),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config document did not parse
    #[error("invalid config: {0}")]
    Invalid(#[from] serde_yaml::Error),

    /// Both response sinks were configured at once
    #[error("response.log and response.report are mutually exclusive")]
    AmbiguousResponseMode,

    /// Listen address did not parse
    #[error("invalid listen address '{addr}': {reason}")]
    InvalidListenAddr { addr: String, reason: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FrontendError>;

/// Result type for broker operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
