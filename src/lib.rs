//! strelka-frontend - Frontend dispatch service for a distributed
//! file-scanning cluster
//!
//! Clients open a streaming RPC, upload a file in chunks, and receive a
//! stream of scan events produced by backend workers. The frontend itself
//! never scans anything: it is the ingress, deduplication, and
//! result-fan-back layer between gRPC clients and a pool of scanners that
//! communicate exclusively through a Redis-compatible broker.
//!
//! # Architecture
//!
//! ```text
//! ┌────────┐   stream    ┌────────────────────┐  RPUSH data:<id>   ┌─────────────┐
//! │ client ├────────────▶│ session controller │───────────────────▶│ coordinator │
//! └───┬────┘             │   (one per RPC)    │  ZADD tasks        │   broker    │
//!     ▲                  └─────┬────────┬─────┘                    └──────┬──────┘
//!     │                        │        │ BLPOP event:<id>                │
//!     │     LRANGE hash:<sha>  │        └────────────────────────────────┤
//!     │                  ┌─────▼──────┐                           ┌──────▼──────┐
//!     │                  │ gatekeeper │                           │   backend   │
//!     │                  │  (cache)   │                           │   workers   │
//!     │                  └────────────┘                           └──────┬──────┘
//!     └────────────────────────── scan events ◀──────────────────────────┘
//! ```
//!
//! All cross-process state lives in the broker, so frontend replicas scale
//! horizontally without peer awareness. Content that was already scanned
//! is answered straight from the gatekeeper's content-addressed cache
//! without dispatching a task.

pub mod broker;
pub mod config;
pub mod envelope;
pub mod error;
pub mod proto;
pub mod response;
pub mod server;
pub mod session;

pub use config::{CliArgs, FrontendConfig};
pub use error::{FrontendError, Result};
