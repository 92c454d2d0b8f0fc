//! Configuration for strelka-frontend
//!
//! A single `-c` flag points at a YAML document describing the listen
//! address, the coordinator and (optional) gatekeeper broker instances,
//! and the response sink.

use crate::error::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/strelka/frontend.yaml";

/// Frontend dispatch service for a distributed file-scanning cluster
#[derive(Parser, Debug, Clone)]
#[command(
    name = "strelka-frontend",
    version,
    about = "Frontend dispatch service for a distributed file-scanning cluster",
    long_about = "gRPC ingress for a cluster of backend file scanners.\n\n\
                  Streams uploads into a Redis-backed task queue, short-circuits\n\
                  previously scanned content through a content-addressed cache,\n\
                  and streams scan events back to the client."
)]
pub struct CliArgs {
    /// Path to the frontend config file
    #[arg(short = 'c', value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

/// Top-level frontend configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// gRPC listen address, e.g. "0.0.0.0:57314"
    pub server: String,
    /// Coordinator broker instance (task queues and live buffers)
    pub coordinator: BrokerConfig,
    /// Gatekeeper broker instance (result cache); absent disables caching
    #[serde(default)]
    pub gatekeeper: Option<GatekeeperConfig>,
    /// Response sink selection
    #[serde(default)]
    pub response: ResponseConfig,
}

impl FrontendConfig {
    /// Load and validate a config document from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let conf: Self = serde_yaml::from_str(&raw)?;
        conf.response.mode()?;
        Ok(conf)
    }

    /// Parsed gRPC listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidListenAddr {
                addr: self.server.clone(),
                reason: e.to_string(),
            })
    }
}

/// Connection settings for one broker instance
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Address, host:port
    pub addr: String,
    /// Database index
    #[serde(default)]
    pub db: i64,
    /// Connection pool size
    #[serde(default = "default_pool")]
    pub pool: usize,
    /// Read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
}

impl BrokerConfig {
    /// Redis connection URL for this instance.
    pub fn url(&self) -> String {
        format!("redis://{}/{}", self.addr, self.db)
    }

    /// Read timeout as a duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }
}

fn default_pool() -> usize {
    10
}

fn default_read_timeout() -> u64 {
    5
}

/// Gatekeeper settings: one broker instance plus the cache TTL
#[derive(Debug, Clone, Deserialize)]
pub struct GatekeeperConfig {
    /// Address, host:port
    pub addr: String,
    /// Database index
    #[serde(default)]
    pub db: i64,
    /// Connection pool size
    #[serde(default = "default_pool")]
    pub pool: usize,
    /// Read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    /// TTL applied to cached result lists, in seconds
    pub ttl: u64,
}

impl GatekeeperConfig {
    /// Connection settings for the gatekeeper instance.
    pub fn broker(&self) -> BrokerConfig {
        BrokerConfig {
            addr: self.addr.clone(),
            db: self.db,
            pool: self.pool,
            read_timeout: self.read_timeout,
        }
    }

    /// Cache TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

/// Response sink selection; `log` and `report` are mutually exclusive
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseConfig {
    /// Append every scan event to this file, one JSON object per line
    #[serde(default)]
    pub log: Option<PathBuf>,
    /// Report aggregate event counts at this interval (seconds)
    #[serde(default)]
    pub report: Option<u64>,
}

impl ResponseConfig {
    /// Resolve the configured sink mode.
    pub fn mode(&self) -> Result<SinkMode, ConfigError> {
        match (&self.log, &self.report) {
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousResponseMode),
            (Some(path), None) => Ok(SinkMode::Log(path.clone())),
            (None, Some(secs)) => Ok(SinkMode::Report(Duration::from_secs(*secs))),
            (None, None) => Ok(SinkMode::Discard),
        }
    }
}

/// How emitted scan events are consumed out-of-band
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMode {
    /// Append each event to a file
    Log(PathBuf),
    /// Periodic aggregate reporting
    Report(Duration),
    /// Drain and drop
    Discard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_document() {
        let conf: FrontendConfig = serde_yaml::from_str(
            r#"
server: "0.0.0.0:57314"
coordinator:
  addr: "coordinator:6379"
  db: 0
  pool: 32
  read_timeout: 10
gatekeeper:
  addr: "gatekeeper:6379"
  ttl: 3600
response:
  log: "/var/log/strelka/frontend.log"
"#,
        )
        .unwrap();

        assert_eq!(conf.server, "0.0.0.0:57314");
        assert_eq!(conf.coordinator.addr, "coordinator:6379");
        assert_eq!(conf.coordinator.pool, 32);
        assert_eq!(conf.coordinator.url(), "redis://coordinator:6379/0");

        let gk = conf.gatekeeper.as_ref().unwrap();
        assert_eq!(gk.ttl(), Duration::from_secs(3600));
        assert_eq!(gk.pool, 10); // default

        assert_eq!(
            conf.response.mode().unwrap(),
            SinkMode::Log(PathBuf::from("/var/log/strelka/frontend.log"))
        );
    }

    #[test]
    fn test_minimal_document() {
        let conf: FrontendConfig = serde_yaml::from_str(
            r#"
server: "127.0.0.1:57314"
coordinator:
  addr: "127.0.0.1:6379"
"#,
        )
        .unwrap();

        assert!(conf.gatekeeper.is_none());
        assert_eq!(conf.coordinator.read_timeout(), Duration::from_secs(5));
        assert_eq!(conf.response.mode().unwrap(), SinkMode::Discard);
        assert!(conf.listen_addr().is_ok());
    }

    #[test]
    fn test_ambiguous_response_mode() {
        let response = ResponseConfig {
            log: Some(PathBuf::from("/tmp/out.log")),
            report: Some(30),
        };
        assert!(matches!(
            response.mode(),
            Err(ConfigError::AmbiguousResponseMode)
        ));
    }

    #[test]
    fn test_report_mode() {
        let response = ResponseConfig {
            log: None,
            report: Some(30),
        };
        assert_eq!(
            response.mode().unwrap(),
            SinkMode::Report(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_default_config_path() {
        let args = CliArgs::parse_from(["strelka-frontend"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));

        let args = CliArgs::parse_from(["strelka-frontend", "-c", "custom.yaml"]);
        assert_eq!(args.config, PathBuf::from("custom.yaml"));
    }

    #[test]
    fn test_bad_listen_addr() {
        let conf: FrontendConfig = serde_yaml::from_str(
            r#"
server: "not-an-address"
coordinator:
  addr: "127.0.0.1:6379"
"#,
        )
        .unwrap();
        assert!(matches!(
            conf.listen_addr(),
            Err(ConfigError::InvalidListenAddr { .. })
        ));
    }
}
