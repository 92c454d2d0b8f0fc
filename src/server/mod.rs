//! gRPC server surface
//!
//! One tonic service wires the four streaming session flows; the health
//! probe lives in its own service. Each handler snapshots the RPC deadline
//! from the `grpc-timeout` header, spawns the session task, and hands back
//! the receiving half of its outbound stream. A missing deadline completes
//! the RPC immediately with an empty stream.

pub mod health;

use crate::broker::{Coordinator, Gatekeeper};
use crate::proto::strelka::frontend_server::{Frontend, FrontendServer};
use crate::proto::strelka::{
    CompileYaraRequest, CompileYaraResponse, ScanRequest, ScanResponse, ShouldUpdateYaraRequest,
    ShouldUpdateYaraResponse, SyncYaraRequest, SyncYaraResponse,
};
use crate::session::{rules, scan, Session};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::CompressionEncoding;
use tonic::metadata::MetadataMap;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

/// Outbound stream buffer per RPC.
const STREAM_BUFFER: usize = 16;

/// The frontend gRPC service.
#[derive(Clone)]
pub struct FrontendService {
    coordinator: Coordinator,
    gatekeeper: Option<Gatekeeper>,
    responses: mpsc::Sender<ScanResponse>,
}

impl FrontendService {
    pub fn new(
        coordinator: Coordinator,
        gatekeeper: Option<Gatekeeper>,
        responses: mpsc::Sender<ScanResponse>,
    ) -> Self {
        Self {
            coordinator,
            gatekeeper,
            responses,
        }
    }

    /// Wrap the service for registration, with gzip accepted inbound.
    pub fn into_server(self) -> FrontendServer<Self> {
        FrontendServer::new(self).accept_compressed(CompressionEncoding::Gzip)
    }
}

#[tonic::async_trait]
impl Frontend for FrontendService {
    type ScanFileStream = ReceiverStream<Result<ScanResponse, Status>>;

    async fn scan_file(
        &self,
        request: Request<Streaming<ScanRequest>>,
    ) -> Result<Response<Self::ScanFileStream>, Status> {
        let deadline = rpc_deadline(request.metadata());
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        if let Some(deadline) = deadline {
            let svc = self.clone();
            tokio::spawn(async move {
                let session = Session::new(deadline);
                if let Err(status) = scan::run(
                    svc.coordinator,
                    svc.gatekeeper,
                    svc.responses,
                    inbound,
                    session,
                    tx.clone(),
                )
                .await
                {
                    let _ = tx.send(Err(status)).await;
                }
            });
        }

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type CompileYaraStream = ReceiverStream<Result<CompileYaraResponse, Status>>;

    async fn compile_yara(
        &self,
        request: Request<Streaming<CompileYaraRequest>>,
    ) -> Result<Response<Self::CompileYaraStream>, Status> {
        let deadline = rpc_deadline(request.metadata());
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        if let Some(deadline) = deadline {
            let coordinator = self.coordinator.clone();
            tokio::spawn(async move {
                let session = Session::new(deadline);
                if let Err(status) = rules::compile(coordinator, inbound, session, tx.clone()).await
                {
                    let _ = tx.send(Err(status)).await;
                }
            });
        }

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type SyncYaraStream = ReceiverStream<Result<SyncYaraResponse, Status>>;

    async fn sync_yara(
        &self,
        request: Request<Streaming<SyncYaraRequest>>,
    ) -> Result<Response<Self::SyncYaraStream>, Status> {
        let deadline = rpc_deadline(request.metadata());
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        if let Some(deadline) = deadline {
            let coordinator = self.coordinator.clone();
            tokio::spawn(async move {
                let session = Session::new(deadline);
                if let Err(status) = rules::sync(coordinator, inbound, session, tx.clone()).await {
                    let _ = tx.send(Err(status)).await;
                }
            });
        }

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type ShouldUpdateYaraStream = ReceiverStream<Result<ShouldUpdateYaraResponse, Status>>;

    async fn should_update_yara(
        &self,
        request: Request<Streaming<ShouldUpdateYaraRequest>>,
    ) -> Result<Response<Self::ShouldUpdateYaraStream>, Status> {
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if let Err(status) = rules::should_update(coordinator, inbound, tx.clone()).await {
                let _ = tx.send(Err(status)).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Serve the frontend and health services until the process is stopped.
pub async fn serve(
    addr: SocketAddr,
    service: FrontendService,
) -> Result<(), tonic::transport::Error> {
    Server::builder()
        .add_service(service.into_server())
        .add_service(health::service())
        .serve(addr)
        .await
}

/// Absolute deadline for an RPC, from its `grpc-timeout` header.
pub(crate) fn rpc_deadline(metadata: &MetadataMap) -> Option<DateTime<Utc>> {
    let raw = metadata.get("grpc-timeout")?.to_str().ok()?;
    let timeout = parse_grpc_timeout(raw)?;
    Utc::now().checked_add_signed(chrono::Duration::from_std(timeout).ok()?)
}

/// Parse a `grpc-timeout` header value: ASCII digits followed by one unit
/// letter (`H`, `M`, `S`, `m`, `u`, `n`).
fn parse_grpc_timeout(raw: &str) -> Option<Duration> {
    if raw.len() < 2 {
        return None;
    }
    let (value, unit) = raw.split_at(raw.len() - 1);
    let value: u64 = value.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        "M" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "S" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_millis(value)),
        "u" => Some(Duration::from_micros(value)),
        "n" => Some(Duration::from_nanos(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("2M"), Some(Duration::from_secs(120)));
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("10u"), Some(Duration::from_micros(10)));
        assert_eq!(parse_grpc_timeout("99n"), Some(Duration::from_nanos(99)));
    }

    #[test]
    fn test_parse_grpc_timeout_rejects_garbage() {
        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("12"), None);
        assert_eq!(parse_grpc_timeout("-5S"), None);
        assert_eq!(parse_grpc_timeout("5X"), None);
        assert_eq!(parse_grpc_timeout("1.5S"), None);
    }

    #[test]
    fn test_rpc_deadline_absent_without_header() {
        let metadata = MetadataMap::new();
        assert!(rpc_deadline(&metadata).is_none());
    }

    #[test]
    fn test_rpc_deadline_from_header() {
        let mut metadata = MetadataMap::new();
        metadata.insert("grpc-timeout", "60S".parse().unwrap());

        let deadline = rpc_deadline(&metadata).unwrap();
        let remaining = deadline - Utc::now();
        assert!(remaining.num_seconds() > 50);
        assert!(remaining.num_seconds() <= 60);
    }
}
