//! Liveness probe.

use crate::proto::health::health_check_response::ServingStatus;
use crate::proto::health::health_server::{Health, HealthServer};
use crate::proto::health::{HealthCheckRequest, HealthCheckResponse};
use tonic::{Request, Response, Status};

/// Health service that always reports `SERVING`.
#[derive(Debug, Default, Clone)]
pub struct Liveness;

#[tonic::async_trait]
impl Health for Liveness {
    async fn check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse {
            status: ServingStatus::Serving as i32,
        }))
    }
}

/// Wrap the probe for registration.
pub fn service() -> HealthServer<Liveness> {
    HealthServer::new(Liveness)
}
