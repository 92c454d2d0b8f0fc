//! Generated protocol buffer bindings.

/// Frontend scan and rules surface.
pub mod strelka {
    tonic::include_proto!("strelka");
}

/// Standard gRPC health-check surface.
pub mod health {
    tonic::include_proto!("grpc.health.v1");
}
