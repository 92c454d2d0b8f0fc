//! strelka-frontend - gRPC ingress for a distributed file-scanning cluster

use clap::Parser;
use strelka_frontend::broker::{Coordinator, Gatekeeper};
use strelka_frontend::config::{CliArgs, FrontendConfig, SinkMode};
use strelka_frontend::response;
use strelka_frontend::server::{self, FrontendService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strelka_frontend=info".parse()?),
        )
        .init();

    let args = CliArgs::parse();
    let conf = FrontendConfig::load(&args.config)?;
    let addr = conf.listen_addr()?;

    let mode = conf.response.mode()?;
    match &mode {
        SinkMode::Log(path) => {
            tracing::info!(path = %path.display(), "responses will be logged")
        }
        SinkMode::Report(interval) => {
            tracing::info!(interval_secs = interval.as_secs(), "responses will be reported")
        }
        SinkMode::Discard => tracing::info!("responses will be discarded"),
    }
    let (responses, _sink) = response::spawn(mode);

    let coordinator = Coordinator::connect(&conf.coordinator).await?;
    tracing::info!(
        addr = %conf.coordinator.addr,
        pool = conf.coordinator.pool,
        "connected to coordinator"
    );

    let gatekeeper = match &conf.gatekeeper {
        Some(gk) => {
            let gate = Gatekeeper::connect(gk).await?;
            tracing::info!(addr = %gk.addr, ttl_secs = gk.ttl, "connected to gatekeeper");
            Some(gate)
        }
        None => {
            tracing::info!("no gatekeeper configured, result caching disabled");
            None
        }
    };

    let service = FrontendService::new(coordinator, gatekeeper, responses);
    tracing::info!(%addr, "serving");
    server::serve(addr, service).await?;

    Ok(())
}
