//! Example gRPC server reporting to the monitoring backend
//!
//! Run with:
//! APP__NOTIFIER__PROJECT_ID=1 APP__NOTIFIER__PROJECT_KEY=key cargo run --example server

use grpcbrake_api_grpc::{GrpcServer, ServerConfig};
use grpcbrake_common::{init_tracing, AppConfig};
use grpcbrake_infrastructure::{Notifier, NotifierOptions};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.telemetry)?;

    let notifier = Arc::new(Notifier::new(NotifierOptions::from_config(&config.notifier))?);
    let server = GrpcServer::new(ServerConfig::from_app_config(&config)?, Arc::clone(&notifier));

    tracing::info!("Example: grpcurl -plaintext -d '{{}}' localhost:{} grpc.health.v1.Health/Check", config.server.port);

    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    notifier.close(Duration::from_secs(5)).await?;
    Ok(())
}
