//! gRPC server wiring the monitored health service

use crate::error::{GrpcError, GrpcResult};
use crate::interceptors::{StreamServerInterceptor, UnaryServerInterceptor};
use crate::services::MonitoredHealthService;
use grpcbrake_common::AppConfig;
use grpcbrake_infrastructure::Notifier;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic_health::pb::health_server::HealthServer;
use tracing::info;

/// gRPC server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub addr: SocketAddr,
    /// Maximum concurrent streams
    pub max_concurrent_streams: Option<u32>,
    /// TCP keepalive duration
    pub tcp_keepalive: Option<Duration>,
    /// Request timeout
    pub timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            max_concurrent_streams: Some(1000),
            tcp_keepalive: Some(Duration::from_secs(60)),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ServerConfig {
    /// Build from the application configuration
    pub fn from_app_config(config: &AppConfig) -> GrpcResult<Self> {
        let addr = config
            .server_addr()
            .map_err(|e| GrpcError::Configuration(format!("{:#}", e)))?;

        Ok(Self {
            addr,
            timeout: config.server.request_timeout(),
            ..Default::default()
        })
    }
}

/// gRPC server
pub struct GrpcServer {
    config: ServerConfig,
    health: MonitoredHealthService,
}

impl GrpcServer {
    /// Create a server reporting to `notifier`
    pub fn new(config: ServerConfig, notifier: Arc<Notifier>) -> Self {
        let health = MonitoredHealthService::new(
            UnaryServerInterceptor::new(Arc::clone(&notifier)),
            StreamServerInterceptor::new(notifier),
        );
        Self { config, health }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle for updating serving statuses while the server runs
    pub fn health(&self) -> MonitoredHealthService {
        self.health.clone()
    }

    /// Serve until the process is stopped
    pub async fn serve(self) -> GrpcResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve on the configured address until `signal` completes
    pub async fn serve_with_shutdown<F>(self, signal: F) -> GrpcResult<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.config.addr;
        info!("gRPC server listening on {}", addr);

        self.router().serve_with_shutdown(addr, signal).await?;

        info!("gRPC server stopped");
        Ok(())
    }

    /// Serve on an already bound listener until `signal` completes
    pub async fn serve_with_listener<F>(self, listener: TcpListener, signal: F) -> GrpcResult<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr().ok();
        info!(addr = ?addr, "gRPC server listening");

        self.router()
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await?;

        info!("gRPC server stopped");
        Ok(())
    }

    fn router(self) -> Router {
        let mut server = Server::builder();

        if let Some(max_streams) = self.config.max_concurrent_streams {
            server = server.max_concurrent_streams(max_streams);
        }

        if let Some(keepalive) = self.config.tcp_keepalive {
            server = server.tcp_keepalive(Some(keepalive));
        }

        if let Some(timeout) = self.config.timeout {
            server = server.timeout(timeout);
        }

        server.add_service(HealthServer::new(self.health))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_app_config() {
        let mut app = AppConfig::development();
        app.server.host = "127.0.0.1".to_string();
        app.server.port = 6000;

        let config = ServerConfig::from_app_config(&app).unwrap();
        assert_eq!(config.addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.max_concurrent_streams, Some(1000));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_app_config_carries_request_timeout() {
        let mut app = AppConfig::development();
        app.server.request_timeout_secs = 5;
        let config = ServerConfig::from_app_config(&app).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));

        app.server.request_timeout_secs = 0;
        let config = ServerConfig::from_app_config(&app).unwrap();
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_from_app_config_rejects_bad_host() {
        let mut app = AppConfig::development();
        app.server.host = "not a host".to_string();

        let err = ServerConfig::from_app_config(&app).unwrap_err();
        assert!(matches!(err, GrpcError::Configuration(_)));
    }
}
