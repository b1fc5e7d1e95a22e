//! Shared configuration and telemetry setup for grpcbrake services.

pub mod config;
pub mod telemetry;

pub use config::{AppConfig, NotifierConfig, ServerConfig, TelemetryConfig};
pub use telemetry::init_tracing;

/// Common error type used throughout the crate
pub type Result<T> = std::result::Result<T, anyhow::Error>;
