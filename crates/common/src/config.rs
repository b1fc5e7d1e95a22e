//! Configuration management.
//!
//! Settings are loaded from optional configuration files and environment
//! variables.
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 50051
//!
//! [notifier]
//! project_id = 123456
//! project_key = "0123456789abcdef"
//! environment = "production"
//!
//! [telemetry]
//! json_logging = true
//! log_level = "info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// gRPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (e.g., "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in seconds, 0 disables it
    #[serde(default = "default_server_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Monitoring backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Disable to accept and discard all notices and metrics
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Backend project ID
    #[serde(default)]
    pub project_id: u64,

    /// Backend project key
    #[serde(default)]
    pub project_key: String,

    /// Backend base URL
    #[serde(default = "default_notifier_host")]
    pub host: String,

    /// Environment name attached to every notice
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Capacity of the asynchronous notice queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Interval between route stats flushes in seconds
    #[serde(default = "default_routes_flush_interval")]
    pub routes_flush_interval_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable JSON logging format
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_server_request_timeout() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

fn default_notifier_host() -> String {
    "https://api.airbrake.io".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_routes_flush_interval() -> u64 {
    15
}

fn default_request_timeout() -> u64 {
    10
}

fn default_service_name() -> String {
    "grpcbrake".to_string()
}

fn default_json_logging() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_server_request_timeout(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            project_id: 0,
            project_key: String::new(),
            host: default_notifier_host(),
            environment: default_environment(),
            queue_capacity: default_queue_capacity(),
            routes_flush_interval_secs: default_routes_flush_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_logging: default_json_logging(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and configuration files.
    ///
    /// The configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/{environment}.toml (if exists, where environment is from APP_ENV)
    /// 4. Environment variables (prefixed with APP_)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use grpcbrake_common::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load configuration");
    /// println!("Server will run on {}:{}", config.server.host, config.server.port);
    /// ```
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Example: APP_NOTIFIER__PROJECT_KEY=abc
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        Self::from_config(config)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.notifier.enabled {
            if self.notifier.project_id == 0 {
                anyhow::bail!("Notifier project ID is required");
            }

            if self.notifier.project_key.is_empty() {
                anyhow::bail!("Notifier project key is required");
            }

            url::Url::parse(&self.notifier.host)
                .with_context(|| format!("Invalid notifier host '{}'", self.notifier.host))?;
        }

        if self.notifier.queue_capacity == 0 {
            anyhow::bail!("Notifier queue capacity must be greater than 0");
        }

        if self.notifier.routes_flush_interval_secs == 0 {
            anyhow::bail!("Routes flush interval must be greater than 0");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Address the gRPC server binds to
    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| format!("Invalid server address {}:{}", self.server.host, self.server.port))
    }

    /// Create a development configuration with the notifier disabled
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 50051,
                ..Default::default()
            },
            notifier: NotifierConfig {
                enabled: false,
                ..Default::default()
            },
            telemetry: TelemetryConfig {
                service_name: "grpcbrake-dev".to_string(),
                json_logging: false,
                log_level: "debug".to_string(),
            },
        }
    }
}

impl ServerConfig {
    /// Per-request timeout, `None` when disabled
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

impl NotifierConfig {
    pub fn routes_flush_interval(&self) -> Duration {
        Duration::from_secs(self.routes_flush_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config_is_valid() {
        let config = AppConfig::development();
        assert!(config.validate().is_ok());
        assert!(!config.notifier.enabled);
    }

    #[test]
    fn test_from_toml_applies_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [notifier]
            project_id = 42
            project_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 50051);
        assert_eq!(config.server.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.notifier.project_id, 42);
        assert_eq!(config.notifier.queue_capacity, 1000);
        assert_eq!(config.notifier.routes_flush_interval(), Duration::from_secs(15));
        assert_eq!(config.notifier.host, "https://api.airbrake.io");
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_enabled_notifier_requires_credentials() {
        let err = AppConfig::from_toml_str("[notifier]\nproject_id = 1\n").unwrap_err();
        assert!(format!("{:#}", err).contains("project key"));

        let err = AppConfig::from_toml_str("[notifier]\nproject_key = \"k\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("project ID"));
    }

    #[test]
    fn test_disabled_notifier_skips_credentials() {
        let config = AppConfig::from_toml_str("[notifier]\nenabled = false\n").unwrap();
        assert!(!config.notifier.enabled);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::development();
        config.telemetry.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut config = AppConfig::development();
        config.notifier.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_server_timeout_disables_it() {
        let config = AppConfig::from_toml_str(
            "[server]\nrequest_timeout_secs = 0\n[notifier]\nenabled = false\n",
        )
        .unwrap();
        assert_eq!(config.server.request_timeout(), None);
    }

    #[test]
    fn test_server_addr() {
        let config = AppConfig::development();
        assert_eq!(config.server_addr().unwrap(), "127.0.0.1:50051".parse().unwrap());
    }
}
