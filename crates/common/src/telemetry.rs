//! Tracing and structured logging setup.

use crate::config::TelemetryConfig;
use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured log level.
///
/// # Examples
///
/// ```no_run
/// use grpcbrake_common::{config::TelemetryConfig, telemetry::init_tracing};
///
/// init_tracing(&TelemetryConfig::default()).expect("Failed to initialize tracing");
/// ```
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));

    let registry = Registry::default().with(env_filter);

    if config.json_logging {
        registry
            .with(json_layer())
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
    } else {
        registry
            .with(console_layer())
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
    }

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Tracing initialized"
    );

    Ok(())
}

/// Filter at the configured level with the HTTP/2 stack under tonic kept at `warn`
fn default_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::new(format!(
        "{},{}",
        config.log_level,
        QUIET_TRANSPORT_TARGETS
            .iter()
            .map(|target| format!("{}=warn", target))
            .collect::<Vec<_>>()
            .join(",")
    ))
}

const QUIET_TRANSPORT_TARGETS: [&str; 3] = ["h2", "hyper", "tower"];

/// One flat JSON object per event, ready for log shipping
fn json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
}

/// Compact single-line output for local runs
fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .compact()
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
}
