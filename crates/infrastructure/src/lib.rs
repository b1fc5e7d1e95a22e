//! Infrastructure layer for grpcbrake
//!
//! This crate provides the collaborators the gRPC interceptors report to:
//! - Error reporting (`Reporter` trait, `Notifier` with a bounded background queue)
//! - Route metrics (`MetricSink` trait, `Routes` per-minute aggregator)
//! - Backend transport (`Transport` trait, HTTP and log implementations)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use grpcbrake_infrastructure::{Notifier, NotifierOptions};
//!
//! let notifier = Notifier::new(NotifierOptions::from_config(&config.notifier))?;
//! // ... serve traffic ...
//! notifier.close(Duration::from_secs(5)).await?;
//! ```

pub mod notifier;
pub mod routes;
pub mod transport;

pub use notifier::{Notifier, NotifierOptions, Reporter, NOTICE_STACK_DEPTH};
pub use routes::{MetricSink, RouteKey, RouteStat, RouteStatEntry, RouteStatsBatch, Routes};
pub use transport::{HttpTransport, LogTransport, NoticeReceipt, Transport};

pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure-level errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport errors from reqwest
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success response from the backend
    #[error("Backend responded with {status}: {body}")]
    Http { status: u16, body: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The notice queue is full
    #[error("Notice queue is full (capacity {0})")]
    QueueFull(usize),

    /// The notifier has been closed
    #[error("Notifier is closed")]
    Closed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Metric submitted with a context it was not started for
    #[error("Tracking mismatch: {0}")]
    TrackingMismatch(String),

    /// Invalid route metric
    #[error("Metric error: {0}")]
    Metric(#[from] grpcbrake_domain::DomainError),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Timeout(_) | Error::QueueFull(_) => true,
            Error::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::QueueFull(10).is_retryable());
        assert!(Error::Http { status: 503, body: String::new() }.is_retryable());
        assert!(Error::Http { status: 429, body: String::new() }.is_retryable());
        assert!(!Error::Http { status: 401, body: String::new() }.is_retryable());
        assert!(!Error::Closed.is_retryable());
        assert!(!Error::Configuration("bad".to_string()).is_retryable());
    }
}
