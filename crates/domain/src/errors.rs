//! Error types for the domain layer.

/// Errors raised by domain value types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// A metric was finished more than once
    #[error("Route metric already finished: {0}")]
    MetricAlreadyFinished(String),

    /// A metric ended before it started
    #[error("Route metric ends before it starts: {0}")]
    MetricEndsBeforeStart(String),

    /// A metric without a route
    #[error("Route metric has an empty route")]
    EmptyRoute,
}

/// Result alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
