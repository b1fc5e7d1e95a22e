//! Testing utilities for grpcbrake
//!
//! This crate provides:
//! - Recording implementations of the `Reporter`, `MetricSink` and `Transport` traits
//! - Fixtures for call contexts, method names and errors
//!
//! # Examples
//!
//! ```
//! use grpcbrake_testing::{mocks::RecordingReporter, fixtures::*};
//! use grpcbrake_infrastructure::Reporter;
//!
//! let reporter = RecordingReporter::new();
//! let notice = reporter.notice(&PlainError::new("boom"), None, 3);
//! reporter.send_notice_async(notice);
//! assert_eq!(reporter.notice_count(), 1);
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

// Re-export testing dependencies for convenience
pub use fake;
pub use proptest;
pub use wiremock;
