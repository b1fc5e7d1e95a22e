//! grpcbrake domain types
//!
//! Value types shared by every layer of the gRPC telemetry middleware:
//!
//! - **identifiers**: time-ordered IDs for metrics and notices
//! - **context**: per-call context and the tracking context created by the metric sink
//! - **metric**: route performance metrics
//! - **notice**: structured error reports
//! - **errors**: domain error type

#![warn(clippy::all)]

pub mod context;
pub mod errors;
pub mod identifiers;
pub mod metric;
pub mod notice;

pub use context::{CallContext, TrackingContext};
pub use errors::{DomainError, DomainResult};
pub use identifiers::{MetricId, NoticeId};
pub use metric::{RouteMetric, METHOD_POST, STATUS_INTERNAL_SERVER_ERROR, STATUS_OK};
pub use notice::{
    Notice, NoticeError, StackFrame, COMPONENT_GRPC, CONTEXT_ACTION, CONTEXT_COMPONENT,
};
