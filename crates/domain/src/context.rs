//! Per-call context values.
//!
//! A [`CallContext`] is derived from the inbound request when a call starts.
//! The metric sink derives a child context carrying a [`TrackingContext`] so
//! that the start and end of a call can be correlated.

use crate::identifiers::MetricId;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;

/// Correlation handle created by the metric sink for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingContext {
    metric_id: MetricId,
    route: String,
    started_at: DateTime<Utc>,
}

impl TrackingContext {
    /// Create a tracking context for the given metric
    pub fn new(metric_id: MetricId, route: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            metric_id,
            route: route.into(),
            started_at,
        }
    }

    pub fn metric_id(&self) -> MetricId {
        self.metric_id
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Context of a single in-flight call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    request_id: Option<String>,
    remote_addr: Option<SocketAddr>,
    tracking: Option<TrackingContext>,
}

impl CallContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request ID
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set the remote peer address
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Derive a child context bound to `tracking`.
    ///
    /// The receiver is left untouched; everything else is inherited.
    pub fn with_tracking(&self, tracking: TrackingContext) -> Self {
        Self {
            tracking: Some(tracking),
            ..self.clone()
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn tracking(&self) -> Option<&TrackingContext> {
        self.tracking.as_ref()
    }
}
