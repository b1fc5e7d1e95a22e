//! Route performance metrics aggregation.
//!
//! [`Routes`] is the metric sink used by the gRPC interceptors. Finished
//! metrics are folded into per-minute buckets keyed by method, route and
//! status class; a background task (owned by the notifier) periodically
//! flushes the buckets through a [`Transport`].

use chrono::{DateTime, Utc};
use grpcbrake_domain::{CallContext, RouteMetric, TrackingContext};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::transport::Transport;
use crate::{Error, Result};

/// Sink for route metrics
pub trait MetricSink: Send + Sync {
    /// Start a metric for `route` and derive a context carrying its tracking handle
    fn begin(&self, ctx: &CallContext, method: &str, route: &str) -> (CallContext, RouteMetric);

    /// Finish and record a metric started by [`MetricSink::begin`]
    fn notify(&self, ctx: &CallContext, metric: RouteMetric) -> Result<()>;
}

/// Aggregation bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: String,
    pub route: String,
    pub status_code: u16,
    pub time: DateTime<Utc>,
}

/// Aggregated timings of one bucket, in milliseconds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteStat {
    pub count: u64,
    pub sum: f64,
    pub sumsq: f64,
}

impl RouteStat {
    fn add(&mut self, millis: f64) {
        self.count += 1;
        self.sum += millis;
        self.sumsq += millis * millis;
    }
}

/// Wire form of one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatEntry {
    pub method: String,
    pub route: String,
    pub status_code: u16,
    pub time: DateTime<Utc>,
    pub count: u64,
    pub sum: f64,
    pub sumsq: f64,
}

/// Batch of buckets sent in one flush
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStatsBatch {
    pub environment: String,
    pub routes: Vec<RouteStatEntry>,
}

/// Per-minute route metrics aggregator
pub struct Routes {
    environment: String,
    enabled: bool,
    transport: Arc<dyn Transport>,
    stats: Mutex<HashMap<RouteKey, RouteStat>>,
}

impl Routes {
    pub fn new(environment: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            environment: environment.into(),
            enabled: true,
            transport,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// A sink that accepts and discards every metric
    pub fn disabled(transport: Arc<dyn Transport>) -> Self {
        Self {
            enabled: false,
            ..Self::new(String::new(), transport)
        }
    }

    /// Copy of the pending buckets
    pub fn snapshot(&self) -> HashMap<RouteKey, RouteStat> {
        self.stats.lock().clone()
    }

    /// Send and clear the pending buckets, returning how many were sent.
    ///
    /// Buckets are dropped when delivery fails.
    pub async fn flush(&self) -> Result<usize> {
        let pending = std::mem::take(&mut *self.stats.lock());
        if pending.is_empty() {
            return Ok(0);
        }

        let routes: Vec<RouteStatEntry> = pending
            .into_iter()
            .map(|(key, stat)| RouteStatEntry {
                method: key.method,
                route: key.route,
                status_code: key.status_code,
                time: key.time,
                count: stat.count,
                sum: stat.sum,
                sumsq: stat.sumsq,
            })
            .collect();
        let sent = routes.len();

        let batch = RouteStatsBatch {
            environment: self.environment.clone(),
            routes,
        };
        if let Err(e) = self.transport.send_route_stats(&batch).await {
            warn!(error = %e, buckets = sent, "Failed to send route stats");
            return Err(e);
        }

        debug!(buckets = sent, "Route stats flushed");
        Ok(sent)
    }
}

impl MetricSink for Routes {
    fn begin(&self, ctx: &CallContext, method: &str, route: &str) -> (CallContext, RouteMetric) {
        let metric = RouteMetric::start(method, route);
        let tracking = TrackingContext::new(metric.id, route, metric.started_at);
        (ctx.with_tracking(tracking), metric)
    }

    fn notify(&self, ctx: &CallContext, mut metric: RouteMetric) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if let Some(tracking) = ctx.tracking() {
            if tracking.metric_id() != metric.id {
                return Err(Error::TrackingMismatch(format!(
                    "metric {} does not belong to tracking context {}",
                    metric.id,
                    tracking.metric_id()
                )));
            }
        }

        let elapsed = match metric.duration() {
            Some(elapsed) => elapsed,
            None => metric.finish()?,
        };
        let millis = elapsed.num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0;

        let key = RouteKey {
            method: metric.method.clone(),
            route: metric.route.clone(),
            status_code: metric.status_code,
            time: metric.minute_bucket(),
        };
        self.stats.lock().entry(key).or_default().add(millis);

        Ok(())
    }
}
