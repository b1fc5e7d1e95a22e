//! Recording implementations of the infrastructure traits.
//!
//! Every double records what it was given so tests can assert on the exact
//! number of notices, metrics and deliveries.

use async_trait::async_trait;
use grpcbrake_domain::{CallContext, Notice, RouteMetric, TrackingContext};
use grpcbrake_infrastructure::{
    Error, MetricSink, NoticeReceipt, Reporter, Result, RouteStatsBatch, Transport,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Reporter that keeps every dispatched notice in memory
#[derive(Clone, Default)]
pub struct RecordingReporter {
    built: Arc<AtomicUsize>,
    dispatched: Arc<RwLock<Vec<Notice>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices handed to `send_notice_async`
    pub fn notices(&self) -> Vec<Notice> {
        self.dispatched.read().clone()
    }

    pub fn notice_count(&self) -> usize {
        self.dispatched.read().len()
    }

    /// Number of notices built, dispatched or not
    pub fn built_count(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

impl Reporter for RecordingReporter {
    fn notice(
        &self,
        err: &(dyn std::error::Error + 'static),
        params: Option<serde_json::Map<String, serde_json::Value>>,
        depth: usize,
    ) -> Notice {
        self.built.fetch_add(1, Ordering::SeqCst);
        let mut notice = Notice::new(err).with_backtrace(Vec::new(), depth);
        if let Some(params) = params {
            notice = notice.with_params(params);
        }
        notice
    }

    fn send_notice_async(&self, notice: Notice) {
        self.dispatched.write().push(notice);
    }
}

/// A metric submitted to [`RecordingMetricSink`] with the context it came with
#[derive(Debug, Clone)]
pub struct SubmittedMetric {
    pub context: CallContext,
    pub metric: RouteMetric,
}

/// Metric sink that keeps every submitted metric in memory
#[derive(Clone, Default)]
pub struct RecordingMetricSink {
    begun: Arc<RwLock<Vec<RouteMetric>>>,
    submitted: Arc<RwLock<Vec<SubmittedMetric>>>,
    fail_notify: Arc<AtomicBool>,
}

impl RecordingMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `notify` records the metric and then fails
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail_notify.store(true, Ordering::SeqCst);
        sink
    }

    pub fn begun_count(&self) -> usize {
        self.begun.read().len()
    }

    pub fn submitted(&self) -> Vec<SubmittedMetric> {
        self.submitted.read().clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.read().len()
    }

    /// Status classes of the submitted metrics, in submission order
    pub fn status_codes(&self) -> Vec<u16> {
        self.submitted
            .read()
            .iter()
            .map(|s| s.metric.status_code)
            .collect()
    }
}

impl MetricSink for RecordingMetricSink {
    fn begin(&self, ctx: &CallContext, method: &str, route: &str) -> (CallContext, RouteMetric) {
        let metric = RouteMetric::start(method, route);
        self.begun.write().push(metric.clone());
        let tracking = TrackingContext::new(metric.id, route, metric.started_at);
        (ctx.with_tracking(tracking), metric)
    }

    fn notify(&self, ctx: &CallContext, metric: RouteMetric) -> Result<()> {
        self.submitted.write().push(SubmittedMetric {
            context: ctx.clone(),
            metric,
        });
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(Error::Timeout("injected metric sink failure".to_string()));
        }
        Ok(())
    }
}

/// Transport that keeps deliveries in memory.
///
/// A gated transport blocks every notice delivery until [`RecordingTransport::open`]
/// is called.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    notices: Arc<RwLock<Vec<Notice>>>,
    batches: Arc<RwLock<Vec<RouteStatsBatch>>>,
    gate: Option<Arc<Semaphore>>,
    fail: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// A transport that rejects every delivery with HTTP 500
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.fail.store(true, Ordering::SeqCst);
        transport
    }

    /// Release a gated transport
    pub fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.read().clone()
    }

    pub fn batches(&self) -> Vec<RouteStatsBatch> {
        self.batches.read().clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Http {
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_notice(&self, notice: &Notice) -> Result<NoticeReceipt> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|_| Error::Closed)?;
        }
        self.check()?;
        self.notices.write().push(notice.clone());
        Ok(NoticeReceipt {
            id: Some(notice.id.to_string()),
            url: None,
        })
    }

    async fn send_route_stats(&self, batch: &RouteStatsBatch) -> Result<()> {
        self.check()?;
        self.batches.write().push(batch.clone());
        Ok(())
    }
}
