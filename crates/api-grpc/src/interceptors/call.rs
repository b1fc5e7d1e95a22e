//! Per-call bookkeeping shared by the unary and streaming interceptors.

use grpcbrake_domain::{
    CallContext, RouteMetric, COMPONENT_GRPC, CONTEXT_ACTION, CONTEXT_COMPONENT, METHOD_POST,
    STATUS_INTERNAL_SERVER_ERROR, STATUS_OK,
};
use grpcbrake_infrastructure::{MetricSink, Reporter, NOTICE_STACK_DEPTH};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tonic::Status;
use tracing::{debug, warn};

use super::status::{grpc_code_to_http, StatusSource};

/// Reporting collaborators of an interceptor
#[derive(Clone)]
pub(crate) struct CallRecorder {
    reporter: Arc<dyn Reporter>,
    sink: Arc<dyn MetricSink>,
}

impl CallRecorder {
    pub(crate) fn new(reporter: Arc<dyn Reporter>, sink: Arc<dyn MetricSink>) -> Self {
        Self { reporter, sink }
    }

    /// Start the metric for a call to `full_method`
    pub(crate) fn begin<'a>(&'a self, ctx: &CallContext, full_method: &'a str) -> InFlightCall<'a> {
        let (ctx, mut metric) = self.sink.begin(ctx, METHOD_POST, full_method);
        metric.status_code = STATUS_OK;

        InFlightCall {
            recorder: self,
            full_method,
            ctx,
            metric: Some(metric),
        }
    }
}

/// A call whose metric has been started but not yet submitted.
///
/// The metric is submitted when the call is finished. If the guard is
/// dropped first, the call is recorded as cancelled, or as an internal
/// error when dropped during a panic.
pub(crate) struct InFlightCall<'a> {
    recorder: &'a CallRecorder,
    full_method: &'a str,
    ctx: CallContext,
    metric: Option<RouteMetric>,
}

impl InFlightCall<'_> {
    /// The derived context carrying the tracking context
    pub(crate) fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Await `handler` and record its outcome.
    ///
    /// A panicking handler is recorded as an internal error and the panic
    /// is resumed.
    pub(crate) async fn run<T, E, Fut>(self, handler: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: StatusSource,
    {
        match AssertUnwindSafe(handler).catch_unwind().await {
            Ok(result) => {
                self.finish(&result);
                result
            }
            Err(panic) => {
                self.panicked();
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Record the handler's outcome
    pub(crate) fn finish<T, E: StatusSource>(mut self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.complete(None),
            Err(err) => self.complete(Some(err as &dyn StatusSource)),
        }
    }

    fn panicked(mut self) {
        warn!(route = %self.full_method, "Handler panicked");
        let panicked = Status::internal("handler panicked");
        self.complete(Some(&panicked as &dyn StatusSource));
    }

    fn complete(&mut self, err: Option<&dyn StatusSource>) {
        let Some(mut metric) = self.metric.take() else {
            return;
        };

        if let Some(err) = err {
            metric.status_code = err
                .grpc_code()
                .map(grpc_code_to_http)
                .unwrap_or(STATUS_INTERNAL_SERVER_ERROR);

            let reporter = &self.recorder.reporter;
            let mut notice = reporter.notice(err.as_report(), None, NOTICE_STACK_DEPTH);
            notice.set_context(CONTEXT_COMPONENT, COMPONENT_GRPC);
            notice.set_context(CONTEXT_ACTION, self.full_method);
            reporter.send_notice_async(notice);
        }

        let status_code = metric.status_code;
        if let Err(e) = self.recorder.sink.notify(&self.ctx, metric) {
            debug!(
                route = %self.full_method,
                status_code,
                error = %e,
                "Failed to submit route metric"
            );
        }
    }
}

impl Drop for InFlightCall<'_> {
    fn drop(&mut self) {
        if self.metric.is_none() {
            return;
        }

        let status = if std::thread::panicking() {
            warn!(route = %self.full_method, "Call unwound by a panic");
            Status::internal("handler panicked")
        } else {
            warn!(route = %self.full_method, "Call dropped before the handler completed");
            Status::cancelled("call dropped before the handler completed")
        };
        self.complete(Some(&status as &dyn StatusSource));
    }
}
