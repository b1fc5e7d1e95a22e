//! Unary call interceptor

use grpcbrake_domain::CallContext;
use grpcbrake_infrastructure::{MetricSink, Notifier, Reporter};
use std::future::Future;
use std::sync::Arc;
use tonic::Request;

use super::call::CallRecorder;
use super::status::StatusSource;
use super::{call_context, request_call_context};

/// Information about a unary call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryServerInfo {
    /// Fully qualified method name, e.g. `/grpc.health.v1.Health/Check`
    pub full_method: String,
}

impl UnaryServerInfo {
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
        }
    }
}

/// Reports route metrics and handler errors of unary calls
#[derive(Clone)]
pub struct UnaryServerInterceptor {
    recorder: CallRecorder,
}

impl UnaryServerInterceptor {
    /// Report through `notifier` and its route sink
    pub fn new(notifier: Arc<Notifier>) -> Self {
        let sink: Arc<dyn MetricSink> = notifier.routes();
        Self::with_collaborators(notifier, sink)
    }

    pub fn with_collaborators(reporter: Arc<dyn Reporter>, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            recorder: CallRecorder::new(reporter, sink),
        }
    }

    /// Run `handler` for one call.
    ///
    /// The handler receives the context derived by the metric sink instead
    /// of `ctx`. Its result is returned as is.
    pub async fn intercept<Req, Resp, E, F, Fut>(
        &self,
        ctx: &CallContext,
        request: Req,
        info: &UnaryServerInfo,
        handler: F,
    ) -> Result<Resp, E>
    where
        F: FnOnce(CallContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
        E: StatusSource,
    {
        let call = self.recorder.begin(ctx, &info.full_method);
        let derived = call.context().clone();
        call.run(async move { handler(derived, request).await })
            .await
    }

    /// Run `handler` for a tonic request.
    ///
    /// The derived context is stored in the request extensions, where
    /// [`request_call_context`] finds it. A context already stored there by
    /// an outer interceptor is used as the inbound context.
    pub async fn intercept_request<Req, Resp, E, F, Fut>(
        &self,
        request: Request<Req>,
        info: &UnaryServerInfo,
        handler: F,
    ) -> Result<Resp, E>
    where
        F: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
        E: StatusSource,
    {
        let ctx = request_call_context(&request)
            .cloned()
            .unwrap_or_else(|| call_context(&request));

        self.intercept(&ctx, request, info, |derived, mut request| {
            request.extensions_mut().insert(derived);
            handler(request)
        })
        .await
    }
}
