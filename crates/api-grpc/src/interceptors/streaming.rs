//! Streaming call interceptor

use grpcbrake_infrastructure::{MetricSink, Notifier, Reporter};
use std::future::Future;
use std::sync::Arc;

use super::call::CallRecorder;
use super::status::StatusSource;
use super::stream::{ContextServerStream, ServerStream};

/// Information about a streaming call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamServerInfo {
    /// Fully qualified method name
    pub full_method: String,
    /// Whether the client sends a stream of messages
    pub is_client_stream: bool,
    /// Whether the server sends a stream of messages
    pub is_server_stream: bool,
}

impl StreamServerInfo {
    pub fn new(full_method: impl Into<String>, is_client_stream: bool, is_server_stream: bool) -> Self {
        Self {
            full_method: full_method.into(),
            is_client_stream,
            is_server_stream,
        }
    }

    pub fn server_streaming(full_method: impl Into<String>) -> Self {
        Self::new(full_method, false, true)
    }

    pub fn client_streaming(full_method: impl Into<String>) -> Self {
        Self::new(full_method, true, false)
    }

    pub fn bidirectional(full_method: impl Into<String>) -> Self {
        Self::new(full_method, true, true)
    }
}

/// Reports route metrics and handler errors of streaming calls
#[derive(Clone)]
pub struct StreamServerInterceptor {
    recorder: CallRecorder,
}

impl StreamServerInterceptor {
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

    /// Run `handler` for one streaming call.
    ///
    /// The handler gets `stream` wrapped so that its `context()` is the
    /// context derived by the metric sink. The handler's terminal result is
    /// returned as is.
    pub async fn intercept<'a, Srv, S, E, F, Fut>(
        &self,
        srv: &'a Srv,
        stream: S,
        info: &StreamServerInfo,
        handler: F,
    ) -> Result<(), E>
    where
        Srv: ?Sized,
        S: ServerStream,
        F: FnOnce(&'a Srv, ContextServerStream<S>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: StatusSource,
    {
        let call = self.recorder.begin(stream.context(), &info.full_method);
        let wrapped = ContextServerStream::new(stream, call.context().clone());
        call.run(async move { handler(srv, wrapped).await }).await
    }
}
