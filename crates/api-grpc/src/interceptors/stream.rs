//! Streaming call abstraction and the context-substituting decorator.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;
use grpcbrake_domain::CallContext;
use tokio::sync::mpsc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status, Streaming};

use super::call_context;

/// An in-progress streaming call as seen by a stream handler
#[async_trait]
pub trait ServerStream: Send {
    type Inbound: Send;
    type Outbound: Send;

    /// Context of the call
    fn context(&self) -> &CallContext;

    /// Request metadata sent by the client
    fn metadata(&self) -> &MetadataMap;

    /// Receive the next client message, `None` once the client is done
    async fn recv(&mut self) -> Result<Option<Self::Inbound>, Status>;

    /// Send a message to the client
    async fn send(&mut self, message: Self::Outbound) -> Result<(), Status>;
}

/// Stream decorator that reports a substituted [`CallContext`].
///
/// Every operation except [`ServerStream::context`] is forwarded to the
/// wrapped stream unchanged.
pub struct ContextServerStream<S> {
    inner: S,
    ctx: CallContext,
}

impl<S> ContextServerStream<S> {
    pub fn new(inner: S, ctx: CallContext) -> Self {
        Self { inner, ctx }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: ServerStream> ServerStream for ContextServerStream<S> {
    type Inbound = S::Inbound;
    type Outbound = S::Outbound;

    fn context(&self) -> &CallContext {
        &self.ctx
    }

    fn metadata(&self) -> &MetadataMap {
        self.inner.metadata()
    }

    async fn recv(&mut self) -> Result<Option<Self::Inbound>, Status> {
        self.inner.recv().await
    }

    async fn send(&mut self, message: Self::Outbound) -> Result<(), Status> {
        self.inner.send(message).await
    }
}

/// [`ServerStream`] over tonic's streaming idioms: an inbound message stream
/// and an outbound channel feeding the response `ReceiverStream`.
pub struct ChannelServerStream<In, Out> {
    ctx: CallContext,
    metadata: MetadataMap,
    inbound: BoxStream<'static, Result<In, Status>>,
    outbound: mpsc::Sender<Result<Out, Status>>,
}

impl<In, Out> ChannelServerStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    pub fn new<St>(
        ctx: CallContext,
        metadata: MetadataMap,
        inbound: St,
        outbound: mpsc::Sender<Result<Out, Status>>,
    ) -> Self
    where
        St: Stream<Item = Result<In, Status>> + Send + 'static,
    {
        Self {
            ctx,
            metadata,
            inbound: inbound.boxed(),
            outbound,
        }
    }

    /// Adapt a client-streaming or bidirectional request
    pub fn from_streaming(
        request: Request<Streaming<In>>,
        outbound: mpsc::Sender<Result<Out, Status>>,
    ) -> Self {
        let ctx = call_context(&request);
        let metadata = request.metadata().clone();
        Self::new(ctx, metadata, request.into_inner(), outbound)
    }

    /// Adapt a server-streaming request; `recv` yields its single message
    pub fn from_request(request: Request<In>, outbound: mpsc::Sender<Result<Out, Status>>) -> Self {
        let ctx = call_context(&request);
        let metadata = request.metadata().clone();
        let message = request.into_inner();
        Self::new(ctx, metadata, stream::once(async move { Ok(message) }), outbound)
    }
}

#[async_trait]
impl<In, Out> ServerStream for ChannelServerStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    type Inbound = In;
    type Outbound = Out;

    fn context(&self) -> &CallContext {
        &self.ctx
    }

    fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    async fn recv(&mut self) -> Result<Option<In>, Status> {
        self.inbound.next().await.transpose()
    }

    async fn send(&mut self, message: Out) -> Result<(), Status> {
        self.outbound
            .send(Ok(message))
            .await
            .map_err(|_| Status::cancelled("client disconnected"))
    }
}
