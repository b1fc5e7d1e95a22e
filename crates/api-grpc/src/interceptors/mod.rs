//! Error and route reporting interceptors.
//!
//! [`UnaryServerInterceptor`] and [`StreamServerInterceptor`] wrap service
//! handlers. Each intercepted call submits exactly one route metric; a
//! handler error additionally produces one notice. The handler's result is
//! always returned unchanged.

mod call;
pub mod status;
pub mod stream;
pub mod streaming;
pub mod unary;

pub use status::{grpc_code_to_http, grpc_raw_code_to_http, StatusSource};
pub use stream::{ChannelServerStream, ContextServerStream, ServerStream};
pub use streaming::{StreamServerInfo, StreamServerInterceptor};
pub use unary::{UnaryServerInfo, UnaryServerInterceptor};

use grpcbrake_domain::CallContext;
use tonic::Request;

/// Metadata key carrying the client supplied request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Derive the inbound [`CallContext`] of a request
pub fn call_context<T>(request: &Request<T>) -> CallContext {
    let mut ctx = CallContext::new();

    if let Some(request_id) = request
        .metadata()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        ctx = ctx.with_request_id(request_id);
    }

    if let Some(addr) = request.remote_addr() {
        ctx = ctx.with_remote_addr(addr);
    }

    ctx
}

/// The [`CallContext`] an interceptor stored in the request extensions
pub fn request_call_context<T>(request: &Request<T>) -> Option<&CallContext> {
    request.extensions().get::<CallContext>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_context_reads_request_id() {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(REQUEST_ID_HEADER, "abc-123".parse().unwrap());

        let ctx = call_context(&request);
        assert_eq!(ctx.request_id(), Some("abc-123"));
        assert!(ctx.remote_addr().is_none());
        assert!(ctx.tracking().is_none());
    }

    #[test]
    fn test_call_context_without_metadata() {
        let request = Request::new(());
        assert_eq!(call_context(&request), CallContext::new());
        assert!(request_call_context(&request).is_none());
    }
}
