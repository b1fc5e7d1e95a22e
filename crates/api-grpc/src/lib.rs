//! gRPC error and route reporting for tonic services
//!
//! This crate provides:
//! - Unary and streaming interceptors that report handler errors as notices
//!   and every call as a route metric
//! - Classification of gRPC status codes into HTTP status classes
//! - A monitored `grpc.health.v1.Health` service and server wiring
//!
//! ## Usage
//!
//! ```rust,ignore
//! use grpcbrake_api_grpc::{UnaryServerInfo, UnaryServerInterceptor};
//!
//! let interceptor = UnaryServerInterceptor::new(Arc::clone(&notifier));
//! let info = UnaryServerInfo::new("/helloworld.Greeter/SayHello");
//! interceptor
//!     .intercept_request(request, &info, |request| greeter.say_hello(request))
//!     .await
//! ```

pub mod error;
pub mod interceptors;
pub mod server;
pub mod services;

pub use error::{GrpcError, GrpcResult};
pub use interceptors::{
    grpc_code_to_http, grpc_raw_code_to_http, ChannelServerStream, ContextServerStream,
    ServerStream, StatusSource, StreamServerInfo, StreamServerInterceptor, UnaryServerInfo,
    UnaryServerInterceptor,
};
pub use server::{GrpcServer, ServerConfig};
pub use services::MonitoredHealthService;
