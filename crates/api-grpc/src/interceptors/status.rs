//! Classification of gRPC status codes into HTTP status classes.
//!
//! Mapping follows <https://github.com/grpc/grpc/blob/master/doc/http-grpc-status-mapping.md>,
//! with `Cancelled` reported as 499 (client closed request).

use tonic::{Code, Status};

/// Convert a gRPC status code to an HTTP status class
#[allow(unreachable_patterns)]
pub fn grpc_code_to_http(code: Code) -> u16 {
    match code {
        Code::Ok => 200,
        Code::Cancelled => 499,
        Code::Unknown => 500,
        Code::InvalidArgument => 400,
        Code::DeadlineExceeded => 504,
        Code::NotFound => 404,
        Code::AlreadyExists => 409,
        Code::PermissionDenied => 403,
        Code::ResourceExhausted => 429,
        Code::FailedPrecondition => 400,
        Code::Aborted => 409,
        Code::OutOfRange => 400,
        Code::Unimplemented => 501,
        Code::Internal => 500,
        Code::Unavailable => 503,
        Code::DataLoss => 500,
        Code::Unauthenticated => 401,
        _ => 500,
    }
}

/// Convert a wire-level gRPC status code to an HTTP status class.
///
/// Codes outside the canonical range `0..=16` map to 500.
pub fn grpc_raw_code_to_http(raw: i32) -> u16 {
    match raw {
        0..=16 => grpc_code_to_http(Code::from(raw)),
        _ => 500,
    }
}

/// Access to the gRPC status code carried by a handler error
pub trait StatusSource {
    /// The gRPC code attached to this error, if any
    fn grpc_code(&self) -> Option<Code>;

    /// The error as reported in a notice
    fn as_report(&self) -> &(dyn std::error::Error + 'static);
}

/// Find the first `tonic::Status` in an error's `source()` chain
pub fn find_status_code(err: &(dyn std::error::Error + 'static)) -> Option<Code> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(status) = e.downcast_ref::<Status>() {
            return Some(status.code());
        }
        current = e.source();
    }
    None
}

impl StatusSource for Status {
    fn grpc_code(&self) -> Option<Code> {
        Some(self.code())
    }

    fn as_report(&self) -> &(dyn std::error::Error + 'static) {
        self
    }
}

impl StatusSource for Box<dyn std::error::Error + Send + Sync> {
    fn grpc_code(&self) -> Option<Code> {
        find_status_code(self.as_report())
    }

    fn as_report(&self) -> &(dyn std::error::Error + 'static) {
        &**self
    }
}

impl StatusSource for anyhow::Error {
    fn grpc_code(&self) -> Option<Code> {
        self.chain().find_map(|e| e.downcast_ref::<Status>().map(Status::code))
    }

    fn as_report(&self) -> &(dyn std::error::Error + 'static) {
        &**self
    }
}
