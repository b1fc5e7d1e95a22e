//! Test fixtures for calls and errors.

use fake::{faker::lorem::en::Word, Fake};
use grpcbrake_domain::CallContext;

/// Fully qualified method name used across tests
pub const TEST_METHOD: &str = "/helloworld.Greeter/SayHello";

/// Create an inbound call context with a request ID
pub fn create_test_call_context() -> CallContext {
    CallContext::new()
        .with_request_id("test-request-id")
        .with_remote_addr(([127, 0, 0, 1], 40000).into())
}

/// Create a random fully qualified method name, e.g. `/lorem.Ipsum/Dolor`
pub fn random_full_method() -> String {
    let package: String = Word().fake();
    let service: String = Word().fake();
    let method: String = Word().fake();
    format!(
        "/{}.{}/{}",
        package.to_lowercase(),
        capitalize(&service),
        capitalize(&method)
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// An error that carries no gRPC status
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PlainError(pub String);

impl PlainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
