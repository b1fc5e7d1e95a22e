//! Error module

use thiserror::Error;
use tonic::{Code, Status};

use crate::interceptors::StatusSource;

#[derive(Debug, Error)]
pub enum GrpcError {
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Notifier error: {0}")]
    Notifier(#[from] grpcbrake_infrastructure::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl GrpcError {
    /// The gRPC code this error is reported with
    pub fn code(&self) -> Code {
        match self {
            GrpcError::Transport(_) => Code::Unavailable,
            GrpcError::Notifier(_) => Code::Internal,
            GrpcError::Configuration(_) => Code::FailedPrecondition,
            GrpcError::Internal(_) => Code::Internal,
        }
    }
}

impl From<GrpcError> for Status {
    fn from(err: GrpcError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

impl StatusSource for GrpcError {
    fn grpc_code(&self) -> Option<Code> {
        Some(self.code())
    }

    fn as_report(&self) -> &(dyn std::error::Error + 'static) {
        self
    }
}

pub type GrpcResult<T> = Result<T, GrpcError>;
