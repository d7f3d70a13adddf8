//! Error types for the Floodgate service.
//!
//! These cover startup and infrastructure failures. Request rejections are
//! not errors of this kind, see [`crate::ratelimit::AdmissionDenied`].

use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for FloodgateError {
    fn from(err: config::ConfigError) -> Self {
        FloodgateError::Config(err.to_string())
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
