//! Error types for the webhook.
//!
//! Errors are classified by how they surface to the caller: as an admission
//! denial, as an HTTP 500, or as a fatal startup failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Error type for webhook operations
#[derive(Error, Debug)]
pub enum Error {
    /// Reading the request body or writing the response failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed AdmissionReview or embedded Pod
    #[error("Decode error: {0}")]
    Decode(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid startup configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

/// HTTP-level failures are reported as plain text with the raw error message
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = match self {
            Error::Io(msg)
            | Error::Decode(msg)
            | Error::Config(msg)
            | Error::TlsConfig(msg)
            | Error::Server(msg) => msg,
            Error::Serialization(e) => e.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Result type alias for webhook operations
pub type Result<T> = std::result::Result<T, Error>;
