//! HTTP transport error types.

use thiserror::Error;

/// Result type for transport setup.
pub type HttpResult<T> = Result<T, HttpError>;

/// Errors raised while building an [`HttpTransport`](crate::HttpTransport).
///
/// Request failures are not reported here; they surface as
/// [`TransportError`](restmodel_core::TransportError) from `send`.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
