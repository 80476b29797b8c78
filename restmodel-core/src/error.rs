//! Error types for the model layer.

use crate::transport::TransportError;
use restmodel_types::Response;
use serde_json::Value;
use thiserror::Error;

/// Result type for model operations.
pub type RestResult<T> = Result<T, RestError>;

/// Errors that can occur in model operations.
///
/// Errors travel through shared action futures, so they are `Clone` and only
/// carry owned, plain data.
#[derive(Debug, Clone, Error)]
pub enum RestError {
    /// A network-dependent operation was attempted without a resolvable URL.
    #[error("cannot {operation}: resource is not bound to a url")]
    Unbound { operation: &'static str },

    /// The server answered with a non-success status.
    #[error("request failed with status {status}")]
    Http { status: u16, body: Value },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The action was cancelled before it ran.
    #[error("action canceled")]
    Canceled,

    /// The server sent data that violates the payload contract.
    #[error("malformed server data: {0}")]
    Malformed(String),

    /// A record of another model was handed to a collection.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// A relation names a model that is not registered.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The model definition is invalid.
    #[error("invalid model definition: {0}")]
    Definition(String),

    /// A hook callback failed.
    #[error("hook failed: {0}")]
    Hook(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RestError {
    /// Returns the server response carried by an HTTP error.
    pub fn response(&self) -> Option<Response> {
        match self {
            RestError::Http { status, body } => Some(Response::new(*status, body.clone())),
            _ => None,
        }
    }

    /// Returns true if this error marks a cancelled action.
    pub fn is_canceled(&self) -> bool {
        matches!(self, RestError::Canceled)
    }
}

impl From<serde_json::Error> for RestError {
    fn from(err: serde_json::Error) -> Self {
        RestError::Serialization(err.to_string())
    }
}

impl From<restmodel_types::Error> for RestError {
    fn from(err: restmodel_types::Error) -> Self {
        RestError::Definition(err.to_string())
    }
}

impl From<TransportError> for RestError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status(response) => RestError::Http {
                status: response.status,
                body: response.data,
            },
            TransportError::Network(msg) => RestError::Network(msg),
        }
    }
}
