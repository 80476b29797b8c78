//! Core type definitions for restmodel.
//!
//! This crate defines the plugin-agnostic building blocks shared by the
//! model layer and the transports:
//! - Dotted attribute paths and the helpers that read/write them in JSON trees
//! - Operation codes (`C`reate, `R`ead, `U`pdate) used by masks
//! - Attribute naming strategies (identity, snake_case ↔ camelCase)
//! - Request/response descriptors exchanged with a transport
//!
//! Nothing in here knows about records, collections or hooks; those live in
//! `restmodel-core`.

mod naming;
mod ops;
pub mod path;
mod request;

pub use naming::{IdentityNaming, Naming, NamingStyle, SnakeCaseNaming};
pub use ops::OpSet;
pub use request::{Method, Request, Response};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid attribute path: {0:?}")]
    InvalidPath(String),

    #[error("invalid operation code {0:?} (expected C, R or U)")]
    InvalidOpCode(char),
}
