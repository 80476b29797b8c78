//! reqwest-backed transport for restmodel.
//!
//! ```no_run
//! use restmodel_core::{Api, ApiConfig};
//! use restmodel_http::{HttpConfig, HttpTransport};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(HttpConfig::default())?;
//! let config = ApiConfig {
//!     url_prefix: Some("https://shop.example.com/api".into()),
//!     ..ApiConfig::default()
//! };
//! let api = Api::with_config(Arc::new(transport), config);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod transport;

pub use config::HttpConfig;
pub use error::{HttpError, HttpResult};
pub use transport::HttpTransport;
