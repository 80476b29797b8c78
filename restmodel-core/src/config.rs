//! API-wide configuration.

use crate::error::RestResult;
use restmodel_types::{Method, NamingStyle};
use serde::{Deserialize, Serialize};

/// Configuration shared by every model defined through an [`Api`](crate::Api).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Prepended to every relative model URL (e.g. `https://host/api`).
    pub url_prefix: Option<String>,
    /// Raw field holding the primary key.
    pub primary_key: String,
    /// Naming convention between wire and local attribute names.
    pub naming: NamingStyle,
    /// Method used by partial saves.
    pub patch_method: Method,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url_prefix: None,
            primary_key: "id".to_string(),
            naming: NamingStyle::Identity,
            patch_method: Method::Patch,
        }
    }
}

impl ApiConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> RestResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolves a model URL against the prefix. Absolute URLs pass through.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.url_prefix {
            Some(prefix) => format!(
                "{}/{}",
                prefix.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    }
}
