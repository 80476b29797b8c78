//! CLI configuration file.
//!
//! ```json
//! {
//!   "api": { "url_prefix": "https://shop.example.com/api", "naming": "snake_case" },
//!   "http": { "timeout_secs": 10, "default_headers": { "authorization": "Bearer t" } },
//!   "resources": {
//!     "bikes": { "url": "/v2/bikes", "mask": { "createdAt": "CU" }, "volatile": ["password"] }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use restmodel_core::{ApiConfig, Define, Mask, ModelBuilder, OpSet};
use restmodel_http::HttpConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub api: ApiConfig,
    pub http: HttpConfig,
    pub resources: BTreeMap<String, ResourceConfig>,
}

/// Per-resource model rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Collection URL; defaults to `/<resource>`.
    pub url: Option<String>,
    /// Masked paths, as operation codes (`C`, `R`, `U`).
    pub mask: BTreeMap<String, String>,
    /// Local path to raw key.
    pub map: BTreeMap<String, String>,
    pub volatile: Vec<String>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

impl ResourceConfig {
    /// Applies the rules to a model definition.
    pub fn apply(&self, mut builder: ModelBuilder) -> Result<ModelBuilder> {
        for (path, codes) in &self.mask {
            let ops = OpSet::parse(codes).with_context(|| format!("invalid mask for {path}"))?;
            builder = builder.mask(path, Mask::Ops(ops));
        }
        for (local, raw) in &self.map {
            builder = builder.map(local, raw);
        }
        for path in &self.volatile {
            builder = builder.volatile(path);
        }
        Ok(builder)
    }
}
