//! Attribute naming strategies.
//!
//! A naming strategy translates between the names the server uses (raw) and
//! the names records expose (local). The serializer applies it to every key
//! it does not have an explicit mapping for.

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Translates attribute names between wire format and local format.
pub trait Naming: Send + Sync + fmt::Debug {
    /// Raw (server) name → local name.
    fn decode(&self, raw: &str) -> String;

    /// Local name → raw (server) name.
    fn encode(&self, local: &str) -> String;
}

/// Leaves names untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNaming;

impl Naming for IdentityNaming {
    fn decode(&self, raw: &str) -> String {
        raw.to_string()
    }

    fn encode(&self, local: &str) -> String {
        local.to_string()
    }
}

/// `snake_case` on the wire, `camelCase` locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCaseNaming;

impl Naming for SnakeCaseNaming {
    fn decode(&self, raw: &str) -> String {
        if raw.starts_with('$') {
            return raw.to_string();
        }
        raw.from_case(Case::Snake).to_case(Case::Camel)
    }

    fn encode(&self, local: &str) -> String {
        local.from_case(Case::Camel).to_case(Case::Snake)
    }
}

/// Configurable naming convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStyle {
    /// Same names on both sides (default).
    #[default]
    Identity,
    /// `snake_case` raw names, `camelCase` local names.
    SnakeCase,
}

impl NamingStyle {
    /// Returns the strategy implementing this style.
    pub fn strategy(self) -> Arc<dyn Naming> {
        match self {
            NamingStyle::Identity => Arc::new(IdentityNaming),
            NamingStyle::SnakeCase => Arc::new(SnakeCaseNaming),
        }
    }
}
