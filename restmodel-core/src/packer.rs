//! Payload envelopes.
//!
//! A [`Packer`] strips (on the way in) or adds (on the way out) whatever
//! wrapping the server puts around resource data: root keys, metadata,
//! side-loaded related resources. Side-loaded resources are parked in a
//! [`PackerCache`] that lives for a single unpack and is consulted by
//! `belongs_to`/`belongs_to_many` decoders.

use crate::error::RestResult;
use crate::model::Model;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Whether a payload carries one record or a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackKind {
    Record,
    Collection,
}

/// Data extracted by a packer while unpacking one payload.
#[derive(Debug, Default)]
pub struct PackerCache {
    linked: HashMap<String, Vec<Value>>,
    meta: Option<Value>,
}

impl PackerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds side-loaded raw records under `name` (usually a model's plural).
    pub fn feed(&mut self, name: impl Into<String>, items: Vec<Value>) {
        self.linked.entry(name.into()).or_default().extend(items);
    }

    /// Finds the side-loaded raw record of `model` whose key is `pk`.
    pub fn find(&self, model: &Model, pk: &Value) -> Option<&Value> {
        self.linked
            .get(model.plural())?
            .iter()
            .find(|raw| model.infer_key(raw).as_ref() == Some(pk))
    }

    pub fn set_meta(&mut self, meta: Value) {
        self.meta = Some(meta);
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    pub fn take_meta(&mut self) -> Option<Value> {
        self.meta.take()
    }

    pub fn is_empty(&self) -> bool {
        self.linked.is_empty() && self.meta.is_none()
    }
}

/// Converts between server envelopes and bare resource data.
pub trait Packer: Send + Sync + fmt::Debug {
    /// Extracts the resource data from a server payload.
    fn unpack(
        &self,
        model: &Model,
        kind: PackKind,
        raw: Value,
        cache: &mut PackerCache,
    ) -> RestResult<Value>;

    /// Wraps encoded resource data for sending.
    fn pack(&self, model: &Model, kind: PackKind, raw: Value) -> RestResult<Value>;
}

/// Passes payloads through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPacker;

impl Packer for IdentityPacker {
    fn unpack(&self, _: &Model, _: PackKind, raw: Value, _: &mut PackerCache) -> RestResult<Value> {
        Ok(raw)
    }

    fn pack(&self, _: &Model, _: PackKind, raw: Value) -> RestResult<Value> {
        Ok(raw)
    }
}

/// Envelope packer for payloads shaped like
/// `{ "bike": {...}, "meta": {...}, "linked": { "users": [...] } }`.
///
/// The single root defaults to the model name with a lowercase first letter,
/// the plural root to the model's plural. A payload without the root key is
/// used as-is.
#[derive(Debug, Clone)]
pub struct DefaultPacker {
    root: Option<String>,
    plural_root: Option<String>,
    meta_key: Option<String>,
    links_key: Option<String>,
    pack_root: bool,
}

impl Default for DefaultPacker {
    fn default() -> Self {
        Self {
            root: None,
            plural_root: None,
            meta_key: Some("meta".to_string()),
            links_key: Some("linked".to_string()),
            pack_root: false,
        }
    }
}

impl DefaultPacker {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn root(mut self, name: impl Into<String>) -> Self {
        self.root = Some(name.into());
        self
    }

    #[must_use]
    pub fn plural_root(mut self, name: impl Into<String>) -> Self {
        self.plural_root = Some(name.into());
        self
    }

    /// Key holding metadata; `None` disables extraction.
    #[must_use]
    pub fn meta_key(mut self, key: Option<&str>) -> Self {
        self.meta_key = key.map(str::to_string);
        self
    }

    /// Key holding side-loaded resources; `None` disables extraction.
    #[must_use]
    pub fn links_key(mut self, key: Option<&str>) -> Self {
        self.links_key = key.map(str::to_string);
        self
    }

    /// Wrap outgoing payloads in the root key.
    #[must_use]
    pub fn pack_root(mut self, enabled: bool) -> Self {
        self.pack_root = enabled;
        self
    }

    fn root_for(&self, model: &Model, kind: PackKind) -> String {
        match kind {
            PackKind::Record => self
                .root
                .clone()
                .unwrap_or_else(|| lower_first(model.name())),
            PackKind::Collection => self
                .plural_root
                .clone()
                .unwrap_or_else(|| model.plural().to_string()),
        }
    }
}

impl Packer for DefaultPacker {
    fn unpack(
        &self,
        model: &Model,
        kind: PackKind,
        raw: Value,
        cache: &mut PackerCache,
    ) -> RestResult<Value> {
        let root = self.root_for(model, kind);
        // Without the root key the payload is the resource itself.
        let mut envelope = match raw {
            Value::Object(envelope) if envelope.contains_key(&root) => envelope,
            other => return Ok(other),
        };

        if let Some(meta) = self.meta_key.as_ref().and_then(|k| envelope.remove(k)) {
            cache.set_meta(meta);
        }
        if let Some(Value::Object(links)) = self.links_key.as_ref().and_then(|k| envelope.remove(k)) {
            for (name, items) in links {
                match items {
                    Value::Array(items) => cache.feed(name, items),
                    single @ Value::Object(_) => cache.feed(name, vec![single]),
                    _ => {}
                }
            }
        }

        Ok(envelope.remove(&root).unwrap_or(Value::Null))
    }

    fn pack(&self, model: &Model, kind: PackKind, raw: Value) -> RestResult<Value> {
        if !self.pack_root {
            return Ok(raw);
        }
        let mut envelope = Map::new();
        envelope.insert(self.root_for(model, kind), raw);
        Ok(Value::Object(envelope))
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_first_handles_edges() {
        assert_eq!(lower_first("Bike"), "bike");
        assert_eq!(lower_first("bike"), "bike");
        assert_eq!(lower_first(""), "");
    }

    #[test]
    fn cache_tracks_meta() {
        let mut cache = PackerCache::new();
        assert!(cache.is_empty());
        cache.set_meta(serde_json::json!({"total": 3}));
        assert_eq!(cache.meta(), Some(&serde_json::json!({"total": 3})));
        assert!(cache.take_meta().is_some());
        assert!(cache.is_empty());
    }
}
