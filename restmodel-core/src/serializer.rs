//! Rule-driven translation between raw JSON and record state.
//!
//! A model's [`Ruleset`] holds per-path rules:
//! - masks hide a path for some operations (or dynamically),
//! - mappings read a local attribute from another raw location,
//! - decoders and encoders transform single values,
//! - volatile paths are dropped from the record once encoded.
//!
//! Decoding walks the raw object level by level. Explicit mappings for the
//! current level are processed first; every remaining raw key is then
//! renamed with the naming strategy and decoded under its local name unless
//! it is private (`$` prefix), already mapped, or masked. Objects recurse;
//! arrays recurse per element under the `name[]` node. Encoding mirrors this.

use crate::collection::Collection;
use crate::error::{RestError, RestResult};
use crate::packer::PackerCache;
use crate::record::{Record, WeakRecord};
use restmodel_types::{Naming, OpSet, path};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Attribute names starting with this marker are never (de)serialized.
pub const PRIVATE_MARKER: char = '$';

/// Dynamic mask predicate.
pub type MaskFn = Arc<dyn Fn(&Record, OpSet) -> bool + Send + Sync>;

/// Decoder: receives the raw value (absent for forced mappings) and returns
/// the decoded attribute, or `None` to leave the record untouched.
pub type DecodeFn =
    Arc<dyn Fn(&DecodeCx<'_>, Option<&Value>) -> RestResult<Option<Attr>> + Send + Sync>;

/// Encoder: receives the local value and returns the raw value, or `None` to
/// omit it.
pub type EncodeFn =
    Arc<dyn Fn(&EncodeCx<'_>, Option<AttrRef<'_>>) -> RestResult<Option<Value>> + Send + Sync>;

/// When a path is hidden.
#[derive(Clone)]
pub enum Mask {
    /// Always.
    All,
    /// For the listed operations.
    Ops(OpSet),
    /// When the predicate returns true.
    Dynamic(MaskFn),
}

impl Mask {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Record, OpSet) -> bool + Send + Sync + 'static,
    {
        Mask::Dynamic(Arc::new(f))
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mask::All => f.write_str("All"),
            Mask::Ops(ops) => write!(f, "Ops({ops})"),
            Mask::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// A related instance stored on a record.
#[derive(Debug, Clone)]
pub enum Related {
    Record(Record),
    Collection(Collection),
    /// Back-reference to the owner of a nested child.
    Inverse(WeakRecord),
}

impl Related {
    /// The related record, if it is (still) alive.
    pub fn as_record(&self) -> Option<Record> {
        match self {
            Related::Record(record) => Some(record.clone()),
            Related::Inverse(weak) => weak.upgrade(),
            Related::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Related::Collection(collection) => Some(collection),
            _ => None,
        }
    }
}

/// A decoded top-level attribute.
#[derive(Debug, Clone)]
pub enum Attr {
    Value(Value),
    Related(Related),
}

/// Borrowed view of a local attribute.
#[derive(Debug, Clone, Copy)]
pub enum AttrRef<'a> {
    Value(&'a Value),
    Related(&'a Related),
}

impl<'a> AttrRef<'a> {
    pub fn as_value(self) -> Option<&'a Value> {
        match self {
            AttrRef::Value(value) => Some(value),
            AttrRef::Related(_) => None,
        }
    }
}

/// The operation being (de)serialized for, with an optional patch filter.
#[derive(Debug, Clone)]
pub struct Operation {
    ops: OpSet,
    patch: Option<Arc<[String]>>,
}

impl Operation {
    pub fn new(ops: OpSet) -> Self {
        Self { ops, patch: None }
    }

    pub fn read() -> Self {
        Self::new(OpSet::READ)
    }

    /// Restricts encoding to paths related to one of `paths`.
    pub fn patch(ops: OpSet, paths: Arc<[String]>) -> Self {
        Self {
            ops,
            patch: Some(paths),
        }
    }

    pub fn ops(&self) -> OpSet {
        self.ops
    }

    fn excludes(&self, full: &str) -> bool {
        self.patch
            .as_ref()
            .is_some_and(|list| !list.iter().any(|p| path::is_related(full, p)))
    }
}

/// Context handed to decoders.
pub struct DecodeCx<'a> {
    pub record: &'a Record,
    /// The raw object at the level being decoded.
    pub raw: &'a Map<String, Value>,
    /// Side-loaded data from the packer, if any.
    pub cache: Option<&'a PackerCache>,
    pub operation: &'a Operation,
}

/// Context handed to encoders.
pub struct EncodeCx<'a> {
    pub record: &'a Record,
    pub operation: &'a Operation,
}

#[derive(Debug, Clone)]
struct Mapping {
    leaf: String,
    /// Raw path relative to the node; `None` maps the renamed leaf.
    raw: Option<Vec<String>>,
    forced: bool,
}

/// Per-path serialization rules of a model.
#[derive(Clone)]
pub struct Ruleset {
    naming: Arc<dyn Naming>,
    masks: HashMap<String, Mask>,
    mappings: HashMap<String, Vec<Mapping>>,
    mapped: HashSet<String>,
    claimed: HashMap<String, HashSet<String>>,
    decoders: HashMap<String, DecodeFn>,
    encoders: HashMap<String, EncodeFn>,
    volatile: HashSet<String>,
}

impl Ruleset {
    pub fn new(naming: Arc<dyn Naming>) -> Self {
        Self {
            naming,
            masks: HashMap::new(),
            mappings: HashMap::new(),
            mapped: HashSet::new(),
            claimed: HashMap::new(),
            decoders: HashMap::new(),
            encoders: HashMap::new(),
            volatile: HashSet::new(),
        }
    }

    pub fn naming(&self) -> &Arc<dyn Naming> {
        &self.naming
    }

    pub fn set_mask(&mut self, local: &str, mask: Mask) -> RestResult<()> {
        path::parse(local)?;
        self.masks.insert(local.to_string(), mask);
        Ok(())
    }

    /// Maps local `local` to raw `raw`. A raw path of `*` means "the local
    /// leaf name, renamed". Forced mappings run their decoder and encoder
    /// even when the value is absent.
    pub fn set_mapping(&mut self, local: &str, raw: &str, forced: bool) -> RestResult<()> {
        path::parse(local)?;
        let raw = if raw == "*" {
            None
        } else {
            Some(path::parse(raw)?)
        };
        let (node, leaf) = path::split_leaf(local);
        if let Some([single]) = raw.as_deref() {
            self.claim(node, single);
        }
        let mappings = self.mappings.entry(node.to_string()).or_default();
        mappings.retain(|m| m.leaf != leaf);
        mappings.push(Mapping {
            leaf: leaf.to_string(),
            raw,
            forced,
        });
        self.mapped.insert(local.to_string());
        Ok(())
    }

    /// Marks a raw key at `node` as consumed by a rule, so the implicit scan
    /// skips it.
    pub fn claim(&mut self, node: &str, raw_key: &str) {
        self.claimed
            .entry(node.to_string())
            .or_default()
            .insert(raw_key.to_string());
    }

    /// Installs a decoder. With `chain`, the new decoder receives the output
    /// of the existing one.
    pub fn set_decoder(&mut self, local: &str, f: DecodeFn, chain: bool) -> RestResult<()> {
        path::parse(local)?;
        let decoder = match self.decoders.remove(local) {
            Some(prev) if chain => {
                let chained: DecodeFn = Arc::new(move |cx: &DecodeCx<'_>, raw: Option<&Value>| match prev(cx, raw)? {
                    Some(Attr::Value(value)) => f(cx, Some(&value)),
                    other => Ok(other),
                });
                chained
            }
            _ => f,
        };
        self.decoders.insert(local.to_string(), decoder);
        Ok(())
    }

    /// Installs an encoder. With `chain`, the new encoder receives the output
    /// of the existing one.
    pub fn set_encoder(&mut self, local: &str, f: EncodeFn, chain: bool) -> RestResult<()> {
        path::parse(local)?;
        let encoder = match self.encoders.remove(local) {
            Some(prev) if chain => {
                let chained: EncodeFn = Arc::new(move |cx: &EncodeCx<'_>, value: Option<AttrRef<'_>>| match prev(cx, value)? {
                    Some(raw) => f(cx, Some(AttrRef::Value(&raw))),
                    None => Ok(None),
                });
                chained
            }
            _ => f,
        };
        self.encoders.insert(local.to_string(), encoder);
        Ok(())
    }

    pub fn set_volatile(&mut self, local: &str) -> RestResult<()> {
        path::parse(local)?;
        self.volatile.insert(local.to_string());
        Ok(())
    }

    /// Returns true if `full` is hidden for this operation.
    pub fn is_masked(&self, record: &Record, full: &str, operation: &Operation) -> bool {
        if operation.excludes(full) {
            return true;
        }
        match self.masks.get(full) {
            None => false,
            Some(Mask::All) => true,
            Some(Mask::Ops(ops)) => ops.intersects(operation.ops()),
            Some(Mask::Dynamic(f)) => f(record, operation.ops()),
        }
    }

    // ── Decoding ─────────────────────────────────────────────────

    /// Decodes the top level of `cx.raw` into attribute writes.
    pub(crate) fn decode(&self, cx: &DecodeCx<'_>) -> RestResult<Vec<(String, Attr)>> {
        self.decode_level(cx, "")
    }

    fn decode_level(&self, cx: &DecodeCx<'_>, node: &str) -> RestResult<Vec<(String, Attr)>> {
        let mut out = Vec::new();

        if let Some(mappings) = self.mappings.get(node) {
            for mapping in mappings {
                let full = path::join(node, &mapping.leaf);
                if self.is_masked(cx.record, &full, cx.operation) {
                    continue;
                }
                let value = match &mapping.raw {
                    Some(segments) => path::extract_from(cx.raw, segments),
                    None => cx.raw.get(&self.naming.encode(&mapping.leaf)),
                };
                if value.is_none() && !mapping.forced {
                    continue;
                }
                if let Some(attr) = self.decode_prop(cx, value, &full)? {
                    out.push((mapping.leaf.clone(), attr));
                }
            }
        }

        let claimed = self.claimed.get(node);
        for (key, value) in cx.raw {
            if claimed.is_some_and(|keys| keys.contains(key)) {
                continue;
            }
            let name = self.naming.decode(key);
            if name.starts_with(PRIVATE_MARKER) {
                continue;
            }
            let full = path::join(node, &name);
            if self.mapped.contains(&full) || self.is_masked(cx.record, &full, cx.operation) {
                continue;
            }
            if let Some(attr) = self.decode_prop(cx, Some(value), &full)? {
                out.push((name, attr));
            }
        }

        Ok(out)
    }

    fn decode_prop(
        &self,
        cx: &DecodeCx<'_>,
        value: Option<&Value>,
        full: &str,
    ) -> RestResult<Option<Attr>> {
        if let Some(decoder) = self.decoders.get(full) {
            return decoder(cx, value);
        }
        match value {
            None => Ok(None),
            Some(Value::Object(map)) => {
                let nested = DecodeCx {
                    record: cx.record,
                    raw: map,
                    cache: cx.cache,
                    operation: cx.operation,
                };
                let mut object = Map::new();
                for (name, attr) in self.decode_level(&nested, full)? {
                    object.insert(name, nested_value(attr, full)?);
                }
                Ok(Some(Attr::Value(Value::Object(object))))
            }
            Some(Value::Array(items)) => {
                let element = path::element_node(full);
                let mut decoded = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(attr) = self.decode_prop(cx, Some(item), &element)? {
                        decoded.push(nested_value(attr, &element)?);
                    }
                }
                Ok(Some(Attr::Value(Value::Array(decoded))))
            }
            Some(other) => Ok(Some(Attr::Value(other.clone()))),
        }
    }

    // ── Encoding ─────────────────────────────────────────────────

    /// Encodes the record state. Paths of volatile attributes that were read
    /// are appended to `volatile`.
    pub(crate) fn encode(
        &self,
        cx: &EncodeCx<'_>,
        attrs: &Map<String, Value>,
        relations: &BTreeMap<String, Related>,
        volatile: &mut Vec<String>,
    ) -> RestResult<Map<String, Value>> {
        self.encode_level(cx, &TopLevel { attrs, relations }, "", volatile)
    }

    fn encode_level(
        &self,
        cx: &EncodeCx<'_>,
        level: &dyn Level,
        node: &str,
        volatile: &mut Vec<String>,
    ) -> RestResult<Map<String, Value>> {
        let mut raw = Map::new();

        for (name, value) in level.entries() {
            if name.starts_with(PRIVATE_MARKER) {
                continue;
            }
            let full = path::join(node, name);
            if self.mapped.contains(&full) || self.is_masked(cx.record, &full, cx.operation) {
                continue;
            }
            self.note_volatile(&full, volatile);
            if let Some(encoded) = self.encode_prop(cx, Some(value), &full, volatile)? {
                raw.insert(self.naming.encode(name), encoded);
            }
        }

        if let Some(mappings) = self.mappings.get(node) {
            for mapping in mappings {
                let full = path::join(node, &mapping.leaf);
                if self.is_masked(cx.record, &full, cx.operation) {
                    continue;
                }
                let value = level.get(&mapping.leaf);
                if value.is_none() && !mapping.forced {
                    continue;
                }
                if value.is_some() {
                    self.note_volatile(&full, volatile);
                }
                let Some(encoded) = self.encode_prop(cx, value, &full, volatile)? else {
                    continue;
                };
                match &mapping.raw {
                    Some(segments) => path::insert(&mut raw, segments, encoded),
                    None => {
                        raw.insert(self.naming.encode(&mapping.leaf), encoded);
                    }
                }
            }
        }

        Ok(raw)
    }

    fn encode_prop(
        &self,
        cx: &EncodeCx<'_>,
        value: Option<AttrRef<'_>>,
        full: &str,
        volatile: &mut Vec<String>,
    ) -> RestResult<Option<Value>> {
        if let Some(encoder) = self.encoders.get(full) {
            return encoder(cx, value);
        }
        match value {
            None | Some(AttrRef::Related(_)) => Ok(None),
            Some(AttrRef::Value(Value::Object(map))) => Ok(Some(Value::Object(
                self.encode_level(cx, map, full, volatile)?,
            ))),
            Some(AttrRef::Value(Value::Array(items))) => {
                let element = path::element_node(full);
                let mut encoded = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(raw) =
                        self.encode_prop(cx, Some(AttrRef::Value(item)), &element, volatile)?
                    {
                        encoded.push(raw);
                    }
                }
                Ok(Some(Value::Array(encoded)))
            }
            Some(AttrRef::Value(other)) => Ok(Some(other.clone())),
        }
    }

    fn note_volatile(&self, full: &str, volatile: &mut Vec<String>) {
        if self.volatile.contains(full) && !volatile.iter().any(|p| p == full) {
            volatile.push(full.to_string());
        }
    }
}

impl fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ruleset")
            .field("naming", &self.naming)
            .field("masks", &self.masks)
            .field("mapped", &self.mapped)
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .field("encoders", &self.encoders.keys().collect::<Vec<_>>())
            .field("volatile", &self.volatile)
            .finish()
    }
}

fn nested_value(attr: Attr, node: &str) -> RestResult<Value> {
    match attr {
        Attr::Value(value) => Ok(value),
        Attr::Related(_) => Err(RestError::Definition(format!(
            "decoder under {node:?} produced a relation; relations are top-level only"
        ))),
    }
}

/// One level of local state being encoded.
trait Level {
    fn entries(&self) -> Vec<(&str, AttrRef<'_>)>;
    fn get(&self, name: &str) -> Option<AttrRef<'_>>;
}

impl Level for Map<String, Value> {
    fn entries(&self) -> Vec<(&str, AttrRef<'_>)> {
        self.iter()
            .map(|(k, v)| (k.as_str(), AttrRef::Value(v)))
            .collect()
    }

    fn get(&self, name: &str) -> Option<AttrRef<'_>> {
        Map::get(self, name).map(AttrRef::Value)
    }
}

struct TopLevel<'a> {
    attrs: &'a Map<String, Value>,
    relations: &'a BTreeMap<String, Related>,
}

impl Level for TopLevel<'_> {
    fn entries(&self) -> Vec<(&str, AttrRef<'_>)> {
        let mut entries = Level::entries(self.attrs);
        entries.extend(
            self.relations
                .iter()
                .map(|(k, r)| (k.as_str(), AttrRef::Related(r))),
        );
        entries
    }

    fn get(&self, name: &str) -> Option<AttrRef<'_>> {
        self.relations
            .get(name)
            .map(AttrRef::Related)
            .or_else(|| Level::get(self.attrs, name))
    }
}
