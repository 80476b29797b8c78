//! Model definition rules.
//!
//! A model is described by an ordered list of [`Rule`]s. [`ModelBuilder`]
//! collects them for one model; a [`Mixin`] is a reusable bundle of rules
//! spliced into any builder with [`Define::mixin`]. Later rules override
//! earlier ones for the same path.
//!
//! [`ModelBuilder`]: crate::ModelBuilder

use crate::error::RestResult;
use crate::hook::{Hook, HookCall, HookFn};
use crate::model::KeyFn;
use crate::packer::Packer;
use crate::relation::{Relation, RelationDef, RelationKind};
use crate::serializer::{Attr, AttrRef, DecodeCx, DecodeFn, EncodeCx, EncodeFn, Mask};
use restmodel_types::Naming;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Wraps the previous key inference strategy.
pub type KeyWrapper = Arc<dyn Fn(KeyFn) -> KeyFn + Send + Sync>;

/// Wraps the previous packer.
pub type PackerWrapper = Arc<dyn Fn(Arc<dyn Packer>) -> Arc<dyn Packer> + Send + Sync>;

/// Initial value of a new record's attribute.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    /// Computed for every new record.
    With(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub(crate) fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::With(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => write!(f, "Value({value})"),
            DefaultValue::With(_) => f.write_str("With(..)"),
        }
    }
}

/// One definition rule.
#[derive(Clone)]
pub enum Rule {
    Mask(String, Mask),
    Map {
        local: String,
        raw: String,
        forced: bool,
    },
    Decoder {
        path: String,
        f: DecodeFn,
        chain: bool,
    },
    Encoder {
        path: String,
        f: EncodeFn,
        chain: bool,
    },
    Volatile(String),
    Default(String, DefaultValue),
    Hook(Hook, HookFn),
    Relation(RelationDef),
    Naming(Arc<dyn Naming>),
    PrimaryKey(String),
    InferKey(KeyWrapper),
    Packer(PackerWrapper),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Mask(path, mask) => write!(f, "Mask({path}, {mask:?})"),
            Rule::Map { local, raw, forced } => {
                write!(f, "Map({local} -> {raw}, forced: {forced})")
            }
            Rule::Decoder { path, chain, .. } => write!(f, "Decoder({path}, chain: {chain})"),
            Rule::Encoder { path, chain, .. } => write!(f, "Encoder({path}, chain: {chain})"),
            Rule::Volatile(path) => write!(f, "Volatile({path})"),
            Rule::Default(name, value) => write!(f, "Default({name}, {value:?})"),
            Rule::Hook(hook, _) => write!(f, "Hook({hook})"),
            Rule::Relation(def) => write!(f, "Relation({}, {:?})", def.name(), def.kind()),
            Rule::Naming(naming) => write!(f, "Naming({naming:?})"),
            Rule::PrimaryKey(field) => write!(f, "PrimaryKey({field})"),
            Rule::InferKey(_) => f.write_str("InferKey(..)"),
            Rule::Packer(_) => f.write_str("Packer(..)"),
        }
    }
}

/// Rule-collecting builder methods shared by [`ModelBuilder`](crate::ModelBuilder)
/// and [`Mixin`].
pub trait Define: Sized {
    /// Appends a raw rule.
    fn rule(self, rule: Rule) -> Self;

    /// Hides `path` as described by `mask`.
    fn mask(self, path: &str, mask: Mask) -> Self {
        self.rule(Rule::Mask(path.to_string(), mask))
    }

    /// Reads local `path` from raw `raw` (dotted, or `*` for the renamed
    /// local name).
    fn map(self, path: &str, raw: &str) -> Self {
        self.rule(Rule::Map {
            local: path.to_string(),
            raw: raw.to_string(),
            forced: false,
        })
    }

    /// Like [`map`](Define::map), but the rule runs even when the raw value
    /// is absent.
    fn map_forced(self, path: &str, raw: &str) -> Self {
        self.rule(Rule::Map {
            local: path.to_string(),
            raw: raw.to_string(),
            forced: true,
        })
    }

    /// Transforms present raw values at `path`.
    fn decoder<F>(self, path: &str, f: F) -> Self
    where
        F: Fn(&Value) -> RestResult<Value> + Send + Sync + 'static,
    {
        self.rule(Rule::Decoder {
            path: path.to_string(),
            f: value_decoder(f),
            chain: false,
        })
    }

    /// Transforms the output of the existing decoder at `path`.
    fn chain_decoder<F>(self, path: &str, f: F) -> Self
    where
        F: Fn(&Value) -> RestResult<Value> + Send + Sync + 'static,
    {
        self.rule(Rule::Decoder {
            path: path.to_string(),
            f: value_decoder(f),
            chain: true,
        })
    }

    /// Installs a decoder with full access to the decoding context.
    fn decoder_with<F>(self, path: &str, f: F) -> Self
    where
        F: Fn(&DecodeCx<'_>, Option<&Value>) -> RestResult<Option<Attr>> + Send + Sync + 'static,
    {
        self.rule(Rule::Decoder {
            path: path.to_string(),
            f: Arc::new(f),
            chain: false,
        })
    }

    /// Transforms present local values at `path`.
    fn encoder<F>(self, path: &str, f: F) -> Self
    where
        F: Fn(&Value) -> RestResult<Value> + Send + Sync + 'static,
    {
        self.rule(Rule::Encoder {
            path: path.to_string(),
            f: value_encoder(f),
            chain: false,
        })
    }

    /// Transforms the output of the existing encoder at `path`.
    fn chain_encoder<F>(self, path: &str, f: F) -> Self
    where
        F: Fn(&Value) -> RestResult<Value> + Send + Sync + 'static,
    {
        self.rule(Rule::Encoder {
            path: path.to_string(),
            f: value_encoder(f),
            chain: true,
        })
    }

    /// Installs an encoder with full access to the encoding context.
    fn encoder_with<F>(self, path: &str, f: F) -> Self
    where
        F: Fn(&EncodeCx<'_>, Option<AttrRef<'_>>) -> RestResult<Option<Value>> + Send + Sync + 'static,
    {
        self.rule(Rule::Encoder {
            path: path.to_string(),
            f: Arc::new(f),
            chain: false,
        })
    }

    /// Drops `path` from the record once it has been encoded.
    fn volatile(self, path: &str) -> Self {
        self.rule(Rule::Volatile(path.to_string()))
    }

    fn default_value(self, name: &str, value: impl Into<Value>) -> Self {
        self.rule(Rule::Default(
            name.to_string(),
            DefaultValue::Value(value.into()),
        ))
    }

    fn default_with<F>(self, name: &str, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.rule(Rule::Default(name.to_string(), DefaultValue::With(Arc::new(f))))
    }

    /// Registers a type-level hook.
    fn on<F>(self, hook: Hook, f: F) -> Self
    where
        F: Fn(&mut HookCall<'_>) -> RestResult<()> + Send + Sync + 'static,
    {
        self.rule(Rule::Hook(hook, Arc::new(f)))
    }

    fn has_many(self, name: &str, relation: Relation) -> Self {
        self.rule(Rule::Relation(RelationDef::new(name, RelationKind::HasMany, relation)))
    }

    fn has_one(self, name: &str, relation: Relation) -> Self {
        self.rule(Rule::Relation(RelationDef::new(name, RelationKind::HasOne, relation)))
    }

    fn belongs_to(self, name: &str, relation: Relation) -> Self {
        self.rule(Rule::Relation(RelationDef::new(name, RelationKind::BelongsTo, relation)))
    }

    fn belongs_to_many(self, name: &str, relation: Relation) -> Self {
        self.rule(Rule::Relation(RelationDef::new(
            name,
            RelationKind::BelongsToMany,
            relation,
        )))
    }

    /// Overrides the naming strategy.
    fn naming(self, naming: impl Naming + 'static) -> Self {
        self.rule(Rule::Naming(Arc::new(naming)))
    }

    /// Reads the primary key from `field` instead of the configured one.
    fn primary_key(self, field: &str) -> Self {
        self.rule(Rule::PrimaryKey(field.to_string()))
    }

    /// Replaces key inference; `f` receives the previous strategy.
    fn wrap_infer_key<F>(self, f: F) -> Self
    where
        F: Fn(KeyFn) -> KeyFn + Send + Sync + 'static,
    {
        self.rule(Rule::InferKey(Arc::new(f)))
    }

    fn packer(self, packer: impl Packer + 'static) -> Self {
        let packer: Arc<dyn Packer> = Arc::new(packer);
        self.rule(Rule::Packer(Arc::new(move |_: Arc<dyn Packer>| packer.clone())))
    }

    /// Replaces the packer; `f` receives the previous one.
    fn wrap_packer<F>(self, f: F) -> Self
    where
        F: Fn(Arc<dyn Packer>) -> Arc<dyn Packer> + Send + Sync + 'static,
    {
        self.rule(Rule::Packer(Arc::new(f)))
    }

    /// Appends every rule of `mixin`.
    fn mixin(self, mixin: &Mixin) -> Self {
        mixin
            .rules
            .iter()
            .cloned()
            .fold(self, |acc, rule| acc.rule(rule))
    }
}

/// A reusable bundle of rules.
#[derive(Clone, Default, Debug)]
pub struct Mixin {
    rules: Vec<Rule>,
}

impl Mixin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Define for Mixin {
    fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

fn value_decoder<F>(f: F) -> DecodeFn
where
    F: Fn(&Value) -> RestResult<Value> + Send + Sync + 'static,
{
    Arc::new(move |_: &DecodeCx<'_>, raw: Option<&Value>| {
        raw.map(|v| f(v).map(Attr::Value)).transpose()
    })
}

fn value_encoder<F>(f: F) -> EncodeFn
where
    F: Fn(&Value) -> RestResult<Value> + Send + Sync + 'static,
{
    Arc::new(move |_: &EncodeCx<'_>, value: Option<AttrRef<'_>>| match value.and_then(AttrRef::as_value) {
        Some(v) => f(v).map(Some),
        None => Ok(None),
    })
}
