//! Scopes: where records and collections get their URLs from.

use crate::collection::{Collection, WeakCollection};
use crate::common::CommonApi;
use crate::error::RestResult;
use crate::hook::{Hook, HookArgs};
use crate::model::Model;
use crate::packer::PackerCache;
use crate::record::{Record, WeakRecord};
use crate::serializer::{Operation, PRIVATE_MARKER};
use restmodel_types::OpSet;
use serde_json::{Map, Value};

/// URL source of a record.
#[derive(Debug, Clone)]
pub enum Scope {
    /// `model_url/pk`.
    Model,
    /// `collection_url/pk`. Falls back to the model once the collection is
    /// gone.
    Collection(WeakCollection),
    /// `parent_url/segment`, independent of the primary key.
    Singleton { parent: WeakRecord, segment: String },
    /// A fixed URL.
    Fixed(String),
}

impl Scope {
    /// The collection this scope refers to, if it is still alive.
    pub fn collection(&self) -> Option<Collection> {
        match self {
            Scope::Collection(weak) => weak.upgrade(),
            _ => None,
        }
    }

    pub(crate) fn record_url(&self, model: &Model, pk: Option<&Value>) -> Option<String> {
        match self {
            Scope::Model => Some(join_pk(&model.url()?, pk?)),
            Scope::Collection(weak) => match weak.upgrade() {
                Some(collection) => Some(join_pk(&collection.url()?, pk?)),
                None => Some(join_pk(&model.url()?, pk?)),
            },
            Scope::Singleton { parent, segment } => {
                Some(join_segment(&parent.upgrade()?.url()?, segment))
            }
            Scope::Fixed(url) => Some(url.clone()),
        }
    }

    pub(crate) fn create_url(&self, model: &Model) -> Option<String> {
        match self {
            Scope::Model => model.url(),
            Scope::Collection(weak) => match weak.upgrade() {
                Some(collection) => collection.url(),
                None => model.url(),
            },
            Scope::Singleton { .. } | Scope::Fixed(_) => self.record_url(model, None),
        }
    }
}

/// URL source of a collection.
#[derive(Debug, Clone)]
pub enum CollectionScope {
    /// The model URL.
    Model,
    /// `parent_url/segment`; unbound while the parent is.
    Nested { parent: WeakRecord, segment: String },
}

impl CollectionScope {
    pub(crate) fn url(&self, model: &Model) -> Option<String> {
        match self {
            CollectionScope::Model => model.url(),
            CollectionScope::Nested { parent, segment } => {
                Some(join_segment(&parent.upgrade()?.url()?, segment))
            }
        }
    }

    /// The record owning a nested collection.
    pub fn parent(&self) -> Option<Record> {
        match self {
            CollectionScope::Nested { parent, .. } => parent.upgrade(),
            CollectionScope::Model => None,
        }
    }
}

pub(crate) fn join_segment(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

fn join_pk(base: &str, pk: &Value) -> String {
    let segment = match pk {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(&segment)
    )
}

/// Factories for records and collections. Implemented by [`Model`] (the
/// type scope) and [`Collection`].
pub trait ScopeApi {
    #[doc(hidden)]
    fn scope_model(&self) -> &Model;

    /// Scope given to records created here.
    fn record_scope(&self) -> Scope;

    /// Scope given to collections created here.
    fn collection_scope(&self) -> CollectionScope;

    /// Params inherited by collections created here.
    fn scope_params(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Creates a record with defaults applied. Fires `after-init`.
    fn new_record(&self, pk: Option<Value>) -> RestResult<Record> {
        self.new_record_in(pk, self.record_scope())
    }

    /// Like [`new_record`](ScopeApi::new_record) with an explicit scope.
    fn new_record_in(&self, pk: Option<Value>, scope: Scope) -> RestResult<Record> {
        let model = self.scope_model().clone();
        let defaults: Vec<(String, Value)> = model
            .defaults()
            .iter()
            .map(|(name, value)| (name.clone(), value.resolve()))
            .collect();
        let record = Record::instantiate(model, pk, scope);
        for (name, value) in defaults {
            record.set(&name, value);
        }
        record.dispatch(Hook::AfterInit, HookArgs::None)?;
        Ok(record)
    }

    /// Creates a record and copies `init` onto it. The record is not added
    /// to any collection.
    fn build(&self, init: Map<String, Value>) -> RestResult<Record> {
        let record = self.new_record(None)?;
        for (name, value) in init {
            if !name.starts_with(PRIVATE_MARKER) {
                record.set(&name, value);
            }
        }
        Ok(record)
    }

    /// Creates a record from raw server data.
    fn build_raw(&self, raw: &Value, ops: OpSet) -> RestResult<Record> {
        build_raw_in(self, raw, &Operation::new(ops), None)
    }

    /// Creates a record for `pk` and fetches it.
    fn find(&self, pk: impl Into<Value>, params: Option<Map<String, Value>>) -> RestResult<Record> {
        self.new_record(Some(pk.into()))?.resolve(params)
    }

    /// Builds a record and saves it. It is revealed once the create succeeds.
    fn create(&self, attrs: Map<String, Value>) -> RestResult<Record> {
        self.build(attrs)?.save()
    }

    /// Creates an empty collection with inherited and given params.
    fn collection(&self, params: Map<String, Value>) -> Collection {
        self.collection_in(params, self.collection_scope())
    }

    fn collection_in(&self, params: Map<String, Value>, scope: CollectionScope) -> Collection {
        let mut merged = self.scope_params();
        merged.extend(params);
        Collection::instantiate(self.scope_model().clone(), scope, merged)
    }

    /// Creates a collection and fetches it.
    fn search(&self, params: Map<String, Value>) -> RestResult<Collection> {
        self.collection(params).fetch(None)
    }
}

/// Creates a record in `scope` from raw data, using side-loaded data from
/// `cache` for its relations.
pub(crate) fn build_raw_in<S: ScopeApi + ?Sized>(
    scope: &S,
    raw: &Value,
    operation: &Operation,
    cache: Option<&PackerCache>,
) -> RestResult<Record> {
    let pk = scope.scope_model().infer_key(raw);
    let record = scope.new_record(pk)?;
    record.decode_with(raw, operation, cache)?;
    Ok(record)
}
