//! Collections: ordered sets of records of one model.

use crate::action::lock;
use crate::common::{Common, CommonApi, send_request};
use crate::error::{RestError, RestResult};
use crate::hook::{DispatchLayer, Hook, HookArgs, HookCall, Target};
use crate::model::Model;
use crate::packer::{PackKind, PackerCache};
use crate::record::Record;
use crate::scope::{CollectionScope, Scope, ScopeApi, build_raw_in};
use crate::serializer::Operation;
use restmodel_types::{Method, OpSet, Request};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, warn};

struct CollectionState {
    items: Vec<Record>,
    scope: CollectionScope,
    params: Map<String, Value>,
    resolved: bool,
    meta: Option<Value>,
}

pub(crate) struct CollectionInner {
    model: Model,
    common: Common,
    state: Mutex<CollectionState>,
}

/// An ordered set of records bound to a listing URL.
///
/// Like [`Record`], a `Collection` is a handle with identity equality.
/// Sequence accessors return snapshots.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
    layers: Option<Arc<DispatchLayer>>,
}

/// Non-owning reference to a collection.
#[derive(Clone, Debug, Default)]
pub struct WeakCollection(Weak<CollectionInner>);

impl WeakCollection {
    pub fn upgrade(&self) -> Option<Collection> {
        self.0.upgrade().map(|inner| Collection {
            inner,
            layers: None,
        })
    }
}

impl Collection {
    pub(crate) fn instantiate(model: Model, scope: CollectionScope, params: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                model,
                common: Common::default(),
                state: Mutex::new(CollectionState {
                    items: Vec::new(),
                    scope,
                    params,
                    resolved: false,
                    meta: None,
                }),
            }),
            layers: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, CollectionState> {
        lock(&self.inner.state)
    }

    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    pub fn scope(&self) -> CollectionScope {
        self.state().scope.clone()
    }

    /// Listing URL. `None` for a nested collection whose parent is unbound.
    pub fn url(&self) -> Option<String> {
        self.scope().url(self.model())
    }

    /// Query params sent with every fetch.
    pub fn params(&self) -> Map<String, Value> {
        self.state().params.clone()
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Record> {
        self.state().items.get(index).cloned()
    }

    /// Snapshot of the records, in order.
    pub fn records(&self) -> Vec<Record> {
        self.state().items.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.state().resolved
    }

    pub fn meta(&self) -> Option<Value> {
        self.state().meta.clone()
    }

    pub fn downgrade(&self) -> WeakCollection {
        WeakCollection(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Position of `record` at or after `from`.
    pub fn index_of(&self, record: &Record, from: usize) -> Option<usize> {
        self.position(|r| r.ptr_eq(record), from)
    }

    /// Position of the first record at or after `from` matching `pred`.
    pub fn position<P>(&self, mut pred: P, from: usize) -> Option<usize>
    where
        P: FnMut(&Record) -> bool,
    {
        let items = self.records();
        items
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, r)| pred(r))
            .map(|(idx, _)| idx)
    }

    /// Inserts `record` at `index` (or at the end). Records already in this
    /// collection are left where they are. Fires `after-add`.
    pub fn add(&self, record: &Record, index: Option<usize>) -> RestResult<Self> {
        if !record.model().ptr_eq(self.model()) {
            return Err(RestError::TypeMismatch {
                expected: self.model().name().to_string(),
                actual: record.model().name().to_string(),
            });
        }
        if self.index_of(record, 0).is_some() {
            return Ok(self.clone());
        }
        {
            let mut state = self.state();
            let at = index.map_or(state.items.len(), |idx| idx.min(state.items.len()));
            state.items.insert(at, record.clone());
        }
        if self.is_home_of(record) {
            record.set_revealed(true);
        }
        self.dispatch(Hook::AfterAdd, HookArgs::Record(record))?;
        Ok(self.clone())
    }

    /// Removes `record` if present. Fires `after-remove`.
    pub fn remove(&self, record: &Record) -> RestResult<Self> {
        let removed = {
            let mut state = self.state();
            state
                .items
                .iter()
                .position(|r| r.ptr_eq(record))
                .map(|idx| state.items.remove(idx))
        };
        if let Some(removed) = removed {
            if self.is_home_of(&removed) {
                removed.set_revealed(false);
            }
            self.dispatch(Hook::AfterRemove, HookArgs::Record(&removed))?;
        }
        Ok(self.clone())
    }

    /// Moves `record` to `index` without firing hooks.
    pub(crate) fn reposition(&self, record: &Record, index: usize) {
        let mut state = self.state();
        if let Some(from) = state.items.iter().position(|r| r.ptr_eq(record)) {
            let moved = state.items.remove(from);
            let at = index.min(state.items.len());
            state.items.insert(at, moved);
        }
    }

    /// Empties the collection, after pending actions.
    pub fn clear(&self) -> Self {
        self.sync_action(|this| {
            this.take_items();
            Ok(())
        })
    }

    /// Empties the collection and marks it unresolved, after pending actions.
    pub fn reset(&self) -> Self {
        self.sync_action(|this| {
            this.take_items();
            this.state().resolved = false;
            Ok(())
        })
    }

    fn take_items(&self) {
        let items = std::mem::take(&mut self.state().items);
        for record in items {
            if self.is_home_of(&record) {
                record.set_revealed(false);
            }
        }
    }

    /// Whether `record` is revealed through this collection: its scope
    /// collection is this one, or it has none.
    fn is_home_of(&self, record: &Record) -> bool {
        record.collection().is_none_or(|home| home.ptr_eq(self))
    }

    /// Fetches the listing and appends the decoded records.
    pub fn fetch(&self, params: Option<Map<String, Value>>) -> RestResult<Self> {
        if !self.has_pending_actions() && self.url().is_none() {
            return Err(RestError::Unbound { operation: "fetch" });
        }
        Ok(self.action(move |this, ticket| async move {
            let url = this.url().ok_or(RestError::Unbound { operation: "fetch" })?;
            let mut query = this.params();
            query.extend(params.unwrap_or_default());
            let mut request = Request::new(Method::Get, url).with_params(query);
            this.dispatch(Hook::BeforeFetchMany, HookArgs::Request(&mut request))?;

            match send_request(&this, &ticket, request).await {
                Ok(Some(response)) => {
                    this.unpack(response.data.clone())?;
                    this.state().resolved = true;
                    this.dispatch(Hook::AfterFetchMany, HookArgs::Response(&response))
                }
                Ok(None) => Err(RestError::Canceled),
                Err(err) => {
                    this.dispatch(Hook::AfterFetchManyError, HookArgs::Error(&err))?;
                    Err(err)
                }
            }
        }))
    }

    /// Fetches unless already resolved.
    pub fn resolve(&self, params: Option<Map<String, Value>>) -> RestResult<Self> {
        if self.is_resolved() {
            return Ok(self.clone());
        }
        self.fetch(params)
    }

    /// Resets and fetches again.
    pub fn refresh(&self, params: Option<Map<String, Value>>) -> RestResult<Self> {
        self.reset().fetch(params)
    }

    /// Decodes an array of raw records, revealing each. Fires
    /// `after-feed-many`.
    pub fn decode(&self, raw: &Value, ops: OpSet) -> RestResult<()> {
        self.feed(raw, &Operation::new(ops), None)
    }

    /// Unwraps a server payload with the model's packer and decodes it.
    pub fn unpack(&self, raw: Value) -> RestResult<()> {
        let mut cache = PackerCache::new();
        let data = self
            .model()
            .packer()
            .unpack(self.model(), PackKind::Collection, raw, &mut cache)?;
        if let Some(meta) = cache.take_meta() {
            self.state().meta = Some(meta);
        }
        self.feed(&data, &Operation::read(), Some(&cache))
    }

    pub(crate) fn feed(
        &self,
        raw: &Value,
        operation: &Operation,
        cache: Option<&PackerCache>,
    ) -> RestResult<()> {
        let Value::Array(items) = raw else {
            warn!(model = %self.model().name(), "collection payload is not an array");
            return Err(RestError::Malformed(format!(
                "{} collection payload must be an array",
                self.model().name()
            )));
        };
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let record = build_raw_in(self, item, operation, cache)?;
            record.reveal(true)?;
            records.push(record);
        }
        debug!(model = %self.model().name(), count = records.len(), "collection fed");
        self.dispatch(Hook::AfterFeedMany, HookArgs::Records(&records))
    }
}

impl CommonApi for Collection {
    fn owner_model(&self) -> &Model {
        &self.inner.model
    }

    fn common(&self) -> &Common {
        &self.inner.common
    }

    fn layers(&self) -> Option<&Arc<DispatchLayer>> {
        self.layers.as_ref()
    }

    fn with_layers(&self, layers: Option<Arc<DispatchLayer>>) -> Self {
        Self {
            inner: self.inner.clone(),
            layers,
        }
    }

    fn as_target(&self) -> Target {
        Target::Collection(self.with_layers(None))
    }

    fn bubble(&self, call: &mut HookCall<'_>) -> RestResult<()> {
        self.model().hooks().run(call)
    }
}

impl ScopeApi for Collection {
    fn scope_model(&self) -> &Model {
        &self.inner.model
    }

    fn record_scope(&self) -> Scope {
        Scope::Collection(self.downgrade())
    }

    fn collection_scope(&self) -> CollectionScope {
        self.scope()
    }

    fn scope_params(&self) -> Map<String, Value> {
        self.params()
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.inner.state.try_lock().ok().map(|s| s.items.len());
        f.debug_struct("Collection")
            .field("model", &self.model().name())
            .field("len", &len)
            .finish()
    }
}
