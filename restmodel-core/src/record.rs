//! Records: single resource instances.

use crate::action::{ActionTicket, lock};
use crate::collection::Collection;
use crate::common::{Common, CommonApi, send_request};
use crate::error::{RestError, RestResult};
use crate::hook::{DispatchLayer, Hook, HookArgs, HookCall, Target};
use crate::model::Model;
use crate::packer::{PackKind, PackerCache};
use crate::relation;
use crate::scope::Scope;
use crate::serializer::{Attr, DecodeCx, EncodeCx, Operation, PRIVATE_MARKER, Related};
use restmodel_types::{Method, OpSet, Request, path};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info};

/// Where a record goes when it is revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RevealAt {
    End,
    Index(usize),
    Suppressed,
}

struct RecordState {
    pk: Option<Value>,
    attrs: Map<String, Value>,
    relations: BTreeMap<String, Related>,
    scope: Scope,
    revealed: bool,
    reveal_at: RevealAt,
    resolved: bool,
    meta: Option<Value>,
}

pub(crate) struct RecordInner {
    model: Model,
    common: Common,
    state: Mutex<RecordState>,
}

/// A single resource instance.
///
/// `Record` is a handle: clones share the same instance, and equality is
/// identity. Attributes are plain JSON values; relations are stored
/// separately and accessed with [`relation`](Record::relation).
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
    layers: Option<Arc<DispatchLayer>>,
}

/// Non-owning reference to a record.
#[derive(Clone, Debug, Default)]
pub struct WeakRecord(Weak<RecordInner>);

impl WeakRecord {
    pub fn upgrade(&self) -> Option<Record> {
        self.0.upgrade().map(|inner| Record {
            inner,
            layers: None,
        })
    }
}

impl Record {
    pub(crate) fn instantiate(model: Model, pk: Option<Value>, scope: Scope) -> Self {
        Self {
            inner: Arc::new(RecordInner {
                model,
                common: Common::default(),
                state: Mutex::new(RecordState {
                    pk,
                    attrs: Map::new(),
                    relations: BTreeMap::new(),
                    scope,
                    revealed: false,
                    reveal_at: RevealAt::End,
                    resolved: false,
                    meta: None,
                }),
            }),
            layers: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, RecordState> {
        lock(&self.inner.state)
    }

    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    pub fn pk(&self) -> Option<Value> {
        self.state().pk.clone()
    }

    /// Returns true until the record has a primary key.
    pub fn is_new(&self) -> bool {
        self.state().pk.is_none()
    }

    pub fn scope(&self) -> Scope {
        self.state().scope.clone()
    }

    /// URL used to fetch, update and destroy this record. `None` while the
    /// record is not bound.
    pub fn url(&self) -> Option<String> {
        let (scope, pk) = {
            let state = self.state();
            (state.scope.clone(), state.pk.clone())
        };
        scope.record_url(self.model(), pk.as_ref())
    }

    /// URL a new record is created at.
    pub fn create_url(&self) -> Option<String> {
        self.scope().create_url(self.model())
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.state().attrs.get(name).cloned()
    }

    /// Reads a nested attribute by dotted path.
    pub fn get_path(&self, local: &str) -> Option<Value> {
        let segments: Vec<&str> = local.split(path::SEPARATOR).collect();
        path::extract_from(&self.state().attrs, &segments).cloned()
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> &Self {
        let mut state = self.state();
        state.relations.remove(name);
        state.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Writes a nested attribute by dotted path, creating intermediate objects.
    pub fn set_path(&self, local: &str, value: impl Into<Value>) -> &Self {
        path::insert_path(&mut self.state().attrs, local, value.into());
        self
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.state().attrs.remove(name)
    }

    /// Snapshot of the attribute values (relations excluded).
    pub fn attributes(&self) -> Map<String, Value> {
        self.state().attrs.clone()
    }

    /// Returns a relation, creating empty `has_many`/`has_one`/
    /// `belongs_to_many` relations on first access.
    pub fn relation(&self, name: &str) -> RestResult<Option<Related>> {
        if let Some(related) = self.state().relations.get(name) {
            return Ok(Some(related.clone()));
        }
        let Some(def) = self.model().relation_def(name) else {
            return Ok(None);
        };
        let Some(created) = relation::init(def, self)? else {
            return Ok(None);
        };
        let mut state = self.state();
        let slot = state
            .relations
            .entry(name.to_string())
            .or_insert(created);
        Ok(Some(slot.clone()))
    }

    pub fn set_relation(&self, name: &str, related: Related) -> &Self {
        let mut state = self.state();
        state.attrs.remove(name);
        state.relations.insert(name.to_string(), related);
        self
    }

    /// Whether the record is currently in its collection.
    pub fn is_revealed(&self) -> bool {
        self.state().revealed
    }

    /// Whether the record has been fetched successfully.
    pub fn is_resolved(&self) -> bool {
        self.state().resolved
    }

    /// Metadata extracted by the packer from the last payload.
    pub fn meta(&self) -> Option<Value> {
        self.state().meta.clone()
    }

    pub fn downgrade(&self) -> WeakRecord {
        WeakRecord(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_revealed(&self, revealed: bool) {
        self.state().revealed = revealed;
    }

    // ── Serialization ────────────────────────────────────────────

    /// Decodes raw data into this record. Fires `after-feed`.
    pub fn decode(&self, raw: &Value, ops: OpSet) -> RestResult<()> {
        self.decode_with(raw, &Operation::new(ops), None)
    }

    pub(crate) fn decode_with(
        &self,
        raw: &Value,
        operation: &Operation,
        cache: Option<&PackerCache>,
    ) -> RestResult<()> {
        let Value::Object(map) = raw else {
            return Err(RestError::Malformed(format!(
                "{} payload must be an object, got {raw}",
                self.model().name()
            )));
        };
        if self.is_new() {
            let pk = self.model().infer_key(raw);
            self.state().pk = pk;
        }

        let cx = DecodeCx {
            record: self,
            raw: map,
            cache,
            operation,
        };
        let writes = self.model().rules().decode(&cx)?;
        {
            let mut state = self.state();
            for (name, attr) in writes {
                match attr {
                    Attr::Value(value) => {
                        state.relations.remove(&name);
                        state.attrs.insert(name, value);
                    }
                    Attr::Related(related) => {
                        state.attrs.remove(&name);
                        state.relations.insert(name, related);
                    }
                }
            }
        }
        self.dispatch(Hook::AfterFeed, HookArgs::Raw(raw))
    }

    /// Encodes this record for `ops`. Fires `before-render`.
    pub fn encode(&self, ops: OpSet) -> RestResult<Value> {
        self.encode_with(&Operation::new(ops))
    }

    pub(crate) fn encode_with(&self, operation: &Operation) -> RestResult<Value> {
        let (attrs, relations) = {
            let state = self.state();
            (state.attrs.clone(), state.relations.clone())
        };
        let cx = EncodeCx {
            record: self,
            operation,
        };
        let mut volatile = Vec::new();
        let encoded = self
            .model()
            .rules()
            .encode(&cx, &attrs, &relations, &mut volatile)?;
        if !volatile.is_empty() {
            let mut state = self.state();
            for local in &volatile {
                if path::split_leaf(local).0.is_empty() {
                    state.attrs.remove(local);
                    state.relations.remove(local);
                } else {
                    path::remove_path(&mut state.attrs, local);
                }
            }
        }

        let mut raw = Value::Object(encoded);
        self.dispatch(Hook::BeforeRender, HookArgs::RawMut(&mut raw))?;
        Ok(raw)
    }

    /// Encodes and wraps this record with the model's packer.
    pub fn pack(&self, ops: OpSet) -> RestResult<Value> {
        self.pack_with(&Operation::new(ops))
    }

    fn pack_with(&self, operation: &Operation) -> RestResult<Value> {
        let raw = self.encode_with(operation)?;
        self.model()
            .packer()
            .pack(self.model(), PackKind::Record, raw)
    }

    /// Unwraps a server payload with the model's packer and decodes it.
    pub fn unpack(&self, raw: Value) -> RestResult<()> {
        let mut cache = PackerCache::new();
        let data = self
            .model()
            .packer()
            .unpack(self.model(), PackKind::Record, raw, &mut cache)?;
        if let Some(meta) = cache.take_meta() {
            self.state().meta = Some(meta);
        }
        self.decode_with(&data, &Operation::read(), Some(&cache))
    }

    // ── Network operations ───────────────────────────────────────

    /// Fails fast with [`RestError::Unbound`] when nothing is queued and the
    /// URL cannot be resolved. With queued actions the check is deferred to
    /// the action itself.
    fn precheck(&self, operation: &'static str, url: impl FnOnce(&Self) -> Option<String>) -> RestResult<()> {
        if !self.has_pending_actions() && url(self).is_none() {
            return Err(RestError::Unbound { operation });
        }
        Ok(())
    }

    /// Fetches this record (`GET url`).
    pub fn fetch(&self, params: Option<Map<String, Value>>) -> RestResult<Self> {
        self.precheck("fetch", Record::url)?;
        Ok(self.action(move |this, ticket| async move {
            let url = this.url().ok_or(RestError::Unbound { operation: "fetch" })?;
            let mut request = Request::new(Method::Get, url).with_params(params.unwrap_or_default());
            this.dispatch(Hook::BeforeFetch, HookArgs::Request(&mut request))?;

            match send_request(&this, &ticket, request).await {
                Ok(Some(response)) => {
                    this.unpack(response.data.clone())?;
                    this.state().resolved = true;
                    this.dispatch(Hook::AfterFetch, HookArgs::Response(&response))
                }
                Ok(None) => Err(RestError::Canceled),
                Err(err) => {
                    this.dispatch(Hook::AfterFetchError, HookArgs::Error(&err))?;
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

    /// Creates (`POST`) or updates (`PUT`) this record.
    pub fn save(&self) -> RestResult<Self> {
        self.save_with(None)
    }

    /// Partially updates this record, sending only paths related to `paths`.
    /// Unbound records are created in full.
    pub fn save_patch<I, S>(&self, paths: I) -> RestResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: Arc<[String]> = paths.into_iter().map(Into::into).collect();
        self.save_with(Some(paths))
    }

    fn save_with(&self, patch: Option<Arc<[String]>>) -> RestResult<Self> {
        self.precheck("save", |r| r.url().or_else(|| r.create_url()))?;
        Ok(self.action(move |this, ticket| async move {
            match this.url() {
                Some(url) => this.update(url, patch, &ticket).await,
                None => this.insert(&ticket).await,
            }
        }))
    }

    async fn update(
        &self,
        url: String,
        patch: Option<Arc<[String]>>,
        ticket: &ActionTicket,
    ) -> RestResult<()> {
        let (method, operation) = match patch {
            Some(paths) => (
                self.model().config().patch_method,
                Operation::patch(OpSet::UPDATE, paths),
            ),
            None => (Method::Put, Operation::new(OpSet::UPDATE)),
        };
        let data = self.pack_with(&operation)?;
        let mut request = Request::new(method, url).with_data(data);
        self.dispatch(Hook::BeforeSave, HookArgs::Request(&mut request))?;
        self.dispatch(Hook::BeforeUpdate, HookArgs::Request(&mut request))?;

        match send_request(self, ticket, request).await {
            Ok(Some(response)) => {
                if !response.data.is_null() {
                    self.unpack(response.data.clone())?;
                }
                self.dispatch(Hook::AfterUpdate, HookArgs::Response(&response))?;
                self.dispatch(Hook::AfterSave, HookArgs::Response(&response))
            }
            Ok(None) => Err(RestError::Canceled),
            Err(err) => {
                self.dispatch(Hook::AfterUpdateError, HookArgs::Error(&err))?;
                self.dispatch(Hook::AfterSaveError, HookArgs::Error(&err))?;
                Err(err)
            }
        }
    }

    async fn insert(&self, ticket: &ActionTicket) -> RestResult<()> {
        let url = self.create_url().ok_or(RestError::Unbound { operation: "create" })?;
        let data = self.pack_with(&Operation::new(OpSet::CREATE))?;
        let mut request = Request::new(Method::Post, url).with_data(data);
        self.dispatch(Hook::BeforeSave, HookArgs::Request(&mut request))?;
        self.dispatch(Hook::BeforeCreate, HookArgs::Request(&mut request))?;

        match send_request(self, ticket, request).await {
            Ok(Some(response)) => {
                if !response.data.is_null() {
                    self.unpack(response.data.clone())?;
                }
                info!(model = %self.model().name(), pk = ?self.pk(), "record created");
                let reveal = {
                    let state = self.state();
                    !state.revealed && state.reveal_at != RevealAt::Suppressed
                };
                if reveal {
                    self.reveal(true)?;
                }
                self.dispatch(Hook::AfterCreate, HookArgs::Response(&response))?;
                self.dispatch(Hook::AfterSave, HookArgs::Response(&response))
            }
            Ok(None) => Err(RestError::Canceled),
            Err(err) => {
                self.dispatch(Hook::AfterCreateError, HookArgs::Error(&err))?;
                self.dispatch(Hook::AfterSaveError, HookArgs::Error(&err))?;
                Err(err)
            }
        }
    }

    /// Deletes this record (`DELETE url`) and removes it from its collection.
    /// A record that was never bound is only removed locally.
    pub fn destroy(&self) -> RestResult<Self> {
        if !self.has_pending_actions() && self.url().is_none() {
            return Ok(self.sync_action(Record::detach));
        }
        Ok(self.action(move |this, ticket| async move {
            let Some(url) = this.url() else {
                return this.detach();
            };
            let mut request = Request::new(Method::Delete, url);
            this.dispatch(Hook::BeforeDestroy, HookArgs::Request(&mut request))?;

            match send_request(&this, &ticket, request).await {
                Ok(Some(response)) => {
                    this.detach()?;
                    info!(model = %this.model().name(), pk = ?this.pk(), "record destroyed");
                    this.dispatch(Hook::AfterDestroy, HookArgs::Response(&response))
                }
                Ok(None) => Err(RestError::Canceled),
                Err(err) => {
                    this.dispatch(Hook::AfterDestroyError, HookArgs::Error(&err))?;
                    Err(err)
                }
            }
        }))
    }

    fn detach(&self) -> RestResult<()> {
        match self.scope().collection() {
            Some(collection) => collection.remove(self).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Adds this record to its scope collection (`show`), or prevents a later
    /// automatic reveal (`!show`).
    pub fn reveal(&self, show: bool) -> RestResult<Self> {
        if !show {
            self.state().reveal_at = RevealAt::Suppressed;
            return Ok(self.clone());
        }
        let (collection, at) = {
            let state = self.state();
            let at = match state.reveal_at {
                RevealAt::Index(idx) => Some(idx),
                RevealAt::End | RevealAt::Suppressed => None,
            };
            (state.scope.collection(), at)
        };
        if let Some(collection) = collection {
            collection.add(self, at)?;
        }
        Ok(self.clone())
    }

    /// Moves a revealed record to `index`, or sets where it will appear when
    /// revealed.
    pub fn move_to(&self, index: usize) -> Self {
        let collection = {
            let mut state = self.state();
            if state.revealed {
                state.scope.collection()
            } else {
                state.reveal_at = RevealAt::Index(index);
                None
            }
        };
        if let Some(collection) = collection {
            collection.reposition(self, index);
        }
        self.clone()
    }

    /// Copies every public attribute of `values` onto this record, after
    /// pending actions.
    pub fn extend(&self, values: Map<String, Value>) -> Self {
        self.sync_action(move |this| {
            let mut state = this.state();
            for (name, value) in values {
                if !name.starts_with(PRIVATE_MARKER) {
                    state.relations.remove(&name);
                    state.attrs.insert(name, value);
                }
            }
            Ok(())
        })
    }

    /// Copies every public attribute and relation of `other` onto this record,
    /// after pending actions.
    pub fn extend_from(&self, other: &Record) -> Self {
        let (attrs, relations) = {
            let state = other.state();
            (state.attrs.clone(), state.relations.clone())
        };
        self.sync_action(move |this| {
            let mut state = this.state();
            for (name, value) in attrs {
                if !name.starts_with(PRIVATE_MARKER) {
                    state.attrs.insert(name, value);
                }
            }
            for (name, related) in relations {
                if !name.starts_with(PRIVATE_MARKER) {
                    state.relations.insert(name, related);
                }
            }
            Ok(())
        })
    }

    /// Collection this record belongs to, if collection-scoped.
    pub fn collection(&self) -> Option<Collection> {
        self.scope().collection()
    }
}

impl CommonApi for Record {
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
        Target::Record(self.with_layers(None))
    }

    fn bubble(&self, call: &mut HookCall<'_>) -> RestResult<()> {
        match self.scope().collection() {
            Some(collection) => collection.dispatch_call(call),
            None => {
                debug!(hook = %call.hook, model = %self.model().name(), "type hook");
                self.model().hooks().run(call)
            }
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pk = self
            .inner
            .state
            .try_lock()
            .ok()
            .and_then(|state| state.pk.clone());
        f.debug_struct("Record")
            .field("model", &self.model().name())
            .field("pk", &pk)
            .finish()
    }
}
