//! Lifecycle hooks.
//!
//! Hooks are named events fired by records and collections. A dispatch
//! visits, in order:
//!
//! 1. the dispatch layers of the handle it was fired through ([`decorate`]),
//! 2. the callbacks registered on the instance with `on`,
//! 3. the owning collection (records only), then the model's type hooks.
//!
//! A callback returning an error stops the dispatch and the error propagates
//! to whoever fired the hook.
//!
//! [`decorate`]: crate::CommonApi::decorate

use crate::collection::Collection;
use crate::error::{RestError, RestResult};
use crate::record::Record;
use restmodel_types::{Request, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A lifecycle event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Hook {
    AfterInit,
    AfterFeed,
    BeforeRender,
    AfterFeedMany,
    BeforeRequest,
    AfterRequest,
    AfterRequestError,
    BeforeFetch,
    AfterFetch,
    AfterFetchError,
    BeforeFetchMany,
    AfterFetchMany,
    AfterFetchManyError,
    BeforeSave,
    AfterSave,
    AfterSaveError,
    BeforeCreate,
    AfterCreate,
    AfterCreateError,
    BeforeUpdate,
    AfterUpdate,
    AfterUpdateError,
    BeforeDestroy,
    AfterDestroy,
    AfterDestroyError,
    AfterAdd,
    AfterRemove,
    /// Application-defined event, fired with [`CommonApi::dispatch`](crate::CommonApi::dispatch).
    Custom(String),
}

impl Hook {
    /// Kebab-case event name.
    pub fn name(&self) -> &str {
        match self {
            Hook::AfterInit => "after-init",
            Hook::AfterFeed => "after-feed",
            Hook::BeforeRender => "before-render",
            Hook::AfterFeedMany => "after-feed-many",
            Hook::BeforeRequest => "before-request",
            Hook::AfterRequest => "after-request",
            Hook::AfterRequestError => "after-request-error",
            Hook::BeforeFetch => "before-fetch",
            Hook::AfterFetch => "after-fetch",
            Hook::AfterFetchError => "after-fetch-error",
            Hook::BeforeFetchMany => "before-fetch-many",
            Hook::AfterFetchMany => "after-fetch-many",
            Hook::AfterFetchManyError => "after-fetch-many-error",
            Hook::BeforeSave => "before-save",
            Hook::AfterSave => "after-save",
            Hook::AfterSaveError => "after-save-error",
            Hook::BeforeCreate => "before-create",
            Hook::AfterCreate => "after-create",
            Hook::AfterCreateError => "after-create-error",
            Hook::BeforeUpdate => "before-update",
            Hook::AfterUpdate => "after-update",
            Hook::AfterUpdateError => "after-update-error",
            Hook::BeforeDestroy => "before-destroy",
            Hook::AfterDestroy => "after-destroy",
            Hook::AfterDestroyError => "after-destroy-error",
            Hook::AfterAdd => "after-add",
            Hook::AfterRemove => "after-remove",
            Hook::Custom(name) => name,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The instance a hook was fired on.
#[derive(Debug, Clone)]
pub enum Target {
    Record(Record),
    Collection(Collection),
}

impl Target {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Target::Record(record) => Some(record),
            Target::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Target::Collection(collection) => Some(collection),
            Target::Record(_) => None,
        }
    }
}

/// Hook payload.
#[derive(Debug)]
pub enum HookArgs<'a> {
    None,
    /// The outgoing request; callbacks may modify it.
    Request(&'a mut Request),
    Response(&'a Response),
    Error(&'a RestError),
    /// Raw data that was just decoded.
    Raw(&'a Value),
    /// Raw data about to be sent; callbacks may modify it.
    RawMut(&'a mut Value),
    Record(&'a Record),
    Records(&'a [Record]),
}

/// A single hook invocation as seen by a callback.
#[derive(Debug)]
pub struct HookCall<'a> {
    pub hook: &'a Hook,
    pub target: &'a Target,
    pub args: HookArgs<'a>,
}

impl HookCall<'_> {
    /// The outgoing request, for `before-request`-style hooks.
    pub fn request(&mut self) -> Option<&mut Request> {
        match &mut self.args {
            HookArgs::Request(request) => Some(&mut **request),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match &self.args {
            HookArgs::Response(response) => Some(*response),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RestError> {
        match &self.args {
            HookArgs::Error(err) => Some(*err),
            _ => None,
        }
    }

    /// Raw payload for `after-feed` and `before-render`.
    pub fn raw(&self) -> Option<&Value> {
        match &self.args {
            HookArgs::Raw(raw) => Some(*raw),
            HookArgs::RawMut(raw) => Some(&**raw),
            _ => None,
        }
    }

    pub fn raw_mut(&mut self) -> Option<&mut Value> {
        match &mut self.args {
            HookArgs::RawMut(raw) => Some(&mut **raw),
            _ => None,
        }
    }

    /// The record argument of `after-add`/`after-remove`.
    pub fn record(&self) -> Option<&Record> {
        match &self.args {
            HookArgs::Record(record) => Some(*record),
            _ => None,
        }
    }
}

/// A hook callback.
pub type HookFn = Arc<dyn Fn(&mut HookCall<'_>) -> RestResult<()> + Send + Sync>;

/// Callbacks keyed by hook, run in registration order.
#[derive(Clone, Default)]
pub struct HookTable {
    handlers: HashMap<Hook, Vec<HookFn>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    #[must_use]
    pub fn on<F>(mut self, hook: Hook, f: F) -> Self
    where
        F: Fn(&mut HookCall<'_>) -> RestResult<()> + Send + Sync + 'static,
    {
        self.add(hook, Arc::new(f));
        self
    }

    pub fn add(&mut self, hook: Hook, f: HookFn) {
        self.handlers.entry(hook).or_default().push(f);
    }

    /// Appends every callback of `other`.
    pub fn merge(&mut self, other: &HookTable) {
        for (hook, fns) in &other.handlers {
            self.handlers
                .entry(hook.clone())
                .or_default()
                .extend(fns.iter().cloned());
        }
    }

    /// Snapshot of the callbacks for `hook`.
    pub fn handlers(&self, hook: &Hook) -> Vec<HookFn> {
        self.handlers.get(hook).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(Vec::is_empty)
    }

    /// Runs the callbacks for `call.hook`, stopping at the first error.
    pub fn run(&self, call: &mut HookCall<'_>) -> RestResult<()> {
        if let Some(fns) = self.handlers.get(call.hook) {
            for f in fns {
                f(call)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(Hook::name).collect();
        names.sort_unstable();
        f.debug_struct("HookTable").field("hooks", &names).finish()
    }
}

/// A handler pushed onto a handle by decoration.
#[derive(Clone)]
pub enum LayerHandler {
    /// Callbacks for specific hooks.
    Table(HookTable),
    /// Called for every hook.
    Func(HookFn),
}

/// One level of decoration. Layers form a parent chain; a dispatch runs the
/// outermost (oldest) layer first.
pub struct DispatchLayer {
    parent: Option<Arc<DispatchLayer>>,
    handler: LayerHandler,
}

impl DispatchLayer {
    pub(crate) fn push(parent: Option<Arc<DispatchLayer>>, handler: LayerHandler) -> Arc<Self> {
        Arc::new(Self { parent, handler })
    }

    pub(crate) fn dispatch(&self, call: &mut HookCall<'_>) -> RestResult<()> {
        if let Some(parent) = &self.parent {
            parent.dispatch(call)?;
        }
        match &self.handler {
            LayerHandler::Table(table) => table.run(call),
            LayerHandler::Func(f) => f(call),
        }
    }

    /// Number of layers in this chain.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }
}

impl fmt::Debug for DispatchLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchLayer")
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_names_are_kebab_case() {
        assert_eq!(Hook::AfterFetchManyError.name(), "after-fetch-many-error");
        assert_eq!(Hook::Custom("ping".into()).to_string(), "ping");
    }

    #[test]
    fn merge_appends_handlers() {
        let first = HookTable::new().on(Hook::AfterInit, |_| Ok(()));
        let second = HookTable::new()
            .on(Hook::AfterInit, |_| Ok(()))
            .on(Hook::AfterFeed, |_| Ok(()));
        let mut merged = first.clone();
        merged.merge(&second);
        assert_eq!(merged.handlers(&Hook::AfterInit).len(), 2);
        assert_eq!(merged.handlers(&Hook::AfterFeed).len(), 1);
        assert_eq!(first.handlers(&Hook::AfterInit).len(), 1);
        assert!(merged.handlers(&Hook::BeforeRender).is_empty());
        assert!(HookTable::new().is_empty());
    }
}
