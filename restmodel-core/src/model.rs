//! Model types and the builder that produces them.

use crate::api::{Api, Registry};
use crate::define::{DefaultValue, Define, Rule};
use crate::error::{RestError, RestResult};
use crate::hook::HookTable;
use crate::packer::{IdentityPacker, Packer};
use crate::record::Record;
use crate::relation::{self, RelationDef};
use crate::scope::{CollectionScope, Scope, ScopeApi};
use crate::serializer::Ruleset;
use crate::transport::Transport;
use crate::config::ApiConfig;
use restmodel_types::Naming;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Extracts the primary key from a raw record.
pub type KeyFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

pub(crate) struct ModelInner {
    name: String,
    plural: String,
    url: Option<String>,
    config: ApiConfig,
    transport: Arc<dyn Transport>,
    rules: Ruleset,
    hooks: HookTable,
    packer: Arc<dyn Packer>,
    key: KeyFn,
    defaults: Vec<(String, DefaultValue)>,
    relations: BTreeMap<String, RelationDef>,
    registry: Weak<Registry>,
}

/// A record type: its URL, serialization rules, hooks and relations.
///
/// `Model` is a cheap handle; clones share the same definition. A model is
/// also the root [`ScopeApi`]: records and collections created from it are
/// bound to its URL.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn plural(&self) -> &str {
        &self.inner.plural
    }

    /// The collection URL, resolved against the API prefix. `None` for
    /// models only reachable through relations or fixed URLs.
    pub fn url(&self) -> Option<String> {
        self.inner
            .url
            .as_deref()
            .map(|url| self.inner.config.resolve_url(url))
    }

    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn rules(&self) -> &Ruleset {
        &self.inner.rules
    }

    pub fn naming(&self) -> &Arc<dyn Naming> {
        self.inner.rules.naming()
    }

    /// Type-level hooks.
    pub fn hooks(&self) -> &HookTable {
        &self.inner.hooks
    }

    pub fn packer(&self) -> &Arc<dyn Packer> {
        &self.inner.packer
    }

    /// Extracts the primary key of a raw record.
    pub fn infer_key(&self, raw: &Value) -> Option<Value> {
        (self.inner.key)(raw)
    }

    pub(crate) fn defaults(&self) -> &[(String, DefaultValue)] {
        &self.inner.defaults
    }

    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.inner.relations.get(name)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.inner.relations.keys().map(String::as_str)
    }

    /// The API this model was defined through, while it is alive.
    pub fn api(&self) -> Option<Api> {
        self.inner.registry.upgrade().map(Api::from_registry)
    }

    /// Resolves a relation target.
    pub fn resolve(&self, target: &ModelRef) -> RestResult<Model> {
        match target {
            ModelRef::Model(model) => Ok(model.clone()),
            ModelRef::Named(name) => self
                .api()
                .ok_or_else(|| RestError::UnknownModel(name.clone()))?
                .model(name),
        }
    }

    /// Returns true if both handles point to the same definition.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Builds a record bound to a fixed URL (a singleton resource).
    pub fn single(&self, url: &str) -> RestResult<Record> {
        self.new_record_in(None, Scope::Fixed(self.inner.config.resolve_url(url)))
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("url", &self.inner.url)
            .finish()
    }
}

impl ScopeApi for Model {
    fn scope_model(&self) -> &Model {
        self
    }

    fn record_scope(&self) -> Scope {
        Scope::Model
    }

    fn collection_scope(&self) -> CollectionScope {
        CollectionScope::Model
    }
}

/// A relation target: a model handle, or a name looked up in the API
/// registry when first needed.
#[derive(Debug, Clone)]
pub enum ModelRef {
    Model(Model),
    Named(String),
}

impl From<Model> for ModelRef {
    fn from(model: Model) -> Self {
        ModelRef::Model(model)
    }
}

impl From<&Model> for ModelRef {
    fn from(model: &Model) -> Self {
        ModelRef::Model(model.clone())
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        ModelRef::Named(name.to_string())
    }
}

impl From<String> for ModelRef {
    fn from(name: String) -> Self {
        ModelRef::Named(name)
    }
}

/// Collects the definition of one model. Obtained from [`Api::define`].
#[derive(Debug)]
pub struct ModelBuilder {
    api: Api,
    name: String,
    url: Option<String>,
    plural: Option<String>,
    rules: Vec<Rule>,
}

impl ModelBuilder {
    pub(crate) fn new(api: Api, name: &str) -> Self {
        Self {
            api,
            name: name.to_string(),
            url: None,
            plural: None,
            rules: Vec::new(),
        }
    }

    /// Collection URL, relative to the API prefix or absolute.
    #[must_use]
    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Plural name (defaults to a naive pluralization of the model name).
    #[must_use]
    pub fn plural(mut self, plural: &str) -> Self {
        self.plural = Some(plural.to_string());
        self
    }

    /// Validates the rules and registers the model, replacing any model of
    /// the same name.
    pub fn build(self) -> RestResult<Model> {
        let config = self.api.config().clone();

        let mut naming: Arc<dyn Naming> = config.naming.strategy();
        let mut key = field_key(config.primary_key.clone());
        let mut packer: Arc<dyn Packer> = Arc::new(IdentityPacker);
        for rule in &self.rules {
            match rule {
                Rule::Naming(strategy) => naming = strategy.clone(),
                Rule::PrimaryKey(field) => key = field_key(field.clone()),
                Rule::InferKey(wrap) => key = wrap(key),
                Rule::Packer(wrap) => packer = wrap(packer),
                _ => {}
            }
        }

        let mut rules = Ruleset::new(naming);
        let mut hooks = HookTable::new();
        let mut defaults: Vec<(String, DefaultValue)> = Vec::new();
        let mut relations = BTreeMap::new();
        for rule in self.rules {
            match rule {
                Rule::Mask(path, mask) => rules.set_mask(&path, mask)?,
                Rule::Map { local, raw, forced } => rules.set_mapping(&local, &raw, forced)?,
                Rule::Decoder { path, f, chain } => rules.set_decoder(&path, f, chain)?,
                Rule::Encoder { path, f, chain } => rules.set_encoder(&path, f, chain)?,
                Rule::Volatile(path) => rules.set_volatile(&path)?,
                Rule::Default(name, value) => {
                    defaults.retain(|(n, _)| *n != name);
                    defaults.push((name, value));
                }
                Rule::Hook(hook, f) => hooks.add(hook, f),
                Rule::Relation(def) => {
                    relation::install(&def, &mut rules)?;
                    relations.insert(def.name().to_string(), def);
                }
                Rule::Naming(_) | Rule::PrimaryKey(_) | Rule::InferKey(_) | Rule::Packer(_) => {}
            }
        }

        let plural = self
            .plural
            .unwrap_or_else(|| default_plural(&self.name));
        let model = Model {
            inner: Arc::new(ModelInner {
                name: self.name,
                plural,
                url: self.url,
                config,
                transport: self.api.transport().clone(),
                rules,
                hooks,
                packer,
                key,
                defaults,
                relations,
                registry: self.api.downgrade(),
            }),
        };
        self.api.register(model.clone());
        debug!(model = %model.name(), url = ?model.url(), "model defined");
        Ok(model)
    }
}

impl Define for ModelBuilder {
    fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

fn field_key(field: String) -> KeyFn {
    Arc::new(move |raw: &Value| raw.get(&field).filter(|v| !v.is_null()).cloned())
}

/// `Bike` → `bikes`, `Category` → `categories`, `Bus` → `buses`.
fn default_plural(name: &str) -> String {
    let mut chars = name.chars();
    let lowered: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => return String::new(),
    };
    if let Some(stem) = lowered.strip_suffix('y')
        && !stem.ends_with(['a', 'e', 'i', 'o', 'u'])
    {
        return format!("{stem}ies");
    }
    if lowered.ends_with('s') || lowered.ends_with('x') {
        return format!("{lowered}es");
    }
    format!("{lowered}s")
}
