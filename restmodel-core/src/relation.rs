//! Relations between models.
//!
//! A relation is installed into the owner's [`Ruleset`] as a decoder (and,
//! for the `belongs_to` family, an encoder) on the relation attribute:
//!
//! - `has_many`: a nested collection at `owner_url/segment`, decoded from an
//!   inline array.
//! - `has_one`: a singleton record at `owner_url/segment`, decoded from an
//!   inline object.
//! - `belongs_to`: a reference decoded from a key attribute (`ownerId`) or an
//!   inline object, and encoded back as the key.
//! - `belongs_to_many`: a collection decoded from a key array (`partIds`) or
//!   inline objects, and encoded back as the key array.
//!
//! `has_many` and `has_one` are never sent on create or update.

use crate::collection::Collection;
use crate::common::CommonApi;
use crate::error::{RestError, RestResult};
use crate::hook::{Hook, HookCall, HookTable};
use crate::model::{Model, ModelRef};
use crate::record::Record;
use crate::scope::{CollectionScope, Scope, ScopeApi, build_raw_in};
use crate::serializer::{Attr, AttrRef, DecodeCx, EncodeCx, Mask, Operation, Related, Ruleset};
use restmodel_types::{Naming, OpSet, path};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasMany,
    HasOne,
    BelongsTo,
    BelongsToMany,
}

/// Options of a relation.
#[derive(Clone)]
pub struct Relation {
    target: ModelRef,
    url: Option<String>,
    source: Option<String>,
    inverse: Option<String>,
    key: Option<String>,
    params: Map<String, Value>,
    hooks: HookTable,
}

impl Relation {
    /// A relation to `target`, given as a model or a registered model name.
    pub fn to(target: impl Into<ModelRef>) -> Self {
        Self {
            target: target.into(),
            url: None,
            source: None,
            inverse: None,
            key: None,
            params: Map::new(),
            hooks: HookTable::new(),
        }
    }

    /// URL segment appended to the owner URL. Defaults to the relation name.
    #[must_use]
    pub fn url(mut self, segment: &str) -> Self {
        self.url = Some(segment.to_string());
        self
    }

    /// Raw key holding inline data, when it differs from the relation name.
    #[must_use]
    pub fn source(mut self, raw: &str) -> Self {
        self.source = Some(raw.to_string());
        self
    }

    /// Attribute on the related records pointing back at the owner.
    #[must_use]
    pub fn inverse(mut self, name: &str) -> Self {
        self.inverse = Some(name.to_string());
        self
    }

    /// Raw key holding the related key(s) for `belongs_to` and
    /// `belongs_to_many`.
    #[must_use]
    pub fn key(mut self, raw: &str) -> Self {
        self.key = Some(raw.to_string());
        self
    }

    /// Query param inherited by related collections.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Hook registered on every related collection or record.
    #[must_use]
    pub fn on<F>(mut self, hook: Hook, f: F) -> Self
    where
        F: Fn(&mut HookCall<'_>) -> RestResult<()> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on(hook, f);
        self
    }

    pub fn target(&self) -> &ModelRef {
        &self.target
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("target", &self.target)
            .field("url", &self.url)
            .field("source", &self.source)
            .field("inverse", &self.inverse)
            .field("key", &self.key)
            .finish()
    }
}

/// A named relation of a model.
#[derive(Debug, Clone)]
pub struct RelationDef {
    name: String,
    kind: RelationKind,
    relation: Relation,
}

impl RelationDef {
    pub fn new(name: &str, kind: RelationKind, relation: Relation) -> Self {
        Self {
            name: name.to_string(),
            kind,
            relation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    fn segment(&self) -> String {
        self.relation.url.clone().unwrap_or_else(|| self.name.clone())
    }
}

// ── Installation ─────────────────────────────────────────────────

pub(crate) fn install(def: &RelationDef, rules: &mut Ruleset) -> RestResult<()> {
    if def.name.contains(path::SEPARATOR) {
        return Err(RestError::Definition(format!(
            "relation {:?} must be a top-level attribute",
            def.name
        )));
    }
    let naming = rules.naming().clone();
    match def.kind {
        RelationKind::HasMany | RelationKind::HasOne => {
            if let Some(source) = &def.relation.source {
                rules.set_mapping(&def.name, source, false)?;
            }
            rules.set_mask(&def.name, Mask::Ops(OpSet::WRITE))?;
            let owned = def.clone();
            rules.set_decoder(
                &def.name,
                Arc::new(move |cx: &DecodeCx<'_>, raw: Option<&Value>| decode_owned(&owned, cx, raw)),
                false,
            )?;
        }
        RelationKind::BelongsTo => {
            let key = def
                .relation
                .key
                .clone()
                .unwrap_or_else(|| naming.encode(&format!("{}Id", def.name)));
            let inline = inline_key(def, &*naming);
            rules.set_mapping(&def.name, &key, true)?;
            rules.claim("", &inline);
            let owned = def.clone();
            rules.set_decoder(
                &def.name,
                Arc::new(move |cx: &DecodeCx<'_>, raw: Option<&Value>| {
                    decode_reference(&owned, &inline, cx, raw)
                }),
                false,
            )?;
            rules.set_encoder(&def.name, Arc::new(encode_reference), false)?;
        }
        RelationKind::BelongsToMany => {
            let key = def
                .relation
                .key
                .clone()
                .unwrap_or_else(|| naming.encode(&format!("{}Ids", singular(&def.name))));
            let inline = inline_key(def, &*naming);
            rules.set_mapping(&def.name, &key, true)?;
            rules.claim("", &inline);
            let owned = def.clone();
            rules.set_decoder(
                &def.name,
                Arc::new(move |cx: &DecodeCx<'_>, raw: Option<&Value>| {
                    decode_references(&owned, &inline, cx, raw)
                }),
                false,
            )?;
            rules.set_encoder(&def.name, Arc::new(encode_references), false)?;
        }
    }
    Ok(())
}

/// Creates the empty relation for a record that has not received one yet.
/// `belongs_to` has no empty state.
pub(crate) fn init(def: &RelationDef, owner: &Record) -> RestResult<Option<Related>> {
    let target = owner.model().resolve(&def.relation.target)?;
    let related = match def.kind {
        RelationKind::HasMany => Related::Collection(nested_collection(def, owner, &target)),
        RelationKind::HasOne => Related::Record(singleton(def, owner, &target, None)?),
        RelationKind::BelongsTo => return Ok(None),
        RelationKind::BelongsToMany => Related::Collection(references(def, &target)),
    };
    Ok(Some(related))
}

fn inline_key(def: &RelationDef, naming: &dyn Naming) -> String {
    def.relation
        .source
        .clone()
        .unwrap_or_else(|| naming.encode(&def.name))
}

fn singular(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{stem}y")
    } else if let Some(stem) = name.strip_suffix('s') {
        stem.to_string()
    } else {
        name.to_string()
    }
}

// ── has_many / has_one ───────────────────────────────────────────

fn nested_collection(def: &RelationDef, owner: &Record, target: &Model) -> Collection {
    let collection = target.collection_in(
        def.relation.params.clone(),
        CollectionScope::Nested {
            parent: owner.downgrade(),
            segment: def.segment(),
        },
    );
    collection.common().extend_callbacks(&def.relation.hooks);
    if let Some(inverse) = def.relation.inverse.clone() {
        let parent = owner.downgrade();
        collection.on(Hook::AfterAdd, move |call| {
            if let Some(record) = call.record() {
                record.set_relation(&inverse, Related::Inverse(parent.clone()));
            }
            Ok(())
        });
    }
    collection
}

fn singleton(
    def: &RelationDef,
    owner: &Record,
    target: &Model,
    pk: Option<Value>,
) -> RestResult<Record> {
    let record = target.new_record_in(
        pk,
        Scope::Singleton {
            parent: owner.downgrade(),
            segment: def.segment(),
        },
    )?;
    record.common().extend_callbacks(&def.relation.hooks);
    if let Some(inverse) = &def.relation.inverse {
        record.set_relation(inverse, Related::Inverse(owner.downgrade()));
    }
    Ok(record)
}

fn decode_owned(def: &RelationDef, cx: &DecodeCx<'_>, raw: Option<&Value>) -> RestResult<Option<Attr>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(init(def, cx.record)?.map(Attr::Related));
    }
    let target = cx.record.model().resolve(&def.relation.target)?;
    let operation = Operation::read();
    let related = match def.kind {
        RelationKind::HasOne => {
            let record = singleton(def, cx.record, &target, target.infer_key(raw))?;
            record.decode_with(raw, &operation, cx.cache)?;
            Related::Record(record)
        }
        _ => {
            let collection = nested_collection(def, cx.record, &target);
            collection.feed(raw, &operation, cx.cache)?;
            Related::Collection(collection)
        }
    };
    Ok(Some(Attr::Related(related)))
}

// ── belongs_to / belongs_to_many ─────────────────────────────────

fn references(def: &RelationDef, target: &Model) -> Collection {
    let collection = target.collection(def.relation.params.clone());
    collection.common().extend_callbacks(&def.relation.hooks);
    collection
}

/// Looks up `pk` in the side-loaded data, falling back to an unresolved
/// record with only its key set.
fn reference(target: &Model, pk: &Value, cx: &DecodeCx<'_>) -> RestResult<Record> {
    match cx.cache.and_then(|cache| cache.find(target, pk)) {
        Some(raw) => build_raw_in(target, raw, &Operation::read(), cx.cache),
        None => target.new_record(Some(pk.clone())),
    }
}

fn decode_reference(
    def: &RelationDef,
    inline: &str,
    cx: &DecodeCx<'_>,
    raw: Option<&Value>,
) -> RestResult<Option<Attr>> {
    let target = cx.record.model().resolve(&def.relation.target)?;
    if let Some(object @ Value::Object(_)) = cx.raw.get(inline) {
        let record = build_raw_in(&target, object, &Operation::read(), cx.cache)?;
        return Ok(Some(Attr::Related(Related::Record(record))));
    }
    match raw {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(Attr::Value(Value::Null))),
        Some(pk) => {
            let record = reference(&target, pk, cx)?;
            Ok(Some(Attr::Related(Related::Record(record))))
        }
    }
}

fn decode_references(
    def: &RelationDef,
    inline: &str,
    cx: &DecodeCx<'_>,
    raw: Option<&Value>,
) -> RestResult<Option<Attr>> {
    let target = cx.record.model().resolve(&def.relation.target)?;
    let items = match (cx.raw.get(inline), raw) {
        (Some(Value::Array(items)), _) => items,
        (_, Some(Value::Array(items))) => items,
        (_, None) => return Ok(None),
        (_, Some(Value::Null)) => {
            let empty = references(def, &target);
            return Ok(Some(Attr::Related(Related::Collection(empty))));
        }
        (_, Some(other)) => {
            return Err(RestError::Malformed(format!(
                "{} keys must be an array, got {other}",
                def.name
            )));
        }
    };

    let collection = references(def, &target);
    for item in items {
        let record = match item {
            Value::Object(_) => build_raw_in(&target, item, &Operation::read(), cx.cache)?,
            pk => reference(&target, pk, cx)?,
        };
        collection.add(&record, None)?;
    }
    Ok(Some(Attr::Related(Related::Collection(collection))))
}

fn encode_reference(_cx: &EncodeCx<'_>, value: Option<AttrRef<'_>>) -> RestResult<Option<Value>> {
    Ok(match value {
        Some(AttrRef::Related(related)) => Some(
            related
                .as_record()
                .and_then(|record| record.pk())
                .unwrap_or(Value::Null),
        ),
        Some(AttrRef::Value(value)) => Some(value.clone()),
        None => None,
    })
}

fn encode_references(_cx: &EncodeCx<'_>, value: Option<AttrRef<'_>>) -> RestResult<Option<Value>> {
    Ok(match value {
        Some(AttrRef::Related(related)) => related.as_collection().map(|collection| {
            Value::Array(collection.records().iter().filter_map(Record::pk).collect())
        }),
        Some(AttrRef::Value(value)) => Some(value.clone()),
        None => None,
    })
}
