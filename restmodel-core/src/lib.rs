//! Model layer for restmodel.
//!
//! Maps REST resources onto client-side objects:
//! - [`Api`] holds the configuration, the [`Transport`] and the model registry
//! - [`Model`] is a record type, defined through [`Define`] rules (masks,
//!   mappings, decoders/encoders, relations, hooks, packers)
//! - [`Record`] and [`Collection`] are handles to live instances; every
//!   network operation is queued on the instance and observed through
//!   [`CommonApi`] (`then`, `always`, `as_promise`, ...)
//! - [`Hook`]s fire at each lifecycle step and bubble from record to
//!   collection to model
//!
//! HTTP itself is left to a [`Transport`] implementation; see
//! [`transport::mock`] for an in-memory one.

mod action;
mod api;
mod collection;
mod common;
mod config;
mod define;
mod error;
mod hook;
mod model;
mod packer;
mod record;
mod relation;
mod scope;
mod serializer;
pub mod transport;

pub use action::{ActionQueue, ActionTicket, Settled};
pub use api::Api;
pub use collection::{Collection, WeakCollection};
pub use common::{Common, CommonApi, Status};
pub use config::ApiConfig;
pub use define::{DefaultValue, Define, KeyWrapper, Mixin, PackerWrapper, Rule};
pub use error::{RestError, RestResult};
pub use hook::{DispatchLayer, Hook, HookArgs, HookCall, HookFn, HookTable, Target};
pub use model::{KeyFn, Model, ModelBuilder, ModelRef};
pub use packer::{DefaultPacker, IdentityPacker, PackKind, Packer, PackerCache};
pub use record::{Record, WeakRecord};
pub use relation::{Relation, RelationDef, RelationKind};
pub use scope::{CollectionScope, Scope, ScopeApi};
pub use serializer::{
    Attr, AttrRef, DecodeCx, DecodeFn, EncodeCx, EncodeFn, Mask, MaskFn, Operation, Related,
    Ruleset, PRIVATE_MARKER,
};
pub use transport::{Transport, TransportError};

pub use restmodel_types::{Method, Naming, NamingStyle, OpSet, Request, Response, path};
