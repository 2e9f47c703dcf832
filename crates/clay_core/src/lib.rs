//! # Clay Core
//!
//! Declarative models persisted to a key-value server.
//!
//! This crate provides:
//! - A [`Registry`] of model schemas declared with a [`SchemaBuilder`]
//! - Field codecs ([`FieldKind`]) that validate and convert raw input
//! - [`Entity`] records with two-way relationships kept in step in memory
//! - A [`StorageEngine`] that allocates ids, maintains indexes, enforces
//!   uniqueness and serializes persists with an advisory lock
//! - Pattern lookups ([`Pattern`]) over indexed and plain fields
//!
//! ## Design Principles
//!
//! - The registry is an explicit object; nothing is global
//! - Backends are dumb; every key and record layout lives here
//! - Engines are synchronous and `Send + Sync`; share them with `Arc`
//! - Back-references are weak, so entity graphs never keep themselves alive
//!
//! ## Example
//!
//! ```rust
//! use clay_core::{FieldKind, Registry, StorageEngine};
//! use clay_storage::InMemoryBackend;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! registry.set_primary_storage(Arc::new(StorageEngine::new(InMemoryBackend::new())));
//!
//! let user = registry.declare("User", |m| {
//!     m.field("name", FieldKind::String)?
//!         .field("email", FieldKind::Email)?
//!         .unique("email")?;
//!     Ok(())
//! })?;
//!
//! let zach = user.create(json!({"name": "Zach", "email": "zach@yipit.com"}))?;
//! assert_eq!(zach.id(), Some(1));
//! assert_eq!(user.get_by("email", "zach@yipit.com")?.get("name")?, "Zach");
//! # Ok::<(), clay_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod field;
mod model;
mod query;
mod schema;
mod store;

pub use config::StorageConfig;
pub use entity::{Entity, ID_KEY};
pub use error::{CoreError, CoreResult};
pub use field::{FieldKind, Value, HASH_SEPARATOR};
pub use model::Model;
pub use query::{Pattern, Strategy};
pub use schema::{
    Cardinality, ClassMethodFn, FieldDef, MethodFn, ModelSchema, Registry, Relationship,
    SchemaBuilder,
};
pub use store::{KeySpace, StorageEngine};
