//! Model schemas and the registry that holds them.
//!
//! A [`ModelSchema`] is the resolved shape of one model: its ordered fields,
//! indexes, unique and required fields, relationships, methods and, when
//! bound, its storage engine. Schemas are built with a [`SchemaBuilder`]
//! and live in a [`Registry`].
//!
//! # Invariants
//!
//! - Every field, index, method and relationship name matches `[A-Za-z0-9_]+`
//! - `unique_fields ⊆ indexes`
//! - Every relationship has exactly one paired inverse on its target
//! - A child schema owns a copy of its parent's tables

mod builder;
mod registry;

pub use builder::SchemaBuilder;
pub use registry::Registry;

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::field::FieldKind;
use crate::model::Model;
use crate::store::StorageEngine;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An instance method: receives the entity and call arguments.
pub type MethodFn = Arc<dyn Fn(&Entity, &[JsonValue]) -> CoreResult<JsonValue> + Send + Sync>;

/// A class method: receives the model handle and call arguments.
pub type ClassMethodFn = Arc<dyn Fn(&Model, &[JsonValue]) -> CoreResult<JsonValue> + Send + Sync>;

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Codec used for assignments.
    pub kind: FieldKind,
}

/// Which side of a relationship a declaration describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// This model points at one target entity.
    One,
    /// This model holds a list of target entities.
    Many,
}

/// A relationship declared on a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Property name on this model.
    pub property: String,
    /// Name of the related model.
    pub target: String,
    /// Property name of the paired relationship on the target.
    pub inverse: String,
    /// Whether this side is to-one or to-many.
    pub cardinality: Cardinality,
}

impl Relationship {
    /// The paired declaration as seen from the target model.
    #[must_use]
    pub fn inverse_on(&self, owner: &str) -> Self {
        Self {
            property: self.inverse.clone(),
            target: owner.to_string(),
            inverse: self.property.clone(),
            cardinality: match self.cardinality {
                Cardinality::One => Cardinality::Many,
                Cardinality::Many => Cardinality::One,
            },
        }
    }
}

/// The resolved shape of one model.
#[derive(Clone)]
pub struct ModelSchema {
    pub(crate) name: String,
    /// Parent chain, nearest first.
    pub(crate) ancestors: Vec<String>,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) indexes: Vec<String>,
    pub(crate) unique_fields: Vec<String>,
    pub(crate) required_fields: Vec<String>,
    pub(crate) has_one: Vec<Relationship>,
    pub(crate) has_many: Vec<Relationship>,
    pub(crate) methods: BTreeMap<String, MethodFn>,
    pub(crate) class_methods: BTreeMap<String, ClassMethodFn>,
    pub(crate) storage: Option<Arc<StorageEngine>>,
}

impl ModelSchema {
    pub(crate) fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ancestors: Vec::new(),
            fields: Vec::new(),
            indexes: Vec::new(),
            unique_fields: Vec::new(),
            required_fields: Vec::new(),
            has_one: Vec::new(),
            has_many: Vec::new(),
            methods: BTreeMap::new(),
            class_methods: BTreeMap::new(),
            storage: None,
        }
    }

    /// Copies every table of `parent` under a new name.
    pub(crate) fn inherit(name: &str, parent: &Self) -> Self {
        let mut ancestors = Vec::with_capacity(parent.ancestors.len() + 1);
        ancestors.push(parent.name.clone());
        ancestors.extend(parent.ancestors.iter().cloned());
        Self {
            name: name.to_string(),
            ancestors,
            ..parent.clone()
        }
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the models this one was derived from, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Returns `true` if this model is `model` or derives from it.
    #[must_use]
    pub fn is_a(&self, model: &str) -> bool {
        self.name == model || self.ancestors.iter().any(|a| a == model)
    }

    /// Declared fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks a field up by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Indexed field names, in declaration order.
    #[must_use]
    pub fn indexes(&self) -> &[String] {
        &self.indexes
    }

    /// Unique field names.
    #[must_use]
    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    /// Required field names.
    #[must_use]
    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// To-one relationships.
    #[must_use]
    pub fn has_one(&self) -> &[Relationship] {
        &self.has_one
    }

    /// To-many relationships.
    #[must_use]
    pub fn has_many(&self) -> &[Relationship] {
        &self.has_many
    }

    /// Returns `true` if `field` is indexed.
    #[must_use]
    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexes.iter().any(|i| i == field)
    }

    /// Returns `true` if `field` is unique.
    #[must_use]
    pub fn is_unique(&self, field: &str) -> bool {
        self.unique_fields.iter().any(|u| u == field)
    }

    /// Looks up a to-one relationship by property.
    #[must_use]
    pub fn to_one(&self, property: &str) -> Option<&Relationship> {
        self.has_one.iter().find(|r| r.property == property)
    }

    /// Looks up a to-many relationship by property.
    #[must_use]
    pub fn to_many(&self, property: &str) -> Option<&Relationship> {
        self.has_many.iter().find(|r| r.property == property)
    }

    /// Looks up a relationship of either cardinality.
    #[must_use]
    pub fn relationship(&self, property: &str) -> Option<&Relationship> {
        self.to_one(property).or_else(|| self.to_many(property))
    }

    /// Looks up an instance method.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodFn> {
        self.methods.get(name)
    }

    /// Looks up a class method.
    #[must_use]
    pub fn class_method(&self, name: &str) -> Option<&ClassMethodFn> {
        self.class_methods.get(name)
    }

    /// The storage engine bound with [`SchemaBuilder::stored_with`], if any.
    #[must_use]
    pub fn storage(&self) -> Option<&Arc<StorageEngine>> {
        self.storage.as_ref()
    }

    /// Registers a relationship unless the property is already declared.
    ///
    /// Returns `true` if it was added.
    pub(crate) fn add_relationship(&mut self, relationship: Relationship) -> bool {
        if self.relationship(&relationship.property).is_some() {
            return false;
        }
        match relationship.cardinality {
            Cardinality::One => self.has_one.push(relationship),
            Cardinality::Many => self.has_many.push(relationship),
        }
        true
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("indexes", &self.indexes)
            .field("unique_fields", &self.unique_fields)
            .field("required_fields", &self.required_fields)
            .field("has_one", &self.has_one)
            .field("has_many", &self.has_many)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("class_methods", &self.class_methods.keys().collect::<Vec<_>>())
            .field("stored", &self.storage.is_some())
            .finish()
    }
}

/// Returns `true` if `name` matches `[A-Za-z0-9_]+`.
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
