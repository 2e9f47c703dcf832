//! Model handles.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::query::Pattern;
use crate::schema::{ModelSchema, Registry, SchemaBuilder};
use crate::store::StorageEngine;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// A handle to a declared model.
///
/// Handles are cheap to clone and always read the registry's current
/// schema, so a redeclaration is visible to existing handles.
#[derive(Clone)]
pub struct Model {
    registry: Registry,
    name: String,
}

impl Model {
    pub(crate) fn handle(registry: Registry, name: String) -> Self {
        Self { registry, name }
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registry this model is declared in.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The current schema.
    pub fn schema(&self) -> CoreResult<Arc<ModelSchema>> {
        self.registry.schema(&self.name)
    }

    /// The storage engine this model persists to.
    pub fn storage(&self) -> CoreResult<Arc<StorageEngine>> {
        self.registry.storage_for(&self.name)
    }

    /// Builds an entity from a raw JSON object; see [`Entity::new`].
    #[allow(clippy::new_ret_no_self)]
    pub fn new(&self, raw: JsonValue) -> CoreResult<Entity> {
        Entity::new(self, raw)
    }

    /// Builds an entity from JSON text.
    pub fn from_json(&self, text: &str) -> CoreResult<Entity> {
        let raw: JsonValue = serde_json::from_str(text)?;
        self.new(raw)
    }

    /// Builds an entity and persists it.
    pub fn create(&self, raw: JsonValue) -> CoreResult<Entity> {
        let entity = self.new(raw)?;
        entity.save()?;
        Ok(entity)
    }

    /// Fetches one stored entity.
    pub fn find_by_id(&self, id: u64) -> CoreResult<Entity> {
        self.storage()?.find_by_id(self, id)
    }

    /// Fetches every stored entity.
    pub fn all(&self) -> CoreResult<Vec<Entity>> {
        self.storage()?.fetch_all(self)
    }

    /// Every stored entity whose `field` matches, newest first.
    pub fn find_by(&self, field: &str, pattern: impl Into<Pattern>) -> CoreResult<Vec<Entity>> {
        self.storage()?.find_by_regex(self, field, &pattern.into())
    }

    /// The newest stored entity whose `field` matches.
    pub fn get_by(&self, field: &str, pattern: impl Into<Pattern>) -> CoreResult<Entity> {
        let pattern = pattern.into();
        let display = pattern.to_string();
        self.storage()?
            .find_by_regex(self, field, &pattern)?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NoMatch {
                field: field.to_string(),
                pattern: display,
            })
    }

    /// Declares a child model starting from this model's schema.
    pub fn subclass<F>(&self, name: &str, fields: F) -> CoreResult<Self>
    where
        F: FnOnce(&mut SchemaBuilder) -> CoreResult<()>,
    {
        self.registry.declare_with_parent(name, &self.name, fields)
    }

    /// Calls a class method declared on the model.
    pub fn call(&self, method: &str, args: &[JsonValue]) -> CoreResult<JsonValue> {
        let function = self
            .schema()?
            .class_method(method)
            .cloned()
            .ok_or_else(|| CoreError::UnknownMethod {
                model: self.name.clone(),
                method: method.to_string(),
            })?;
        function(self, args)
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Model").field(&self.name).finish()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
