//! The registry of declared models.

use super::{ModelSchema, SchemaBuilder};
use crate::error::{CoreError, CoreResult};
use crate::model::Model;
use crate::store::StorageEngine;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct RegistryInner {
    models: RwLock<HashMap<String, Arc<ModelSchema>>>,
    primary: RwLock<Option<Arc<StorageEngine>>>,
}

/// Holds every declared model and the primary storage engine.
///
/// A registry is an explicit object: create one per process (or per test)
/// and pass it around. Cloning is cheap and yields a handle to the same
/// registry.
///
/// # Relationship wiring
///
/// Declaring `has_one(property, Target, inverse)` registers the forward side
/// on the model being declared, then the inverse `has_many(inverse, Self,
/// property)` on `Target`. An inverse that is already declared is left
/// alone, so both sides may declare each other.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a model.
    ///
    /// Redeclaring a name replaces the previous schema.
    ///
    /// # Errors
    ///
    /// Returns whatever error `fields` returns (typically
    /// [`CoreError::Naming`]) and [`CoreError::UnknownModel`] when a
    /// relationship targets an undeclared model.
    pub fn declare<F>(&self, name: &str, fields: F) -> CoreResult<Model>
    where
        F: FnOnce(&mut SchemaBuilder) -> CoreResult<()>,
    {
        let mut builder = SchemaBuilder::new(name);
        fields(&mut builder)?;
        self.install(builder)
    }

    /// Declares a model that starts from a copy of `parent`.
    ///
    /// The child gets the parent's fields, indexes, unique and required
    /// fields, relationships, methods and storage binding. Later changes to
    /// either schema never reach the other.
    pub fn declare_with_parent<F>(&self, name: &str, parent: &str, fields: F) -> CoreResult<Model>
    where
        F: FnOnce(&mut SchemaBuilder) -> CoreResult<()>,
    {
        let parent = self.schema(parent)?;
        let mut builder = SchemaBuilder::from_parent(name, &parent);
        fields(&mut builder)?;
        self.install(builder)
    }

    fn install(&self, builder: SchemaBuilder) -> CoreResult<Model> {
        let (schema, declared) = builder.finish();
        let name = schema.name.clone();

        let mut models = self.inner.models.write();
        if let Some(missing) = declared
            .iter()
            .find(|rel| rel.target != name && !models.contains_key(&rel.target))
        {
            return Err(CoreError::UnknownModel {
                name: missing.target.clone(),
            });
        }

        tracing::debug!(
            model = %name,
            fields = schema.fields.len(),
            indexes = schema.indexes.len(),
            "declared model"
        );
        models.insert(name.clone(), Arc::new(schema));

        for relationship in declared {
            let inverse = relationship.inverse_on(&name);
            if let Some(target) = models.get_mut(&relationship.target) {
                let mut updated = (**target).clone();
                if updated.add_relationship(inverse) {
                    *target = Arc::new(updated);
                }
            }
        }
        drop(models);

        Ok(Model::handle(self.clone(), name))
    }

    /// Returns the handle of a declared model.
    pub fn model(&self, name: &str) -> CoreResult<Model> {
        if self.contains(name) {
            Ok(Model::handle(self.clone(), name.to_string()))
        } else {
            Err(CoreError::UnknownModel {
                name: name.to_string(),
            })
        }
    }

    /// Returns the current schema of a declared model.
    pub fn schema(&self, name: &str) -> CoreResult<Arc<ModelSchema>> {
        self.inner
            .models
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownModel {
                name: name.to_string(),
            })
    }

    /// Returns `true` if `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.models.read().contains_key(name)
    }

    /// Names of every declared model, sorted.
    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.models.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// `name` followed by every declared model derived from it, sorted.
    pub(crate) fn family(&self, name: &str) -> Vec<String> {
        let models = self.inner.models.read();
        let mut derived: Vec<String> = models
            .values()
            .filter(|schema| schema.ancestors.iter().any(|a| a == name))
            .map(|schema| schema.name.clone())
            .collect();
        derived.sort();
        derived.insert(0, name.to_string());
        derived
    }

    /// Sets the engine used by models without their own binding.
    pub fn set_primary_storage(&self, engine: Arc<StorageEngine>) {
        *self.inner.primary.write() = Some(engine);
    }

    /// Returns the primary storage engine, if set.
    #[must_use]
    pub fn primary_storage(&self) -> Option<Arc<StorageEngine>> {
        self.inner.primary.read().clone()
    }

    /// Resolves the engine for a model: its own binding, else the primary.
    pub fn storage_for(&self, name: &str) -> CoreResult<Arc<StorageEngine>> {
        let schema = self.schema(name)?;
        schema
            .storage
            .clone()
            .or_else(|| self.primary_storage())
            .ok_or_else(|| CoreError::NoStorage {
                model: name.to_string(),
            })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("models", &self.model_names())
            .field("primary_storage", &self.inner.primary.read().is_some())
            .finish()
    }
}
