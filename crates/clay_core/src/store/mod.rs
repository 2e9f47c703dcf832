//! The key-value storage engine.
//!
//! [`StorageEngine`] maps entities onto a [`KeyValueBackend`]: primary
//! hashes, id counters, index buckets, relationship sets and the persist
//! lock. See [`KeySpace`] for the key layout.
//!
//! # Invariants
//!
//! - Ids are allocated from `M:count` and never reused
//! - A stored entity with a non-null value for an indexed field is a member
//!   of exactly that value's bucket
//! - No two stored entities hold the same value of a unique field
//! - Persists of a model are serialized by its advisory lock

mod keys;
mod lock;
mod persist;

pub use keys::KeySpace;

pub(crate) use keys::relation_of;

use crate::config::StorageConfig;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::field::Value;
use crate::model::Model;
use crate::schema::ModelSchema;
use clay_storage::{HashFields, KeyValueBackend};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Persists and loads entities through a key-value backend.
///
/// The engine is `Send + Sync`; share it with an `Arc` to persist from
/// several threads.
pub struct StorageEngine {
    backend: Arc<dyn KeyValueBackend>,
    config: StorageConfig,
}

impl StorageEngine {
    /// Creates an engine with the default configuration.
    pub fn new<B: KeyValueBackend + 'static>(backend: B) -> Self {
        Self::with_config(backend, StorageConfig::default())
    }

    /// Creates an engine with an explicit configuration.
    pub fn with_config<B: KeyValueBackend + 'static>(backend: B, config: StorageConfig) -> Self {
        Self::from_arc(Arc::new(backend), config)
    }

    /// Creates an engine over a shared backend.
    #[must_use]
    pub fn from_arc(backend: Arc<dyn KeyValueBackend>, config: StorageConfig) -> Self {
        Self { backend, config }
    }

    /// The backend this engine talks to.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KeyValueBackend> {
        &self.backend
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Key space of a model.
    #[must_use]
    pub fn keys(&self, model: &str) -> KeySpace {
        KeySpace::new(&self.config.key_prefix, model)
    }

    /// Loads one stored entity.
    ///
    /// # Errors
    ///
    /// [`CoreError::EntityNotFound`] if no primary record exists.
    pub fn find_by_id(&self, model: &Model, id: u64) -> CoreResult<Entity> {
        let schema = model.schema()?;
        let key = self.keys(model.name()).record(id);
        let stored = self.backend.hash_get_all(&key)?;
        if stored.is_empty() {
            return Err(CoreError::EntityNotFound {
                model: model.name().to_string(),
                id,
            });
        }
        self.load(model, &schema, id, &key, &stored)
    }

    /// Loads every stored entity of a model, ordered by id.
    pub fn fetch_all(&self, model: &Model) -> CoreResult<Vec<Entity>> {
        let schema = model.schema()?;
        let keys = self.keys(model.name());
        let mut ids: Vec<u64> = self
            .backend
            .keys_matching(&keys.record_pattern())?
            .iter()
            .filter_map(|key| keys.parse_record_id(key))
            .collect();
        ids.sort_unstable();

        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            let key = keys.record(id);
            let stored = self.backend.hash_get_all(&key)?;
            if !stored.is_empty() {
                entities.push(self.load(model, &schema, id, &key, &stored)?);
            }
        }
        Ok(entities)
    }

    /// Rebuilds an entity from its primary hash.
    ///
    /// To-one properties come back as unresolved references.
    pub(crate) fn load(
        &self,
        model: &Model,
        schema: &ModelSchema,
        id: u64,
        key: &str,
        stored: &HashFields,
    ) -> CoreResult<Entity> {
        let values: BTreeMap<String, Value> = schema
            .fields()
            .iter()
            .filter_map(|def| {
                stored
                    .get(&def.name)
                    .map(|text| (def.name.clone(), def.kind.decode(text)))
            })
            .collect();

        let mut references = HashMap::new();
        for relationship in schema.has_one() {
            let Some(target_key) = stored.get(&relationship.property) else {
                continue;
            };
            let target_id = self
                .keys(&relationship.target)
                .parse_record_id(target_key)
                .ok_or_else(|| {
                    CoreError::corrupt_record(
                        key,
                        format!(
                            "{} does not point at a {}: {target_key}",
                            relationship.property, relationship.target
                        ),
                    )
                })?;
            references.insert(relationship.property.clone(), target_id);
        }

        Ok(Entity::from_stored(model.clone(), id, values, references))
    }

    /// Removes a stored entity.
    ///
    /// Index memberships of both the stored and the in-memory values are
    /// removed, along with the entity's place in its targets' lists, the
    /// back-references of its own lists, the primary hash and every
    /// relation set. The id is not reclaimed; the entity forgets it.
    ///
    /// # Errors
    ///
    /// [`CoreError::Unsaved`] if the entity has no id.
    pub fn erase(&self, entity: &Entity) -> CoreResult<()> {
        let schema = entity.schema()?;
        let id = entity
            .id()
            .ok_or_else(|| CoreError::unsaved(schema.name()))?;
        let keys = self.keys(schema.name());
        let key = keys.record(id);
        let stored = self.backend.hash_get_all(&key)?;
        let current = entity.values();

        for field in schema.indexes() {
            let mut values: Vec<String> = stored.get(field).cloned().into_iter().collect();
            if let Some(value) = current.get(field).and_then(Value::to_stored) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            for value in values {
                self.backend.sorted_set_remove(&keys.index(field, &value), &key)?;
            }
        }

        for relationship in schema.has_one() {
            let target_keys = self.keys(&relationship.target);
            let mut targets: Vec<String> = stored.get(&relationship.property).cloned().into_iter().collect();
            if let Some(target_id) = entity.reference(&relationship.property)? {
                let target_key = target_keys.record(target_id);
                if !targets.contains(&target_key) {
                    targets.push(target_key);
                }
            }
            for target_key in targets {
                self.backend
                    .sorted_set_remove(&relation_of(&target_key, &relationship.inverse), &key)?;
            }
        }

        for relationship in schema.has_many() {
            for member in self
                .backend
                .sorted_set_range(&keys.relation(id, &relationship.property), 0, -1)?
            {
                let back = self.backend.hash_get_field(&member, &relationship.inverse)?;
                if back.as_deref() == Some(key.as_str()) {
                    self.backend
                        .hash_delete_fields(&member, &[relationship.inverse.clone()])?;
                }
            }
        }

        let mut doomed = self.backend.keys_matching(&keys.relation_pattern(id))?;
        doomed.push(key);
        self.backend.delete(&doomed)?;
        entity.forget_id();

        tracing::debug!(model = schema.name(), id, "erased entity");
        Ok(())
    }

    /// Reloads every to-many list of an entity from storage.
    ///
    /// Does nothing for models without to-many relationships.
    ///
    /// # Errors
    ///
    /// [`CoreError::Unsaved`] if the entity has no id.
    pub fn sync(&self, entity: &Entity) -> CoreResult<()> {
        let schema = entity.schema()?;
        if schema.has_many().is_empty() {
            return Ok(());
        }
        let id = entity
            .id()
            .ok_or_else(|| CoreError::unsaved(schema.name()))?;
        let keys = self.keys(schema.name());
        let registry = entity.model().registry();

        for relationship in schema.has_many() {
            // Members may belong to models derived from the target.
            let family = registry
                .family(&relationship.target)
                .into_iter()
                .map(|name| -> CoreResult<_> { Ok((self.keys(&name), registry.model(&name)?)) })
                .collect::<CoreResult<Vec<_>>>()?;
            let mut items = Vec::new();
            for member in self
                .backend
                .sorted_set_range(&keys.relation(id, &relationship.property), 0, -1)?
            {
                let Some((item_id, model)) = family.iter().find_map(|(member_keys, model)| {
                    member_keys.parse_record_id(&member).map(|item_id| (item_id, model))
                }) else {
                    tracing::warn!(%member, "skipping foreign member of a relation set");
                    continue;
                };
                match self.find_by_id(model, item_id) {
                    Ok(item) => items.push(item),
                    Err(error) if error.is_not_found() => {
                        tracing::warn!(%member, "relation set points at a missing record");
                    }
                    Err(error) => return Err(error),
                }
            }
            entity.hydrate_many(relationship, items);
        }
        Ok(())
    }

    /// Returns the target of a to-one property, fetching it if it was
    /// loaded as a reference.
    pub fn resolve_one(&self, entity: &Entity, property: &str) -> CoreResult<Option<Entity>> {
        let schema = entity.schema()?;
        let relationship = schema
            .to_one(property)
            .ok_or_else(|| CoreError::unknown_field(schema.name(), property))?;
        if let Some(target) = entity.one(property)? {
            return Ok(Some(target));
        }
        let Some(target_id) = entity.reference(property)? else {
            return Ok(None);
        };
        let model = entity.model().registry().model(&relationship.target)?;
        let target = self.find_by_id(&model, target_id)?;
        entity.resolve_reference(property, &target);
        Ok(Some(target))
    }
}

impl fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
