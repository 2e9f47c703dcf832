//! Writing entities.

use super::lock::PersistLock;
use super::{relation_of, KeySpace, StorageEngine};
use crate::entity::{Entity, OneTarget, Snapshot, ID_KEY};
use crate::error::{CoreError, CoreResult};
use crate::field::Value;
use crate::schema::{ModelSchema, Relationship};
use clay_storage::HashFields;
use std::slice;

impl StorageEngine {
    /// Persists a batch of entities and returns their ids, in order.
    ///
    /// The persist lock of every model in the batch is held for the whole
    /// batch. Ids are reserved for every entity before anything is written,
    /// so entities of one batch can point at each other. Writing stops at
    /// the first failing entity; the ones before it stay written.
    ///
    /// # Errors
    ///
    /// - [`CoreError::LockTimeout`] if a model lock cannot be taken
    /// - [`CoreError::Uniqueness`] if a unique value is already stored
    /// - [`CoreError::Storage`] for backend failures
    pub fn persist(&self, entities: &[Entity]) -> CoreResult<Vec<u64>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut models: Vec<&str> = entities.iter().map(|e| e.model().name()).collect();
        models.sort_unstable();
        models.dedup();
        let lock_keys = models.iter().map(|model| self.keys(model).lock()).collect();
        let _lock = PersistLock::acquire(self.backend.as_ref(), lock_keys, &self.config)?;

        for entity in entities {
            self.reserve_id(entity)?;
        }

        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            ids.push(self.write(entity)?);
        }
        Ok(ids)
    }

    /// Persists one entity and returns its id.
    pub fn persist_one(&self, entity: &Entity) -> CoreResult<u64> {
        self.persist(slice::from_ref(entity))?
            .first()
            .copied()
            .ok_or_else(|| CoreError::unsaved(entity.model().name()))
    }

    /// Gives an entity its id and keeps the counters ahead of it.
    fn reserve_id(&self, entity: &Entity) -> CoreResult<()> {
        if entity.is_saved() {
            return Ok(());
        }
        let keys = self.keys(entity.model().name());

        let id = match entity.id() {
            Some(id) => {
                if self.read_counter(&keys.count())? < id {
                    self.backend.set(&keys.count(), &id.to_string())?;
                }
                id
            }
            None => {
                let reserved = self.backend.increment(&keys.count())?;
                let id = u64::try_from(reserved).map_err(|_| {
                    CoreError::corrupt_record(keys.count(), format!("negative counter {reserved}"))
                })?;
                entity.assign_id(id);
                id
            }
        };

        if self.read_counter(&keys.highest_id())? < id {
            self.backend.set(&keys.highest_id(), &id.to_string())?;
        }
        Ok(())
    }

    fn read_counter(&self, key: &str) -> CoreResult<u64> {
        match self.backend.get(key)? {
            None => Ok(0),
            Some(text) => text
                .parse()
                .map_err(|_| CoreError::corrupt_record(key, format!("not a counter: {text}"))),
        }
    }

    fn write(&self, entity: &Entity) -> CoreResult<u64> {
        let schema = entity.schema()?;
        let id = entity
            .id()
            .ok_or_else(|| CoreError::unsaved(schema.name()))?;
        let keys = self.keys(schema.name());
        let key = keys.record(id);
        let snapshot = entity.snapshot();
        let stored = self.backend.hash_get_all(&key)?;

        self.check_unique(&schema, &keys, &key, &snapshot)?;

        for field in schema.indexes() {
            let Some(old) = stored.get(field) else {
                continue;
            };
            let new = snapshot.values.get(field).and_then(Value::to_stored);
            if new.as_deref() != Some(old.as_str()) {
                self.backend.sorted_set_remove(&keys.index(field, old), &key)?;
            }
        }

        let mut fields = vec![(ID_KEY.to_string(), id.to_string())];
        let mut cleared = Vec::new();
        for def in schema.fields() {
            match snapshot.values.get(&def.name).and_then(Value::to_stored) {
                Some(text) => fields.push((def.name.clone(), text)),
                None if stored.contains_key(&def.name) => cleared.push(def.name.clone()),
                None => {}
            }
        }
        for relationship in schema.has_one() {
            self.write_one(relationship, id, &key, &stored, &snapshot, &mut fields, &mut cleared)?;
        }

        self.backend.hash_set_fields(&key, &fields)?;
        if !cleared.is_empty() {
            self.backend.hash_delete_fields(&key, &cleared)?;
        }

        for field in schema.indexes() {
            if let Some(value) = snapshot.values.get(field).and_then(Value::to_stored) {
                self.backend.sorted_set_add(&keys.index(field, &value), to_score(id), &key)?;
            }
        }

        for (property, items) in &snapshot.assigned_many {
            if let Some(relationship) = schema.to_many(property) {
                self.write_many(relationship, &keys, id, &key, items)?;
            }
        }

        entity.mark_saved();
        tracing::debug!(model = schema.name(), id, fields = fields.len(), "persisted entity");
        Ok(id)
    }

    fn check_unique(
        &self,
        schema: &ModelSchema,
        keys: &KeySpace,
        key: &str,
        snapshot: &Snapshot,
    ) -> CoreResult<()> {
        for field in schema.unique_fields() {
            let Some(value) = snapshot.values.get(field).and_then(Value::to_stored) else {
                continue;
            };
            for member in self.backend.sorted_set_range(&keys.index(field, &value), 0, -1)? {
                if member == key {
                    continue;
                }
                // Bucket members whose record moved on are leftovers.
                if self.backend.hash_get_field(&member, field)?.as_deref() == Some(value.as_str()) {
                    return Err(CoreError::Uniqueness {
                        model: schema.name().to_string(),
                        field: field.clone(),
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_one(
        &self,
        relationship: &Relationship,
        id: u64,
        key: &str,
        stored: &HashFields,
        snapshot: &Snapshot,
        fields: &mut Vec<(String, String)>,
        cleared: &mut Vec<String>,
    ) -> CoreResult<()> {
        let old_target = stored.get(&relationship.property);
        let new_target = match snapshot.one.get(&relationship.property) {
            None => None,
            Some(OneTarget::Reference(target_id)) => Some(*target_id),
            Some(OneTarget::Entity(target)) => match target.id() {
                Some(target_id) => Some(target_id),
                // Not persisted yet; its own persist links it.
                None => return Ok(()),
            },
        };
        let new_target = new_target.map(|target_id| self.keys(&relationship.target).record(target_id));

        if let Some(old) = old_target {
            if new_target.as_ref() != Some(old) {
                self.backend
                    .sorted_set_remove(&relation_of(old, &relationship.inverse), key)?;
            }
        }
        match new_target {
            Some(target_key) => {
                self.backend.sorted_set_add(
                    &relation_of(&target_key, &relationship.inverse),
                    to_score(id),
                    key,
                )?;
                fields.push((relationship.property.clone(), target_key));
            }
            None if old_target.is_some() => cleared.push(relationship.property.clone()),
            None => {}
        }
        Ok(())
    }

    /// Replaces a stored to-many set with the assigned list.
    fn write_many(
        &self,
        relationship: &Relationship,
        keys: &KeySpace,
        id: u64,
        key: &str,
        items: &[Entity],
    ) -> CoreResult<()> {
        let set = keys.relation(id, &relationship.property);
        let members: Vec<(u64, String)> = items
            .iter()
            .filter(|item| item.is_saved())
            .filter_map(|item| Some((item.id()?, self.keys(item.model().name()))))
            .map(|(item_id, item_keys)| (item_id, item_keys.record(item_id)))
            .collect();

        for previous in self.backend.sorted_set_range(&set, 0, -1)? {
            if members.iter().any(|(_, member)| *member == previous) {
                continue;
            }
            let back = self.backend.hash_get_field(&previous, &relationship.inverse)?;
            if back.as_deref() == Some(key) {
                self.backend
                    .hash_delete_fields(&previous, &[relationship.inverse.clone()])?;
            }
        }
        self.backend.delete(&[set.clone()])?;

        for (item_id, member) in &members {
            if let Some(owner) = self.backend.hash_get_field(member, &relationship.inverse)? {
                if owner != key {
                    self.backend
                        .sorted_set_remove(&relation_of(&owner, &relationship.property), member)?;
                }
            }
            self.backend.sorted_set_add(&set, to_score(*item_id), member)?;
            self.backend.hash_set_fields(
                member,
                &[(relationship.inverse.clone(), key.to_string())],
            )?;
        }
        Ok(())
    }
}

fn to_score(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}
