//! Entities: in-memory records of a declared model.
//!
//! An [`Entity`] is a cheap-to-clone handle; clones share the same record.
//! Field assignments run through the field codecs of the model's schema and
//! relationship assignments keep both sides of the pair in step.
//!
//! # Construction order
//!
//! [`Entity::new`] applies its raw input in a fixed order so derived fields
//! always see their constituents:
//!
//! 1. `__id__`, when given
//! 2. auto fields, set to the construction time
//! 3. plain fields, in declaration order
//! 4. relationships
//! 5. derived (`HashOf`) fields
//! 6. the required-field check
//! 7. the model's `initialize` method, when declared, with the raw object
//!
//! Unknown keys are ignored.
//!
//! # Locking
//!
//! Each entity guards its state with its own lock. No method holds one
//! entity's lock while taking another's.

mod links;

pub(crate) use links::{ManyLink, OneLink, WeakEntity};

use crate::error::{CoreError, CoreResult};
use crate::field::{now_millis, FieldKind, Value};
use crate::model::Model;
use crate::schema::{Cardinality, FieldDef, ModelSchema, Relationship};
use crate::store::StorageEngine;
use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Reserved raw key carrying a pre-assigned id.
pub const ID_KEY: &str = "__id__";

/// Instance method run once at the end of [`Entity::new`].
const INITIALIZE: &str = "initialize";

#[derive(Default)]
pub(crate) struct EntityState {
    pub(crate) id: Option<u64>,
    pub(crate) saved: bool,
    pub(crate) values: BTreeMap<String, Value>,
    /// Raw inputs of derived fields, kept to recompute them.
    pub(crate) hash_inputs: HashMap<String, JsonValue>,
    pub(crate) one: HashMap<String, OneLink>,
    pub(crate) many: HashMap<String, Vec<ManyLink>>,
    /// To-many properties assigned in memory since the last persist.
    pub(crate) assigned_many: BTreeSet<String>,
}

/// What the storage engine needs to write one entity.
pub(crate) struct Snapshot {
    pub(crate) values: BTreeMap<String, Value>,
    pub(crate) one: HashMap<String, OneTarget>,
    pub(crate) assigned_many: HashMap<String, Vec<Entity>>,
}

/// The current target of a to-one property.
pub(crate) enum OneTarget {
    Entity(Entity),
    Reference(u64),
}

/// A record of a declared model.
#[derive(Clone)]
pub struct Entity {
    pub(crate) state: Arc<RwLock<EntityState>>,
    pub(crate) model: Model,
}

impl Entity {
    /// Builds an entity from a raw JSON object.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::FieldValidation`] when a codec rejects a
    /// value or a required field is missing, and with
    /// [`CoreError::RelationshipDecode`] for malformed relationship input.
    /// Errors from a declared `initialize` method are returned as is.
    /// Nothing is constructed on failure.
    pub fn new(model: &Model, raw: JsonValue) -> CoreResult<Self> {
        let schema = model.schema()?;
        let object = match raw {
            JsonValue::Object(object) => object,
            JsonValue::Null => Map::new(),
            other => {
                return Err(CoreError::field_validation(format!(
                    "a {} can only be built from a JSON object, got {other}",
                    schema.name()
                )))
            }
        };

        let entity = Self::blank(model.clone());
        {
            let mut state = entity.state.write();
            if let Some(raw_id) = object.get(ID_KEY) {
                state.id = parse_id(raw_id)?;
            }
            for field in schema.fields().iter().filter(|f| f.kind == FieldKind::Auto) {
                state
                    .values
                    .insert(field.name.clone(), Value::Integer(now_millis()));
            }
        }

        for field in schema.fields() {
            if field.kind == FieldKind::Auto || field.kind.is_derived() {
                continue;
            }
            if let Some(raw) = object.get(&field.name).filter(|raw| !raw.is_null()) {
                entity.set_field(&schema, field, raw)?;
            }
        }
        for relationship in schema.has_one() {
            if let Some(raw) = object.get(&relationship.property) {
                entity.set_one_json(relationship, raw)?;
            }
        }
        for relationship in schema.has_many() {
            if let Some(raw) = object.get(&relationship.property) {
                entity.set_many_json(relationship, raw)?;
            }
        }
        for field in schema.fields().iter().filter(|f| f.kind.is_derived()) {
            if let Some(raw) = object.get(&field.name).filter(|raw| !raw.is_null()) {
                entity.set_field(&schema, field, raw)?;
            }
        }

        entity.check_required(&schema)?;
        if let Some(initialize) = schema.method(INITIALIZE) {
            initialize(&entity, &[JsonValue::Object(object)])?;
        }
        Ok(entity)
    }

    fn blank(model: Model) -> Self {
        Self {
            state: Arc::new(RwLock::new(EntityState::default())),
            model,
        }
    }

    /// Rebuilds a stored entity without running codecs.
    pub(crate) fn from_stored(
        model: Model,
        id: u64,
        values: BTreeMap<String, Value>,
        references: HashMap<String, u64>,
    ) -> Self {
        let entity = Self::blank(model);
        {
            let mut state = entity.state.write();
            state.id = Some(id);
            state.saved = true;
            state.values = values;
            state.one = references
                .into_iter()
                .map(|(property, id)| (property, OneLink::Reference(id)))
                .collect();
        }
        entity
    }

    fn check_required(&self, schema: &ModelSchema) -> CoreResult<()> {
        let state = self.state.read();
        for name in schema.required_fields() {
            let present = if schema.field(name).is_some() {
                state.values.get(name).is_some_and(|v| !v.is_null())
            } else if schema.to_one(name).is_some() {
                state.one.contains_key(name)
            } else if schema.to_many(name).is_some() {
                state.many.get(name).is_some_and(|list| !list.is_empty())
            } else {
                false
            };
            if !present {
                return Err(CoreError::required(name));
            }
        }
        Ok(())
    }

    /// The model handle this entity belongs to.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The model's current schema.
    pub fn schema(&self) -> CoreResult<Arc<ModelSchema>> {
        self.model.schema()
    }

    /// The id, if one was pre-assigned or allocated.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.state.read().id
    }

    /// Returns `true` once the entity has been written to storage (or was
    /// loaded from it) and not erased since.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.state.read().saved
    }

    /// Returns `true` if both handles share the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Returns the value of a declared field ([`Value::Null`] when unset).
    pub fn get(&self, field: &str) -> CoreResult<Value> {
        let schema = self.schema()?;
        if schema.field(field).is_none() {
            return Err(CoreError::unknown_field(schema.name(), field));
        }
        Ok(self.state.read().values.get(field).cloned().unwrap_or_default())
    }

    /// Returns a copy of every field value.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.state.read().values.clone()
    }

    /// Assigns a field or relationship from raw JSON.
    ///
    /// Fields run through their codec; a result of null fails with
    /// `could not process the field "<field>"`. Relationship properties
    /// accept what [`Entity::new`] accepts for them.
    pub fn set(&self, field: &str, raw: impl Into<JsonValue>) -> CoreResult<()> {
        let raw = raw.into();
        let schema = self.schema()?;
        if let Some(def) = schema.field(field) {
            return self.set_field(&schema, def, &raw);
        }
        if let Some(relationship) = schema.to_one(field) {
            return self.set_one_json(relationship, &raw);
        }
        if let Some(relationship) = schema.to_many(field) {
            return self.set_many_json(relationship, &raw);
        }
        Err(CoreError::unknown_field(schema.name(), field))
    }

    fn set_field(&self, schema: &ModelSchema, def: &FieldDef, raw: &JsonValue) -> CoreResult<()> {
        let mut state = self.state.write();
        let value = def.kind.encode(raw, &state.values)?;
        if value.is_null() {
            return Err(CoreError::field_validation(format!(
                "could not process the field \"{}\"",
                def.name
            )));
        }
        state.values.insert(def.name.clone(), value);
        if def.kind.is_derived() {
            state.hash_inputs.insert(def.name.clone(), raw.clone());
        }

        for dependent in schema.fields() {
            if dependent.name == def.name || !dependent.kind.constituents().contains(&def.name) {
                continue;
            }
            if let Some(input) = state.hash_inputs.get(&dependent.name).cloned() {
                let value = dependent.kind.encode(&input, &state.values)?;
                state.values.insert(dependent.name.clone(), value);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    fn relationship_one(&self, property: &str) -> CoreResult<Relationship> {
        let schema = self.schema()?;
        schema
            .to_one(property)
            .cloned()
            .ok_or_else(|| CoreError::unknown_field(schema.name(), property))
    }

    fn relationship_many(&self, property: &str) -> CoreResult<Relationship> {
        let schema = self.schema()?;
        schema
            .to_many(property)
            .cloned()
            .ok_or_else(|| CoreError::unknown_field(schema.name(), property))
    }

    /// List members may also belong to a model derived from the target;
    /// to-one targets must be of the target model itself.
    fn check_target(&self, relationship: &Relationship, target: &Self) -> CoreResult<()> {
        let accepted = match relationship.cardinality {
            Cardinality::Many => target.schema()?.is_a(&relationship.target),
            Cardinality::One => target.model.name() == relationship.target,
        };
        if accepted {
            Ok(())
        } else {
            Err(CoreError::field_validation(format!(
                "'{}.{}' expects a {}, got a {}",
                self.model.name(),
                relationship.property,
                relationship.target,
                target.model.name()
            )))
        }
    }

    /// Returns the entity a to-one property points at.
    ///
    /// A reference loaded from storage and not resolved yet yields `None`;
    /// see [`Entity::reference`] and [`StorageEngine::resolve_one`].
    pub fn one(&self, property: &str) -> CoreResult<Option<Self>> {
        self.relationship_one(property)?;
        let link = self.state.read().one.get(property).cloned();
        Ok(link.and_then(|link| link.entity()))
    }

    /// Returns the foreign id of a to-one property, resolved or not.
    pub fn reference(&self, property: &str) -> CoreResult<Option<u64>> {
        self.relationship_one(property)?;
        let link = self.state.read().one.get(property).cloned();
        Ok(match link {
            Some(OneLink::Reference(id)) => Some(id),
            Some(link) => link.entity().and_then(|entity| entity.id()),
            None => None,
        })
    }

    /// Returns the live entities of a to-many property.
    pub fn many(&self, property: &str) -> CoreResult<Vec<Self>> {
        self.relationship_many(property)?;
        let links = self.state.read().many.get(property).cloned().unwrap_or_default();
        Ok(links.iter().filter_map(ManyLink::entity).collect())
    }

    /// Points a to-one property at `target` and appends this entity to the
    /// target's inverse list.
    pub fn set_one(&self, property: &str, target: &Self) -> CoreResult<()> {
        let relationship = self.relationship_one(property)?;
        self.check_target(&relationship, target)?;

        // A target whose list already owns this entity stays the owner.
        let link = if target.holds_owned(&relationship.inverse, self) {
            OneLink::Inverse(target.downgrade())
        } else {
            OneLink::Owned(target.clone())
        };
        let previous = self.state.write().one.insert(property.to_string(), link);

        if let Some(previous) = previous.and_then(|link| link.entity()) {
            if !previous.ptr_eq(target) {
                previous.remove_from_many(&relationship.inverse, self);
            }
        }
        target.add_to_many(&relationship.inverse, self);
        Ok(())
    }

    /// Clears a to-one property and leaves the former target's list.
    pub fn clear_one(&self, property: &str) -> CoreResult<()> {
        let relationship = self.relationship_one(property)?;
        let previous = self.state.write().one.remove(property);
        if let Some(previous) = previous.and_then(|link| link.entity()) {
            previous.remove_from_many(&relationship.inverse, self);
        }
        Ok(())
    }

    /// Replaces a to-many list and back-assigns the inverse to-one property
    /// of every element.
    ///
    /// Elements dropped from the list lose their back-reference; elements
    /// taken from another owner leave that owner's list. Repeating an
    /// assignment changes nothing.
    pub fn set_many(&self, property: &str, items: &[Self]) -> CoreResult<()> {
        let relationship = self.relationship_many(property)?;
        let mut unique: Vec<Self> = Vec::with_capacity(items.len());
        for item in items {
            self.check_target(&relationship, item)?;
            if !unique.iter().any(|seen| seen.ptr_eq(item)) {
                unique.push(item.clone());
            }
        }

        let previous = {
            let mut state = self.state.write();
            state.assigned_many.insert(property.to_string());
            let links = unique.iter().cloned().map(ManyLink::Owned).collect();
            state.many.insert(property.to_string(), links).unwrap_or_default()
        };

        for old in previous.iter().filter_map(ManyLink::entity) {
            if !unique.iter().any(|item| item.ptr_eq(&old)) {
                old.clear_one_if_points_to(&relationship.inverse, self);
            }
        }

        let back = OneLink::Inverse(self.downgrade());
        for item in &unique {
            let previous_owner = item
                .state
                .write()
                .one
                .insert(relationship.inverse.clone(), back.clone());
            if let Some(owner) = previous_owner.and_then(|link| link.entity()) {
                if !owner.ptr_eq(self) {
                    owner.remove_from_many(property, item);
                }
            }
        }
        Ok(())
    }

    fn set_one_json(&self, relationship: &Relationship, raw: &JsonValue) -> CoreResult<()> {
        if raw.is_null() {
            return self.clear_one(&relationship.property);
        }
        let target = self.decode_related(relationship, raw)?;
        self.set_one(&relationship.property, &target)
    }

    fn set_many_json(&self, relationship: &Relationship, raw: &JsonValue) -> CoreResult<()> {
        let items = match raw {
            JsonValue::Null => Vec::new(),
            JsonValue::Array(elements) => elements
                .iter()
                .filter(|element| !element.is_null())
                .map(|element| self.decode_related(relationship, element))
                .collect::<CoreResult<Vec<_>>>()?,
            other => return Err(self.decode_error(relationship, other)),
        };
        self.set_many(&relationship.property, &items)
    }

    /// Builds the related entity from an object or a JSON-encoded object.
    fn decode_related(&self, relationship: &Relationship, raw: &JsonValue) -> CoreResult<Self> {
        let object = match raw {
            JsonValue::Object(_) => raw.clone(),
            JsonValue::String(text) => match serde_json::from_str::<JsonValue>(text) {
                Ok(parsed @ JsonValue::Object(_)) => parsed,
                _ => return Err(self.decode_error(relationship, raw)),
            },
            other => return Err(self.decode_error(relationship, other)),
        };
        let target = self.model.registry().model(&relationship.target)?;
        Self::new(&target, object)
    }

    fn decode_error(&self, relationship: &Relationship, raw: &JsonValue) -> CoreError {
        let raw = match raw {
            JsonValue::String(text) => text.clone(),
            other => other.to_string(),
        };
        CoreError::RelationshipDecode {
            raw,
            model: self.model.name().to_string(),
            property: relationship.property.clone(),
            target: relationship.target.clone(),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            state: Arc::downgrade(&self.state),
            model: self.model.clone(),
        }
    }

    fn holds_owned(&self, property: &str, member: &Self) -> bool {
        self.state
            .read()
            .many
            .get(property)
            .is_some_and(|list| list.iter().any(|l| l.is_owned() && l.points_to(member)))
    }

    fn add_to_many(&self, property: &str, member: &Self) {
        let mut state = self.state.write();
        let list = state.many.entry(property.to_string()).or_default();
        if !list.iter().any(|link| link.points_to(member)) {
            list.push(ManyLink::Inverse(member.downgrade()));
        }
    }

    fn remove_from_many(&self, property: &str, member: &Self) {
        if let Some(list) = self.state.write().many.get_mut(property) {
            list.retain(|link| !link.points_to(member));
        }
    }

    fn clear_one_if_points_to(&self, property: &str, target: &Self) {
        let mut state = self.state.write();
        if state.one.get(property).is_some_and(|link| link.points_to(target)) {
            state.one.remove(property);
        }
    }

    // ------------------------------------------------------------------
    // Storage hooks
    // ------------------------------------------------------------------

    pub(crate) fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        let one = state
            .one
            .iter()
            .filter_map(|(property, link)| {
                let target = match link {
                    OneLink::Reference(id) => OneTarget::Reference(*id),
                    other => OneTarget::Entity(other.entity()?),
                };
                Some((property.clone(), target))
            })
            .collect();
        let assigned_many = state
            .assigned_many
            .iter()
            .map(|property| {
                let items = state
                    .many
                    .get(property)
                    .map(|list| list.iter().filter_map(ManyLink::entity).collect())
                    .unwrap_or_default();
                (property.clone(), items)
            })
            .collect();
        Snapshot {
            values: state.values.clone(),
            one,
            assigned_many,
        }
    }

    pub(crate) fn assign_id(&self, id: u64) {
        self.state.write().id = Some(id);
    }

    pub(crate) fn mark_saved(&self) {
        let mut state = self.state.write();
        state.saved = true;
        state.assigned_many.clear();
    }

    pub(crate) fn forget_id(&self) {
        let mut state = self.state.write();
        state.id = None;
        state.saved = false;
    }

    /// Replaces a to-many list with entities loaded from storage.
    pub(crate) fn hydrate_many(&self, relationship: &Relationship, items: Vec<Self>) {
        let back = OneLink::Inverse(self.downgrade());
        for item in &items {
            item.state
                .write()
                .one
                .insert(relationship.inverse.clone(), back.clone());
        }
        let mut state = self.state.write();
        state.assigned_many.remove(&relationship.property);
        state.many.insert(
            relationship.property.clone(),
            items.into_iter().map(ManyLink::Owned).collect(),
        );
    }

    /// Swaps an unresolved reference for the fetched entity.
    pub(crate) fn resolve_reference(&self, property: &str, target: &Self) {
        let mut state = self.state.write();
        if matches!(state.one.get(property), Some(OneLink::Reference(_))) {
            state
                .one
                .insert(property.to_string(), OneLink::Owned(target.clone()));
        }
    }

    // ------------------------------------------------------------------
    // Persistence shortcuts
    // ------------------------------------------------------------------

    /// Persists with the model's storage engine; returns the id and this
    /// entity.
    pub fn save(&self) -> CoreResult<(u64, Self)> {
        let engine = self.model.storage()?;
        self.save_with(&engine)
    }

    /// Persists with an explicit storage engine.
    pub fn save_with(&self, engine: &StorageEngine) -> CoreResult<(u64, Self)> {
        let id = engine.persist_one(self)?;
        Ok((id, self.clone()))
    }

    /// Removes the entity from the model's storage engine.
    pub fn erase(&self) -> CoreResult<()> {
        let engine = self.model.storage()?;
        engine.erase(self)
    }

    /// Removes the entity from an explicit storage engine.
    pub fn erase_with(&self, engine: &StorageEngine) -> CoreResult<()> {
        engine.erase(self)
    }

    /// Reloads to-many lists from the model's storage engine.
    pub fn sync(&self) -> CoreResult<()> {
        let engine = self.model.storage()?;
        engine.sync(self)
    }

    /// Reloads to-many lists from an explicit storage engine.
    pub fn sync_with(&self, engine: &StorageEngine) -> CoreResult<()> {
        engine.sync(self)
    }

    /// Calls an instance method declared on the model.
    pub fn call(&self, method: &str, args: &[JsonValue]) -> CoreResult<JsonValue> {
        let schema = self.schema()?;
        let function = schema
            .method(method)
            .cloned()
            .ok_or_else(|| CoreError::UnknownMethod {
                model: schema.name().to_string(),
                method: method.to_string(),
            })?;
        drop(schema);
        function(self, args)
    }

    /// JSON form: `__id__` (when known), every non-null field and the
    /// foreign id of each linked to-one property.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let (id, values, one) = {
            let state = self.state.read();
            (state.id, state.values.clone(), state.one.clone())
        };

        let mut object = Map::new();
        if let Some(id) = id {
            object.insert(ID_KEY.to_string(), JsonValue::from(id));
        }
        for (name, value) in values.iter().filter(|(_, v)| !v.is_null()) {
            object.insert(name.clone(), value.to_json());
        }
        for (property, link) in one {
            let target = match link {
                OneLink::Reference(id) => Some(id),
                other => other.entity().and_then(|entity| entity.id()),
            };
            if let Some(target) = target {
                object.insert(property, JsonValue::from(target));
            }
        }
        JsonValue::Object(object)
    }
}

fn parse_id(raw: &JsonValue) -> CoreResult<Option<u64>> {
    let id = match raw {
        JsonValue::Null => return Ok(None),
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    match id {
        Some(0) => Ok(None),
        Some(id) => Ok(Some(id)),
        None => Err(CoreError::field_validation(format!(
            "\"{}\" is not a valid number",
            match raw {
                JsonValue::String(text) => text.clone(),
                other => other.to_string(),
            }
        ))),
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model.name(), self.to_json())
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Entity")
            .field("model", &self.model.name())
            .field("id", &state.id)
            .field("saved", &state.saved)
            .field("values", &state.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Registry;
    use serde_json::json;

    fn users() -> Model {
        let registry = Registry::new();
        registry
            .declare("User", |m| {
                m.field("name", FieldKind::String)?
                    .field("email", FieldKind::Email)?
                    .field("nick", FieldKind::Slug)?
                    .field("password", FieldKind::hash_of(["name", "email"]))?
                    .field("created_at", FieldKind::Auto)?
                    .required("name")?;
                Ok(())
            })
            .unwrap()
    }

    fn builds() -> (Model, Model) {
        let registry = Registry::new();
        let build = registry
            .declare("Build", |m| {
                m.field("status", FieldKind::Numeric)?;
                Ok(())
            })
            .unwrap();
        let instruction = registry
            .declare("BuildInstruction", |m| {
                m.field("name", FieldKind::String)?
                    .has_many("builds", "Build", "instruction")?;
                Ok(())
            })
            .unwrap();
        (build, instruction)
    }

    #[test]
    fn hash_field_sees_siblings_regardless_of_key_order() {
        let user = users()
            .new(json!({
                "password": "cheezNwine",
                "email": "zach@yipit.com",
                "name": "Zach Smith",
            }))
            .unwrap();
        assert_eq!(
            user.get("password").unwrap(),
            Value::from("8e5a04ac30cf92eafe36e7a6f9ae9e3af240dc06")
        );
    }

    #[test]
    fn hash_field_recomputes_when_a_constituent_changes() {
        let user = users()
            .new(json!({"name": "Zach Smith", "email": "zach@yipit.com", "password": "cheezNwine"}))
            .unwrap();
        let before = user.get("password").unwrap();

        user.set("name", "Zach").unwrap();
        assert_ne!(user.get("password").unwrap(), before);

        user.set("name", "Zach Smith").unwrap();
        assert_eq!(user.get("password").unwrap(), before);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let user = users().new(json!({"name": "Zach", "nickname": "z"})).unwrap();
        assert!(!user.values().contains_key("nickname"));
        assert!(matches!(
            user.get("nickname"),
            Err(CoreError::UnknownField { .. })
        ));
        assert!(matches!(
            user.set("nickname", "z"),
            Err(CoreError::UnknownField { .. })
        ));
    }

    #[test]
    fn required_field_missing() {
        let err = users().new(json!({"email": "zach@yipit.com"})).unwrap_err();
        assert_eq!(err.to_string(), "the \"name\" field is required");
    }

    #[test]
    fn invalid_value_aborts_construction() {
        let err = users()
            .new(json!({"name": "Zach", "email": "not-an-email"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "\"not-an-email\" is not a valid email");
    }

    #[test]
    fn setting_null_fails() {
        let user = users().new(json!({"name": "Zach"})).unwrap();
        let err = user.set("name", JsonValue::Null).unwrap_err();
        assert_eq!(err.to_string(), "could not process the field \"name\"");
        assert_eq!(user.get("name").unwrap(), Value::from("Zach"));
    }

    #[test]
    fn null_in_construction_input_leaves_fields_unset() {
        let user = users()
            .new(json!({"name": "Zach", "nick": null, "email": null, "password": null}))
            .unwrap();
        assert_eq!(user.get("nick").unwrap(), Value::Null);
        assert!(!user.values().contains_key("nick"));
        assert!(!user.values().contains_key("email"));
        assert!(!user.values().contains_key("password"));
    }

    #[test]
    fn initialize_runs_after_construction() {
        let registry = Registry::new();
        let model = registry
            .declare("Greeting", |m| {
                m.field("text", FieldKind::String)?
                    .field("shout", FieldKind::String)?
                    .method("initialize", |entity, args| {
                        let text = entity.get("text")?.to_string();
                        assert!(args[0].get("text").is_some());
                        entity.set("shout", text.to_uppercase())?;
                        Ok(JsonValue::Null)
                    })?;
                Ok(())
            })
            .unwrap();

        let hello = model.new(json!({"text": "hello"})).unwrap();
        assert_eq!(hello.get("shout").unwrap(), Value::from("HELLO"));
    }

    #[test]
    fn initialize_errors_abort_construction() {
        let registry = Registry::new();
        let model = registry
            .declare("Strict", |m| {
                m.field("text", FieldKind::String)?
                    .method("initialize", |_, _| {
                        Err(CoreError::field_validation("rejected by initialize"))
                    })?;
                Ok(())
            })
            .unwrap();

        let err = model.new(json!({"text": "hello"})).unwrap_err();
        assert_eq!(err.to_string(), "rejected by initialize");
    }

    #[test]
    fn auto_field_is_set_at_construction() {
        let before = now_millis();
        let user = users().new(json!({"name": "Zach", "created_at": "ignored"})).unwrap();
        let created = user.get("created_at").unwrap().as_integer().unwrap();
        assert!(created >= before);
    }

    #[test]
    fn pre_assigned_id() {
        let model = users();
        assert_eq!(model.new(json!({"name": "a", "__id__": 7})).unwrap().id(), Some(7));
        assert_eq!(model.new(json!({"name": "a", "__id__": "8"})).unwrap().id(), Some(8));
        assert_eq!(model.new(json!({"name": "a", "__id__": 0})).unwrap().id(), None);
        assert!(model.new(json!({"name": "a", "__id__": "x"})).is_err());
        assert!(!model.new(json!({"name": "a", "__id__": 7})).unwrap().is_saved());
    }

    #[test]
    fn set_many_back_assigns_inverse() {
        let (build, instruction) = builds();
        let b1 = build.new(json!({"status": 0})).unwrap();
        let b2 = build.new(json!({"status": 1})).unwrap();
        let ins = instruction.new(json!({"name": "Clay"})).unwrap();

        ins.set_many("builds", &[b1.clone(), b2.clone()]).unwrap();

        let listed = ins.many("builds").unwrap();
        assert_eq!(listed.len(), 2);
        let back = listed[0].one("instruction").unwrap().unwrap();
        assert!(back.ptr_eq(&ins));
        assert_eq!(back.values(), ins.values());
        assert!(b2.one("instruction").unwrap().unwrap().ptr_eq(&ins));
    }

    #[test]
    fn set_many_is_idempotent_and_detaches_dropped_items() {
        let (build, instruction) = builds();
        let b1 = build.new(json!({})).unwrap();
        let b2 = build.new(json!({})).unwrap();
        let ins = instruction.new(json!({"name": "Clay"})).unwrap();

        ins.set_many("builds", &[b1.clone(), b2.clone(), b1.clone()]).unwrap();
        ins.set_many("builds", &[b1.clone(), b2.clone()]).unwrap();
        assert_eq!(ins.many("builds").unwrap().len(), 2);

        ins.set_many("builds", &[b2.clone()]).unwrap();
        assert_eq!(ins.many("builds").unwrap().len(), 1);
        assert!(b1.one("instruction").unwrap().is_none());
        assert!(b2.one("instruction").unwrap().is_some());
    }

    #[test]
    fn set_one_appends_to_inverse_list_once() {
        let (build, instruction) = builds();
        let b1 = build.new(json!({})).unwrap();
        let ins = instruction.new(json!({"name": "Clay"})).unwrap();

        b1.set_one("instruction", &ins).unwrap();
        b1.set_one("instruction", &ins).unwrap();

        let listed = ins.many("builds").unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].ptr_eq(&b1));
    }

    #[test]
    fn moving_an_item_between_owners() {
        let (build, instruction) = builds();
        let b1 = build.new(json!({})).unwrap();
        let first = instruction.new(json!({"name": "first"})).unwrap();
        let second = instruction.new(json!({"name": "second"})).unwrap();

        b1.set_one("instruction", &first).unwrap();
        b1.set_one("instruction", &second).unwrap();
        assert!(first.many("builds").unwrap().is_empty());
        assert_eq!(second.many("builds").unwrap().len(), 1);

        first.set_many("builds", &[b1.clone()]).unwrap();
        assert!(second.many("builds").unwrap().is_empty());
        assert!(b1.one("instruction").unwrap().unwrap().ptr_eq(&first));
    }

    #[test]
    fn back_references_do_not_keep_owners_alive() {
        let (build, instruction) = builds();
        let b1 = build.new(json!({})).unwrap();
        {
            let ins = instruction.new(json!({"name": "Clay"})).unwrap();
            ins.set_many("builds", &[b1.clone()]).unwrap();
        }
        assert!(b1.one("instruction").unwrap().is_none());
    }

    #[test]
    fn relationship_from_json_string() {
        let (build, _) = builds();
        let b1 = build
            .new(json!({"instruction": "{\"name\": \"from json\"}"}))
            .unwrap();
        let ins = b1.one("instruction").unwrap().unwrap();
        assert_eq!(ins.get("name").unwrap(), Value::from("from json"));
        assert_eq!(ins.many("builds").unwrap().len(), 1);
    }

    #[test]
    fn relationship_from_bad_json_string() {
        let (build, _) = builds();
        let err = build.new(json!({"instruction": "{not json"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'{not json' is an invalid JSON, so that it can't be set in 'Build.instruction' instead it should be an object respecting the definition of the 'BuildInstruction' model"
        );
    }

    #[test]
    fn to_many_from_objects() {
        let (_, instruction) = builds();
        let ins = instruction
            .new(json!({"name": "Clay", "builds": [{"status": 1}, {"status": 2}]}))
            .unwrap();
        let listed = ins.many("builds").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].get("status").unwrap(), Value::Integer(2));
    }

    #[test]
    fn wrong_target_model_is_rejected() {
        let (build, instruction) = builds();
        let b1 = build.new(json!({})).unwrap();
        let b2 = build.new(json!({})).unwrap();
        assert!(b1.set_one("instruction", &b2).is_err());
        let ins = instruction.new(json!({})).unwrap();
        assert!(ins.set_many("builds", &[ins.clone()]).is_err());
    }

    #[test]
    fn display_and_json() {
        let (build, _) = builds();
        let b1 = build.new(json!({"status": 3, "__id__": 5})).unwrap();
        assert_eq!(b1.to_json(), json!({"__id__": 5, "status": 3}));
        assert_eq!(b1.to_string(), r#"Build({"__id__":5,"status":3})"#);
    }

    #[test]
    fn methods_are_called_with_the_entity() {
        let registry = Registry::new();
        let model = registry
            .declare("Greeter", |m| {
                m.field("name", FieldKind::String)?.method("greet", |entity, args| {
                    let name = entity.get("name")?;
                    let greeting = args.first().and_then(JsonValue::as_str).unwrap_or("Hello");
                    Ok(json!(format!("{greeting}, {name}!")))
                })?;
                Ok(())
            })
            .unwrap();

        let greeter = model.new(json!({"name": "Clay"})).unwrap();
        assert_eq!(greeter.call("greet", &[]).unwrap(), json!("Hello, Clay!"));
        assert_eq!(greeter.call("greet", &[json!("Hi")]).unwrap(), json!("Hi, Clay!"));
        assert!(matches!(
            greeter.call("shout", &[]),
            Err(CoreError::UnknownMethod { .. })
        ));
    }
}
