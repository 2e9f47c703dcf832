//! Builder used inside a model declaration.

use super::{is_valid_name, Cardinality, ClassMethodFn, FieldDef, MethodFn, ModelSchema, Relationship};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::field::FieldKind;
use crate::model::Model;
use crate::store::StorageEngine;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Collects the declarations of one model.
///
/// Every declaring method validates its name and returns `&mut Self`, so
/// declarations chain with `?`:
///
/// ```rust
/// use clay_core::{FieldKind, Registry};
///
/// let registry = Registry::new();
/// registry.declare("User", |m| {
///     m.field("name", FieldKind::String)?
///         .field("email", FieldKind::Email)?
///         .field("password", FieldKind::hash_of(["name", "email"]))?
///         .unique("email")?
///         .required("name")?;
///     Ok(())
/// })?;
/// # Ok::<(), clay_core::CoreError>(())
/// ```
pub struct SchemaBuilder {
    schema: ModelSchema,
    declared: Vec<Relationship>,
}

impl SchemaBuilder {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            schema: ModelSchema::empty(name),
            declared: Vec::new(),
        }
    }

    pub(crate) fn from_parent(name: &str, parent: &ModelSchema) -> Self {
        Self {
            schema: ModelSchema::inherit(name, parent),
            declared: Vec::new(),
        }
    }

    /// Name of the model being declared.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// The schema as declared so far.
    #[must_use]
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    fn check(&self, kind: &'static str, name: &str) -> CoreResult<()> {
        if is_valid_name(name) {
            Ok(())
        } else {
            Err(CoreError::naming(&self.schema.name, kind, name))
        }
    }

    /// Declares a field. Redeclaring a name replaces its kind in place.
    pub fn field(&mut self, name: &str, kind: FieldKind) -> CoreResult<&mut Self> {
        self.check("a field", name)?;
        match self.schema.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.schema.fields.push(FieldDef {
                name: name.to_string(),
                kind,
            }),
        }
        Ok(self)
    }

    /// Declares an index on `name`.
    pub fn index(&mut self, name: &str) -> CoreResult<&mut Self> {
        self.check("an index", name)?;
        push_unique(&mut self.schema.indexes, name);
        Ok(self)
    }

    /// Declares `name` unique, which also indexes it.
    pub fn unique(&mut self, name: &str) -> CoreResult<&mut Self> {
        self.index(name)?;
        push_unique(&mut self.schema.unique_fields, name);
        Ok(self)
    }

    /// Declares `name` required at construction.
    pub fn required(&mut self, name: &str) -> CoreResult<&mut Self> {
        self.check("a field", name)?;
        push_unique(&mut self.schema.required_fields, name);
        Ok(self)
    }

    /// Declares a to-one relationship to `target`, whose inverse to-many
    /// property is `inverse`.
    ///
    /// A property that is already declared is left untouched.
    pub fn has_one(&mut self, property: &str, target: &str, inverse: &str) -> CoreResult<&mut Self> {
        self.relate(property, target, inverse, Cardinality::One)
    }

    /// Declares a to-many relationship to `target`, whose inverse to-one
    /// property is `inverse`.
    ///
    /// A property that is already declared is left untouched.
    pub fn has_many(&mut self, property: &str, target: &str, inverse: &str) -> CoreResult<&mut Self> {
        self.relate(property, target, inverse, Cardinality::Many)
    }

    fn relate(
        &mut self,
        property: &str,
        target: &str,
        inverse: &str,
        cardinality: Cardinality,
    ) -> CoreResult<&mut Self> {
        if self.schema.relationship(property).is_some() {
            return Ok(self);
        }
        self.check("a relationship", property)?;
        if !is_valid_name(inverse) {
            return Err(CoreError::naming(target, "a relationship", inverse));
        }

        let relationship = Relationship {
            property: property.to_string(),
            target: target.to_string(),
            inverse: inverse.to_string(),
            cardinality,
        };
        self.schema.add_relationship(relationship.clone());
        self.declared.push(relationship);
        Ok(self)
    }

    /// Declares an instance method.
    pub fn method<F>(&mut self, name: &str, method: F) -> CoreResult<&mut Self>
    where
        F: Fn(&Entity, &[JsonValue]) -> CoreResult<JsonValue> + Send + Sync + 'static,
    {
        self.check("a method", name)?;
        let method: MethodFn = Arc::new(method);
        self.schema.methods.insert(name.to_string(), method);
        Ok(self)
    }

    /// Declares a class method.
    pub fn class_method<F>(&mut self, name: &str, method: F) -> CoreResult<&mut Self>
    where
        F: Fn(&Model, &[JsonValue]) -> CoreResult<JsonValue> + Send + Sync + 'static,
    {
        self.check("a class method", name)?;
        let method: ClassMethodFn = Arc::new(method);
        self.schema.class_methods.insert(name.to_string(), method);
        Ok(self)
    }

    /// Binds the model to a storage engine instead of the registry's
    /// primary one.
    pub fn stored_with(&mut self, engine: Arc<StorageEngine>) -> &mut Self {
        self.schema.storage = Some(engine);
        self
    }

    /// Returns the schema and the relationships whose inverses still have
    /// to be registered on their targets.
    pub(crate) fn finish(self) -> (ModelSchema, Vec<Relationship>) {
        (self.schema, self.declared)
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|existing| existing == name) {
        list.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_declaration_order() {
        let mut builder = SchemaBuilder::new("User");
        builder
            .field("name", FieldKind::String)
            .unwrap()
            .field("email", FieldKind::Email)
            .unwrap()
            .field("name", FieldKind::Slug)
            .unwrap();

        let names: Vec<_> = builder.schema().fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["name", "email"]);
        assert_eq!(builder.schema().field("name").unwrap().kind, FieldKind::Slug);
    }

    #[test]
    fn unique_implies_index_without_duplicates() {
        let mut builder = SchemaBuilder::new("User");
        builder.index("email").unwrap().unique("email").unwrap().unique("email").unwrap();

        assert_eq!(builder.schema().indexes(), ["email"]);
        assert_eq!(builder.schema().unique_fields(), ["email"]);
    }

    #[test]
    fn bad_names_are_rejected_with_their_kind() {
        let mut builder = SchemaBuilder::new("User");

        let err = builder.field("e-mail", FieldKind::Email).err().unwrap();
        assert!(err.to_string().contains("specifies a field with a bad name: \"e-mail\""));

        let err = builder.index("by name").err().unwrap();
        assert!(err.to_string().contains("specifies an index with"));

        let err = builder.method("do-it", |_, _| Ok(JsonValue::Null)).err().unwrap();
        assert!(err.to_string().contains("specifies a method with"));

        let err = builder
            .class_method("make!", |_, _| Ok(JsonValue::Null))
            .err()
            .unwrap();
        assert!(err.to_string().contains("specifies a class method with"));

        let err = builder.has_many("build-list", "Build", "instruction").err().unwrap();
        assert!(err.to_string().contains("specifies a relationship with"));
    }

    #[test]
    fn relationships_are_idempotent() {
        let mut builder = SchemaBuilder::new("BuildInstruction");
        builder
            .has_many("builds", "Build", "instruction")
            .unwrap()
            .has_many("builds", "Build", "instruction")
            .unwrap();

        let (schema, declared) = builder.finish();
        assert_eq!(schema.has_many().len(), 1);
        assert_eq!(declared.len(), 1);
    }
}
