//! Error types for Clay core.

use clay_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while declaring models, building entities or
/// talking to the storage engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A model declaration used a name outside `[A-Za-z0-9_]+`.
    #[error("The declaration of the model \"{model}\" specifies {kind} with a bad name: \"{name}\". In those cases use just numbers, letters and underscore")]
    Naming {
        /// The model being declared.
        model: String,
        /// What was being named, e.g. `a field` or `an index`.
        kind: &'static str,
        /// The rejected name.
        name: String,
    },

    /// A field codec rejected a value, or a required field is missing.
    #[error("{message}")]
    FieldValidation {
        /// Human-readable description.
        message: String,
    },

    /// A unique field collided with another stored entity.
    #[error("the field {model}.{field} is unique, and got an attempt to save a duplicate \"{value}\"")]
    Uniqueness {
        /// The model name.
        model: String,
        /// The unique field.
        field: String,
        /// The duplicated stored value.
        value: String,
    },

    /// No primary record exists for the id.
    #[error("could not find a {model} with the id {id}")]
    EntityNotFound {
        /// The model name.
        model: String,
        /// The id that was looked up.
        id: u64,
    },

    /// A pattern lookup found nothing.
    #[error("could not find any \"{field}\" matching the regex {pattern}")]
    NoMatch {
        /// The field that was searched.
        field: String,
        /// The pattern, as displayed by [`crate::Pattern`].
        pattern: String,
    },

    /// A relationship was given a string that is not a JSON object.
    #[error("'{raw}' is an invalid JSON, so that it can't be set in '{model}.{property}' instead it should be an object respecting the definition of the '{target}' model")]
    RelationshipDecode {
        /// The offending input.
        raw: String,
        /// The owning model.
        model: String,
        /// The relationship property.
        property: String,
        /// The related model.
        target: String,
    },

    /// The advisory persist lock could not be acquired in time.
    #[error("could not acquire the lock {key} after {attempts} attempts")]
    LockTimeout {
        /// The lock key.
        key: String,
        /// How many times acquisition was attempted.
        attempts: u32,
    },

    /// A model name is not declared in the registry.
    #[error("the model \"{name}\" was not declared")]
    UnknownModel {
        /// The missing model name.
        name: String,
    },

    /// A field or relationship name is not declared on the model.
    #[error("the model \"{model}\" has no field \"{field}\"")]
    UnknownField {
        /// The model name.
        model: String,
        /// The undeclared name.
        field: String,
    },

    /// A method or class method is not declared on the model.
    #[error("the model \"{model}\" has no method \"{method}\"")]
    UnknownMethod {
        /// The model name.
        model: String,
        /// The undeclared method name.
        method: String,
    },

    /// Neither the model nor the registry has a storage engine.
    #[error("the model \"{model}\" is not stored anywhere: bind a storage or set a primary one")]
    NoStorage {
        /// The model name.
        model: String,
    },

    /// The operation needs an entity that has an id.
    #[error("this {model} has no id yet, save it first")]
    Unsaved {
        /// The model name.
        model: String,
    },

    /// A stored record could not be interpreted.
    #[error("corrupt record at {key}: {message}")]
    CorruptRecord {
        /// The backend key.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// A regular expression failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// JSON input could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend or transport error, passed through unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoreError {
    /// Creates a naming error.
    pub fn naming(model: impl Into<String>, kind: &'static str, name: impl Into<String>) -> Self {
        Self::Naming {
            model: model.into(),
            kind,
            name: name.into(),
        }
    }

    /// Creates a field validation error.
    pub fn field_validation(message: impl Into<String>) -> Self {
        Self::FieldValidation {
            message: message.into(),
        }
    }

    /// Creates the error raised when a required field is missing.
    pub fn required(field: &str) -> Self {
        Self::field_validation(format!("the \"{field}\" field is required"))
    }

    /// Creates an unknown field error.
    pub fn unknown_field(model: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            model: model.into(),
            field: field.into(),
        }
    }

    /// Creates an unsaved entity error.
    pub fn unsaved(model: impl Into<String>) -> Self {
        Self::Unsaved {
            model: model.into(),
        }
    }

    /// Creates a corrupt record error.
    pub fn corrupt_record(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for lookups that found nothing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound { .. } | Self::NoMatch { .. })
    }
}
