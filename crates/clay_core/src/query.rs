//! Pattern lookups over stored entities.
//!
//! A lookup on an indexed field only reads index bucket keys: the bucket
//! key ends with the stored value, so matching the suffix selects buckets
//! without touching primary records. Other fields fall back to scanning
//! every primary record.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::model::Model;
use crate::schema::ModelSchema;
use crate::store::StorageEngine;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

/// What a lookup matches stored values against.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// A regular expression, searched anywhere in the value.
    Regex(Regex),
    /// The whole value, compared exactly.
    Exact(String),
}

impl Pattern {
    /// Compiles a regular expression pattern.
    pub fn regex(source: &str) -> CoreResult<Self> {
        Ok(Self::Regex(Regex::new(source)?))
    }

    /// Returns `true` if `value` matches.
    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(value),
            Self::Exact(expected) => expected == value,
        }
    }
}

/// Regexes display as `/source/`, exact strings as themselves.
impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(regex) => write!(f, "/{}/", regex.as_str()),
            Self::Exact(text) => f.write_str(text),
        }
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Self::Exact(text.to_string())
    }
}

impl From<String> for Pattern {
    fn from(text: String) -> Self {
        Self::Exact(text)
    }
}

/// How a lookup reads storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Scan index bucket keys of the field.
    Indexed,
    /// Scan every primary record of the model.
    FullScan,
}

impl Strategy {
    /// Picks the strategy for `field`: indexed fields use their index.
    #[must_use]
    pub fn for_field(schema: &ModelSchema, field: &str) -> Self {
        if schema.is_indexed(field) {
            Self::Indexed
        } else {
            Self::FullScan
        }
    }
}

impl StorageEngine {
    /// Every stored entity of `model` whose `field` matches `pattern`,
    /// ordered by descending id.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoMatch`] when nothing matches.
    pub fn find_by_regex(&self, model: &Model, field: &str, pattern: &Pattern) -> CoreResult<Vec<Entity>> {
        let schema = model.schema()?;
        let strategy = Strategy::for_field(&schema, field);
        let keys = self.keys(model.name());

        let ids: BTreeSet<u64> = match strategy {
            Strategy::Indexed => {
                let prefix = keys.index_prefix(field);
                let mut ids = BTreeSet::new();
                for bucket in self.backend().keys_matching(&keys.index_pattern(field))? {
                    let Some(value) = bucket.strip_prefix(&prefix) else {
                        continue;
                    };
                    if !pattern.is_match(value) {
                        continue;
                    }
                    for member in self.backend().sorted_set_range(&bucket, 0, -1)? {
                        ids.extend(keys.parse_record_id(&member));
                    }
                }
                ids
            }
            Strategy::FullScan => {
                let mut ids = BTreeSet::new();
                for key in self.backend().keys_matching(&keys.record_pattern())? {
                    let Some(id) = keys.parse_record_id(&key) else {
                        continue;
                    };
                    let value = self.backend().hash_get_field(&key, field)?;
                    if value.is_some_and(|value| pattern.is_match(&value)) {
                        ids.insert(id);
                    }
                }
                ids
            }
        };
        tracing::trace!(model = model.name(), field, ?strategy, hits = ids.len(), "pattern lookup");

        let mut found = Vec::with_capacity(ids.len());
        for id in ids.into_iter().rev() {
            match self.find_by_id(model, id) {
                Ok(entity) => found.push(entity),
                // A bucket may outlive its record.
                Err(error) if error.is_not_found() => {}
                Err(error) => return Err(error),
            }
        }

        if found.is_empty() {
            return Err(CoreError::NoMatch {
                field: field.to_string(),
                pattern: pattern.to_string(),
            });
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;
    use crate::schema::Registry;
    use clay_storage::InMemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn strategy_follows_indexes() {
        let registry = Registry::new();
        let user = registry
            .declare("User", |m| {
                m.field("email", FieldKind::Email)?
                    .field("name", FieldKind::String)?
                    .index("email")?;
                Ok(())
            })
            .unwrap();
        let schema = user.schema().unwrap();
        assert_eq!(Strategy::for_field(&schema, "email"), Strategy::Indexed);
        assert_eq!(Strategy::for_field(&schema, "name"), Strategy::FullScan);
    }

    #[test]
    fn pattern_display() {
        assert_eq!(Pattern::regex("^z").unwrap().to_string(), "/^z/");
        assert_eq!(Pattern::from("zach").to_string(), "zach");
        assert!(matches!(Pattern::regex("("), Err(CoreError::InvalidPattern(_))));
    }

    #[test]
    fn exact_pattern_matches_whole_value() {
        let exact = Pattern::from("zach@yipit.com");
        assert!(exact.is_match("zach@yipit.com"));
        assert!(!exact.is_match("zach@yipit.com.br"));
        assert!(Pattern::regex("yipit").unwrap().is_match("zach@yipit.com"));
    }

    #[test]
    fn no_match_message() {
        let registry = Registry::new();
        let engine = StorageEngine::new(InMemoryBackend::new());
        let user = registry
            .declare("User", |m| {
                m.field("email", FieldKind::Email)?;
                Ok(())
            })
            .unwrap();
        let err = engine
            .find_by_regex(&user, "email", &Pattern::regex("^nobody").unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "could not find any \"email\" matching the regex /^nobody/");
    }

    #[test]
    fn index_scan_ignores_primary_records() {
        let registry = Registry::new();
        let engine = Arc::new(StorageEngine::new(InMemoryBackend::new()));
        let user = registry
            .declare("User", |m| {
                m.field("email", FieldKind::Email)?.index("email")?;
                Ok(())
            })
            .unwrap();
        let zach = user.new(json!({"email": "zach@yipit.com"})).unwrap();
        engine.persist_one(&zach).unwrap();

        // Rewriting the record behind the index's back is invisible to it.
        engine
            .backend()
            .hash_set_fields("clay:User:id:1", &[("email".into(), "other@host.com".into())])
            .unwrap();
        let found = engine
            .find_by_regex(&user, "email", &Pattern::regex("^zach").unwrap())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(engine
            .find_by_regex(&user, "email", &Pattern::regex("^other").unwrap())
            .is_err());
    }
}
