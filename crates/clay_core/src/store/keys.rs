//! Key layout of one model.
//!
//! With prefix `P` and model `M`:
//!
//! | Key | Type | Content |
//! |---|---|---|
//! | `P:M:count` | string | last reserved id |
//! | `P:M:id` | string | highest id ever written |
//! | `P:M:id:<n>` | hash | field values plus `__id__` |
//! | `P:M:indexes:<field>:<value>` | sorted set | primary keys, scored by id |
//! | `P:M:id:<n>:<property>` | sorted set | primary keys of a to-many list |
//! | `P:M:lock:persist` | string | persist lock marker |

/// Builds the keys of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    base: String,
}

impl KeySpace {
    /// Key space of `model` under `prefix`; an empty prefix is omitted.
    #[must_use]
    pub fn new(prefix: &str, model: &str) -> Self {
        let base = if prefix.is_empty() {
            model.to_string()
        } else {
            format!("{prefix}:{model}")
        };
        Self { base }
    }

    /// `P:M:count`
    #[must_use]
    pub fn count(&self) -> String {
        format!("{}:count", self.base)
    }

    /// `P:M:id`
    #[must_use]
    pub fn highest_id(&self) -> String {
        format!("{}:id", self.base)
    }

    /// `P:M:id:<id>`, the primary key.
    #[must_use]
    pub fn record(&self, id: u64) -> String {
        format!("{}:id:{id}", self.base)
    }

    /// Glob over primary keys. It also matches relation sets, so callers
    /// filter with [`KeySpace::parse_record_id`].
    #[must_use]
    pub fn record_pattern(&self) -> String {
        format!("{}:id:*", escape_glob(&self.base))
    }

    /// Extracts the id of a primary key of this model.
    #[must_use]
    pub fn parse_record_id(&self, key: &str) -> Option<u64> {
        let digits = key.strip_prefix(&self.base)?.strip_prefix(":id:")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// `P:M:indexes:<field>:<value>`
    #[must_use]
    pub fn index(&self, field: &str, value: &str) -> String {
        format!("{}{value}", self.index_prefix(field))
    }

    /// `P:M:indexes:<field>:`, the part of a bucket key before the value.
    #[must_use]
    pub fn index_prefix(&self, field: &str) -> String {
        format!("{}:indexes:{field}:", self.base)
    }

    /// Glob over every bucket of an index.
    #[must_use]
    pub fn index_pattern(&self, field: &str) -> String {
        format!("{}*", escape_glob(&self.index_prefix(field)))
    }

    /// `P:M:id:<id>:<property>`
    #[must_use]
    pub fn relation(&self, id: u64, property: &str) -> String {
        relation_of(&self.record(id), property)
    }

    /// Glob over every relation set of one record.
    #[must_use]
    pub fn relation_pattern(&self, id: u64) -> String {
        format!("{}:*", escape_glob(&self.record(id)))
    }

    /// `P:M:lock:persist`
    #[must_use]
    pub fn lock(&self) -> String {
        format!("{}:lock:persist", self.base)
    }
}

/// Relation set of the record stored at `primary_key`.
pub(crate) fn relation_of(primary_key: &str, property: &str) -> String {
    format!("{primary_key}:{property}")
}

/// Escapes glob metacharacters so `text` only matches itself.
pub(crate) fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
