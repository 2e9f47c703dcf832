//! Field kinds and their codecs.
//!
//! A codec turns a raw JSON input into the [`Value`] an entity stores. Codecs
//! are pure: the only outside state one may read is the current values of
//! sibling fields, which [`FieldKind::HashOf`] digests.
//!
//! # Stored forms
//!
//! | Kind | Accepts | Stores |
//! |---|---|---|
//! | `String` | anything | trimmed text |
//! | `Alphanumeric` | `^\w+$` | text |
//! | `Numeric` | `^\d+$` | integer |
//! | `Email` | `^\w+@\w+\.\w{2,}$` | text |
//! | `Slug` | anything | slugified text |
//! | `Auto` | ignored | current Unix milliseconds |
//! | `Datetime` | dates, date-times, RFC 2822, JS `Date` strings, milliseconds | timestamp |
//! | `HashOf` | anything | SHA-1 hex digest |

mod datetime;
mod slug;
mod value;

pub use value::Value;

use crate::error::{CoreError, CoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

pub(crate) use datetime::now_millis;

/// Separator placed between the parts of a [`FieldKind::HashOf`] digest input.
pub const HASH_SEPARATOR: &str = "sha1-clay";

static ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Za-z0-9_]+$"));
static NUMERIC: Lazy<Regex> = Lazy::new(|| compile(r"^[0-9]+$"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| compile(r"^[A-Za-z0-9_]+@[A-Za-z0-9_]+\.[A-Za-z0-9_]{2,}$"));

#[allow(clippy::unwrap_used)]
fn compile(pattern: &str) -> Regex {
    // Patterns are literals above.
    Regex::new(pattern).unwrap()
}

/// The declared kind of a model field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Any value, coerced to trimmed text.
    String,
    /// ASCII letters, digits and underscore only.
    Alphanumeric,
    /// Non-negative integers.
    Numeric,
    /// A simple `user@host.tld` address.
    Email,
    /// Lower-case hyphenated text with diacritics folded.
    Slug,
    /// Set to the construction time; raw input is ignored.
    Auto,
    /// A point in time.
    Datetime,
    /// SHA-1 digest over the named sibling fields plus the raw input.
    HashOf(Vec<String>),
}

impl FieldKind {
    /// Creates a [`FieldKind::HashOf`] over the given sibling fields.
    pub fn hash_of<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::HashOf(fields.into_iter().map(Into::into).collect())
    }

    /// Returns `true` for [`FieldKind::HashOf`].
    #[must_use]
    pub fn is_derived(&self) -> bool {
        matches!(self, Self::HashOf(_))
    }

    /// Returns the sibling fields a derived kind reads.
    #[must_use]
    pub fn constituents(&self) -> &[String] {
        match self {
            Self::HashOf(fields) => fields,
            _ => &[],
        }
    }

    /// Validates and converts a raw input.
    ///
    /// `siblings` are the entity's current values; only
    /// [`FieldKind::HashOf`] reads them. A null input yields
    /// [`Value::Null`] for every kind except [`FieldKind::Auto`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FieldValidation`] when the input does not fit
    /// the kind, e.g. `"abc" is not a valid number`.
    pub fn encode(&self, raw: &JsonValue, siblings: &BTreeMap<String, Value>) -> CoreResult<Value> {
        if let Self::Auto = self {
            return Ok(Value::Integer(now_millis()));
        }
        let Some(text) = raw_text(raw) else {
            return Ok(Value::Null);
        };

        match self {
            Self::String => Ok(Value::Text(text.trim().to_string())),
            Self::Alphanumeric => matching(&ALPHANUMERIC, text, "alphanumeric").map(Value::Text),
            Self::Numeric => matching(&NUMERIC, text, "number").and_then(|digits| {
                digits
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| invalid(&digits, "number"))
            }),
            Self::Email => matching(&EMAIL, text, "email").map(Value::Text),
            Self::Slug => Ok(Value::Text(slug::slugify(&text))),
            Self::Datetime => {
                let parsed = match raw {
                    JsonValue::Number(n) => n.as_i64().and_then(datetime::from_millis),
                    _ => datetime::parse(&text),
                };
                parsed
                    .map(Value::Timestamp)
                    .ok_or_else(|| invalid(&text, "datetime"))
            }
            Self::HashOf(fields) => Ok(Value::Text(digest(fields, siblings, &text))),
            Self::Auto => Ok(Value::Integer(now_millis())),
        }
    }

    /// Reads a value back from its stored text, without validation.
    ///
    /// Stored data was validated when it was written, so this only restores
    /// the in-memory type. Text that no longer parses is kept as text.
    #[must_use]
    pub fn decode(&self, stored: &str) -> Value {
        match self {
            Self::Numeric | Self::Auto => stored
                .parse::<i64>()
                .map_or_else(|_| Value::Text(stored.to_string()), Value::Integer),
            Self::Datetime => {
                datetime::parse(stored).map_or_else(|| Value::Text(stored.to_string()), Value::Timestamp)
            }
            _ => Value::Text(stored.to_string()),
        }
    }
}

/// Coerces a raw JSON input to text; null has no text.
fn raw_text(raw: &JsonValue) -> Option<String> {
    match raw {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn matching(regex: &Regex, text: String, what: &str) -> CoreResult<String> {
    if regex.is_match(&text) {
        Ok(text)
    } else {
        Err(invalid(&text, what))
    }
}

fn invalid(text: &str, what: &str) -> CoreError {
    CoreError::field_validation(format!("\"{text}\" is not a valid {what}"))
}

/// SHA-1 hex digest of `v1|sep|v2|sep|...|raw`.
fn digest(fields: &[String], siblings: &BTreeMap<String, Value>, raw: &str) -> String {
    let mut parts: Vec<String> = fields
        .iter()
        .map(|field| siblings.get(field).map(Value::to_string).unwrap_or_default())
        .collect();
    parts.push(raw.to_string());

    let mut hasher = Sha1::new();
    hasher.update(parts.join(&format!("|{HASH_SEPARATOR}|")).as_bytes());
    format!("{:x}", hasher.finalize())
}
