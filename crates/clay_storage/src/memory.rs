//! In-memory key-value backend for testing.

use crate::backend::{HashFields, KeyValueBackend};
use crate::error::{StorageError, StorageResult};
use crate::glob::glob_match;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// A value held under one key.
#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Text(String),
    Hash(HashFields),
    /// Member to score.
    SortedSet(HashMap<String, i64>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Hash(_) => "hash",
            Self::SortedSet(_) => "zset",
        }
    }
}

/// An in-memory key-value backend.
///
/// This backend keeps every key in a single ordered map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need a server
///
/// It follows Redis semantics for the operations Clay uses: empty hashes and
/// sorted sets disappear, type mismatches fail with
/// [`StorageError::WrongType`], and `increment` parses the stored string.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads. Each
/// operation holds the map lock for its whole duration, so `increment` and
/// `set_if_absent` are atomic.
///
/// # Example
///
/// ```rust
/// use clay_storage::{InMemoryBackend, KeyValueBackend};
///
/// let backend = InMemoryBackend::new();
/// assert!(backend.set_if_absent("clay:User:lock:persist", "now").unwrap());
/// assert!(!backend.set_if_absent("clay:User:lock:persist", "later").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns all keys, sorted.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn expect_text<'a>(key: &str, entry: &'a Entry) -> StorageResult<&'a String> {
    match entry {
        Entry::Text(value) => Ok(value),
        other => {
            tracing::trace!(key, kind = other.kind(), "expected a string");
            Err(StorageError::wrong_type(key))
        }
    }
}

/// Resolves Redis-style inclusive ranks against a collection of `len` items.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

impl KeyValueBackend for InMemoryBackend {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) => expect_text(key, entry).map(|value| Some(value.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), Entry::Text(value.to_string()));
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str) -> StorageResult<bool> {
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::Text(value.to_string()));
        Ok(true)
    }

    fn delete(&self, keys: &[String]) -> StorageResult<usize> {
        let mut entries = self.entries.write();
        Ok(keys.iter().filter(|key| entries.remove(*key).is_some()).count())
    }

    fn increment(&self, key: &str) -> StorageResult<i64> {
        let mut entries = self.entries.write();
        let current = match entries.get(key) {
            Some(entry) => expect_text(key, entry)?
                .parse::<i64>()
                .map_err(|_| StorageError::NotAnInteger {
                    key: key.to_string(),
                })?,
            None => 0,
        };
        let next = current.checked_add(1).ok_or_else(|| StorageError::NotAnInteger {
            key: key.to_string(),
        })?;
        entries.insert(key.to_string(), Entry::Text(next.to_string()));
        Ok(next)
    }

    fn hash_set_fields(&self, key: &str, fields: &[(String, String)]) -> StorageResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.write();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashFields::new()));
        match entry {
            Entry::Hash(hash) => {
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(StorageError::wrong_type(key)),
        }
    }

    fn hash_get_all(&self, key: &str) -> StorageResult<HashFields> {
        match self.entries.read().get(key) {
            Some(Entry::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(StorageError::wrong_type(key)),
            None => Ok(HashFields::new()),
        }
    }

    fn hash_get_field(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        match self.entries.read().get(key) {
            Some(Entry::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(StorageError::wrong_type(key)),
            None => Ok(None),
        }
    }

    fn hash_delete_fields(&self, key: &str, fields: &[String]) -> StorageResult<usize> {
        let mut entries = self.entries.write();
        let (removed, now_empty) = match entries.get_mut(key) {
            Some(Entry::Hash(hash)) => {
                let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
                (removed, hash.is_empty())
            }
            Some(_) => return Err(StorageError::wrong_type(key)),
            None => return Ok(0),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    fn sorted_set_add(&self, key: &str, score: i64, member: &str) -> StorageResult<bool> {
        let mut entries = self.entries.write();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::SortedSet(HashMap::new()));
        match entry {
            Entry::SortedSet(set) => Ok(set.insert(member.to_string(), score).is_none()),
            _ => Err(StorageError::wrong_type(key)),
        }
    }

    fn sorted_set_range(&self, key: &str, start: i64, stop: i64) -> StorageResult<Vec<String>> {
        let entries = self.entries.read();
        let set = match entries.get(key) {
            Some(Entry::SortedSet(set)) => set,
            Some(_) => return Err(StorageError::wrong_type(key)),
            None => return Ok(Vec::new()),
        };

        let mut members: Vec<(&i64, &String)> = set.iter().map(|(m, s)| (s, m)).collect();
        members.sort();

        Ok(match resolve_range(members.len(), start, stop) {
            Some((from, to)) => members[from..=to]
                .iter()
                .map(|(_, member)| (*member).clone())
                .collect(),
            None => Vec::new(),
        })
    }

    fn sorted_set_remove(&self, key: &str, member: &str) -> StorageResult<bool> {
        let mut entries = self.entries.write();
        let (removed, now_empty) = match entries.get_mut(key) {
            Some(Entry::SortedSet(set)) => {
                let removed = set.remove(member).is_some();
                (removed, set.is_empty())
            }
            Some(_) => return Err(StorageError::wrong_type(key)),
            None => return Ok(false),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    fn keys_matching(&self, pattern: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }
}
