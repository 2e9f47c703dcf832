//! Key-value backend trait definition.

use crate::error::StorageResult;
use std::collections::BTreeMap;

/// Field map of a hash key, ordered by field name.
pub type HashFields = BTreeMap<String, String>;

/// A remote (or remote-like) key-value backend for Clay.
///
/// Backends are **opaque key-value servers**. They expose plain strings,
/// hashes and integer-scored sorted sets. Clay owns the key layout: primary
/// records, index buckets, relationship sets and lock markers are all just
/// keys to the backend.
///
/// # Invariants
///
/// - Every call is a discrete request/response exchange
/// - `increment` and `set_if_absent` are atomic with respect to other callers
/// - `sorted_set_range` returns members ordered by score, then by member
/// - Operations on a key holding another type fail with
///   [`crate::StorageError::WrongType`]
/// - Backends must be `Send + Sync` so one handle can serve concurrent callers
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::RedisBackend`] - For a Redis server
pub trait KeyValueBackend: Send + Sync {
    /// Returns the string stored at `key`, if any.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` at `key`, replacing whatever was there.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Stores `value` at `key` only if the key does not exist.
    ///
    /// Returns `true` if the value was written.
    fn set_if_absent(&self, key: &str, value: &str) -> StorageResult<bool>;

    /// Deletes the given keys, returning how many existed.
    ///
    /// Missing keys are not an error.
    fn delete(&self, keys: &[String]) -> StorageResult<usize>;

    /// Atomically increments the integer at `key` and returns the new value.
    ///
    /// A missing key counts as zero.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotAnInteger`] if the stored string
    /// does not parse as an integer.
    fn increment(&self, key: &str) -> StorageResult<i64>;

    /// Sets the given fields of the hash at `key`, creating it if needed.
    fn hash_set_fields(&self, key: &str, fields: &[(String, String)]) -> StorageResult<()>;

    /// Returns every field of the hash at `key`.
    ///
    /// A missing key yields an empty map.
    fn hash_get_all(&self, key: &str) -> StorageResult<HashFields>;

    /// Returns one field of the hash at `key`.
    fn hash_get_field(&self, key: &str, field: &str) -> StorageResult<Option<String>>;

    /// Removes fields from the hash at `key`, returning how many existed.
    fn hash_delete_fields(&self, key: &str, fields: &[String]) -> StorageResult<usize>;

    /// Adds `member` with `score` to the sorted set at `key`.
    ///
    /// Returns `true` if the member is new (an existing member only has its
    /// score updated).
    fn sorted_set_add(&self, key: &str, score: i64, member: &str) -> StorageResult<bool>;

    /// Returns members between the `start` and `stop` ranks, inclusive.
    ///
    /// Negative ranks count from the end, so `(0, -1)` is the whole set.
    fn sorted_set_range(&self, key: &str, start: i64, stop: i64) -> StorageResult<Vec<String>>;

    /// Removes `member` from the sorted set at `key`.
    ///
    /// Returns `true` if the member was present.
    fn sorted_set_remove(&self, key: &str, member: &str) -> StorageResult<bool>;

    /// Lists keys matching a Redis-style glob pattern.
    fn keys_matching(&self, pattern: &str) -> StorageResult<Vec<String>>;
}
