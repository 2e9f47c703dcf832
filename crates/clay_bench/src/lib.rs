//! Benchmark utilities.

#![warn(missing_docs)]

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value as JsonValue};

/// Generates a random lower-case word of `len` characters.
pub fn random_word(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Generates raw `User` input with a random, valid email.
pub fn random_user() -> JsonValue {
    json!({
        "name": random_word(12),
        "email": format!("{}@{}.com", random_word(10), random_word(8)),
        "password": random_word(16),
    })
}

/// Generates `count` raw `User` inputs.
pub fn random_users(count: usize) -> Vec<JsonValue> {
    (0..count).map(|_| random_user()).collect()
}
