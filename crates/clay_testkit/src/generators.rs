//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::{json, Value as JsonValue};

/// Strategy for names accepted by the declaration builders.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z_][A-Za-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for addresses accepted by the email codec.
pub fn email_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9_]{1,12}@[a-z0-9]{1,10}\\.[a-z]{2,4}").expect("Invalid regex")
}

/// Strategy for person names with inner spaces and no surrounding blanks.
pub fn person_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{1,8}( [A-Z][a-z]{1,8}){0,2}").expect("Invalid regex")
}

/// Strategy for raw `User` input.
pub fn user_json_strategy() -> impl Strategy<Value = JsonValue> {
    (person_name_strategy(), email_strategy(), "[ -~]{1,20}").prop_map(|(name, email, password)| {
        json!({"name": name, "email": email, "password": password})
    })
}
