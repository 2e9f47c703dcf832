//! Property tests over generated input.

use clay_core::Value;
use clay_testkit::{email_strategy, user_json_strategy, Fixture};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stored_users_load_back_unchanged(raw in user_json_strategy()) {
        let fixture = Fixture::new();
        let user = fixture.user.new(raw).unwrap();
        let (id, _) = user.save().unwrap();

        let loaded = fixture.user.find_by_id(id).unwrap();
        prop_assert_eq!(loaded.values(), user.values());
        prop_assert_eq!(loaded.to_json(), user.to_json());
    }

    #[test]
    fn password_is_a_sha1_hex_digest(raw in user_json_strategy()) {
        let fixture = Fixture::new();
        let user = fixture.user.new(raw).unwrap();
        let password = user.get("password").unwrap();
        let digest = password.as_text().unwrap();
        prop_assert_eq!(digest.len(), 40);
        prop_assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_emails_are_accepted(email in email_strategy()) {
        let fixture = Fixture::new();
        let user = fixture.user.new(json!({"name": "someone", "email": email.clone()})).unwrap();
        prop_assert_eq!(user.get("email").unwrap(), Value::Text(email));
    }
}
