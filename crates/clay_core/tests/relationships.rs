//! Integration tests for relationships, in memory and in storage.

use clay_core::{CoreError, FieldKind, Registry, Value};
use clay_storage::KeyValueBackend;
use clay_testkit::Fixture;
use serde_json::json;

#[test]
fn back_references_exist_before_persistence() {
    let fixture = Fixture::new();
    let b1 = fixture.build.new(json!({"status": 0})).unwrap();
    let b2 = fixture.build.new(json!({"status": 1})).unwrap();
    let instructions = fixture
        .instruction
        .new(json!({"name": "Clay", "repository_address": "git@github.com:gabrielfalcao/clay.git"}))
        .unwrap();

    instructions.set_many("builds", &[b1.clone(), b2.clone()]).unwrap();

    let builds = instructions.many("builds").unwrap();
    let owner = builds[0].one("instruction").unwrap().unwrap();
    assert_eq!(owner.values(), instructions.values());
    assert!(b2.one("instruction").unwrap().unwrap().ptr_eq(&instructions));
}

#[test]
fn one_batch_links_both_sides() {
    let fixture = Fixture::new();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let b1 = fixture.build.new(json!({"status": 0})).unwrap();
    let b2 = fixture.build.new(json!({"status": 1})).unwrap();
    instructions.set_many("builds", &[b1.clone(), b2.clone()]).unwrap();

    fixture
        .engine
        .persist(&[instructions.clone(), b1.clone(), b2.clone()])
        .unwrap();

    assert_eq!(
        fixture
            .backend
            .sorted_set_range("clay:BuildInstruction:id:1:builds", 0, -1)
            .unwrap(),
        ["clay:Build:id:1", "clay:Build:id:2"]
    );
    assert_eq!(
        fixture
            .backend
            .hash_get_field("clay:Build:id:2", "instruction")
            .unwrap()
            .as_deref(),
        Some("clay:BuildInstruction:id:1")
    );
}

#[test]
fn children_first_batch_gives_the_same_layout() {
    let fixture = Fixture::new();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let b1 = fixture.build.new(json!({"status": 0})).unwrap();
    let b2 = fixture.build.new(json!({"status": 1})).unwrap();
    instructions.set_many("builds", &[b1.clone(), b2.clone()]).unwrap();

    fixture
        .engine
        .persist(&[b1.clone(), b2.clone(), instructions.clone()])
        .unwrap();

    assert_eq!(
        fixture
            .backend
            .sorted_set_range("clay:BuildInstruction:id:1:builds", 0, -1)
            .unwrap(),
        ["clay:Build:id:1", "clay:Build:id:2"]
    );
}

#[test]
fn sync_hydrates_lists_from_storage() {
    let fixture = Fixture::new();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let b1 = fixture.build.new(json!({"status": 0})).unwrap();
    let b2 = fixture.build.new(json!({"status": 1})).unwrap();
    instructions.set_many("builds", &[b1.clone(), b2.clone()]).unwrap();
    fixture
        .engine
        .persist(&[instructions.clone(), b1, b2])
        .unwrap();

    let loaded = fixture.instruction.find_by_id(1).unwrap();
    assert!(loaded.many("builds").unwrap().is_empty());

    loaded.sync().unwrap();
    let builds = loaded.many("builds").unwrap();
    let statuses: Vec<Value> = builds.iter().map(|b| b.get("status").unwrap()).collect();
    assert_eq!(statuses, [Value::Integer(0), Value::Integer(1)]);
    assert!(builds[1].one("instruction").unwrap().unwrap().ptr_eq(&loaded));
}

#[test]
fn reassigning_a_list_detaches_dropped_items_in_storage() {
    let fixture = Fixture::new();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let b1 = fixture.build.new(json!({"status": 0})).unwrap();
    let b2 = fixture.build.new(json!({"status": 1})).unwrap();
    instructions.set_many("builds", &[b1.clone(), b2.clone()]).unwrap();
    fixture
        .engine
        .persist(&[b1.clone(), b2.clone(), instructions.clone()])
        .unwrap();

    instructions.set_many("builds", &[b2.clone()]).unwrap();
    instructions.save().unwrap();

    assert_eq!(
        fixture
            .backend
            .sorted_set_range("clay:BuildInstruction:id:1:builds", 0, -1)
            .unwrap(),
        ["clay:Build:id:2"]
    );
    assert!(fixture
        .backend
        .hash_get_field("clay:Build:id:1", "instruction")
        .unwrap()
        .is_none());
    assert!(b1.one("instruction").unwrap().is_none());
}

#[test]
fn moving_a_child_updates_both_owners() {
    let fixture = Fixture::new();
    let first = fixture.instruction.new(json!({"name": "first"})).unwrap();
    let second = fixture.instruction.new(json!({"name": "second"})).unwrap();
    let build = fixture.build.new(json!({"status": 0})).unwrap();
    build.set_one("instruction", &first).unwrap();
    fixture
        .engine
        .persist(&[first.clone(), second.clone(), build.clone()])
        .unwrap();

    build.set_one("instruction", &second).unwrap();
    build.save().unwrap();

    assert!(fixture
        .backend
        .sorted_set_range("clay:BuildInstruction:id:1:builds", 0, -1)
        .unwrap()
        .is_empty());
    assert_eq!(
        fixture
            .backend
            .sorted_set_range("clay:BuildInstruction:id:2:builds", 0, -1)
            .unwrap(),
        ["clay:Build:id:1"]
    );
}

#[test]
fn unsaved_targets_are_skipped() {
    let fixture = Fixture::new();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let build = fixture.build.new(json!({"status": 0})).unwrap();
    build.set_one("instruction", &instructions).unwrap();

    build.save().unwrap();
    assert!(fixture
        .backend
        .hash_get_field("clay:Build:id:1", "instruction")
        .unwrap()
        .is_none());

    instructions.save().unwrap();
    build.save().unwrap();
    assert_eq!(
        fixture
            .backend
            .hash_get_field("clay:Build:id:1", "instruction")
            .unwrap()
            .as_deref(),
        Some("clay:BuildInstruction:id:1")
    );
}

#[test]
fn erasing_an_owner_clears_child_back_references() {
    let fixture = Fixture::new();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let build = fixture.build.new(json!({"status": 0})).unwrap();
    instructions.set_many("builds", &[build.clone()]).unwrap();
    fixture
        .engine
        .persist(&[instructions.clone(), build.clone()])
        .unwrap();

    instructions.erase().unwrap();

    assert!(fixture
        .backend
        .hash_get_field("clay:Build:id:1", "instruction")
        .unwrap()
        .is_none());
    assert!(fixture
        .backend
        .keys()
        .iter()
        .all(|key| !key.starts_with("clay:BuildInstruction:id:1")));
}

#[test]
fn erasing_a_child_leaves_the_owner_list() {
    let fixture = Fixture::new();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let build = fixture.build.new(json!({"status": 0})).unwrap();
    build.set_one("instruction", &instructions).unwrap();
    fixture
        .engine
        .persist(&[instructions.clone(), build.clone()])
        .unwrap();

    build.erase().unwrap();
    assert!(fixture
        .backend
        .sorted_set_range("clay:BuildInstruction:id:1:builds", 0, -1)
        .unwrap()
        .is_empty());
}

#[test]
fn relationship_from_json_text() {
    let fixture = Fixture::new();
    let build = fixture
        .build
        .new(json!({"status": 0, "instruction": r#"{"name": "nightly", "branch": "main"}"#}))
        .unwrap();
    let instructions = build.one("instruction").unwrap().unwrap();
    assert_eq!(instructions.get("branch").unwrap(), "main");
}

#[test]
fn invalid_json_relationship() {
    let fixture = Fixture::new();
    let err = fixture
        .build
        .new(json!({"instruction": "definitely not json"}))
        .unwrap_err();
    assert!(matches!(err, CoreError::RelationshipDecode { .. }));
    assert_eq!(
        err.to_string(),
        "'definitely not json' is an invalid JSON, so that it can't be set in 'Build.instruction' instead it should be an object respecting the definition of the 'BuildInstruction' model"
    );
}

#[test]
fn naming_errors_name_the_model_and_kind() {
    let registry = Registry::new();
    let err = registry
        .declare("Person", |m| {
            m.field("first name", FieldKind::String)?;
            Ok(())
        })
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "The declaration of the model \"Person\" specifies a field with a bad name: \"first name\". In those cases use just numbers, letters and underscore"
    );
    assert!(!registry.contains("Person"));
}

#[test]
fn subclass_has_its_own_key_space() {
    let fixture = Fixture::new();
    let nightly = fixture
        .build
        .subclass("NightlyBuild", |m| {
            m.field("schedule", FieldKind::String)?;
            Ok(())
        })
        .unwrap();

    let run = nightly
        .create(json!({"status": 0, "schedule": "0 3 * * *"}))
        .unwrap();
    assert_eq!(run.id(), Some(1));
    assert!(fixture
        .backend
        .hash_get_all("clay:NightlyBuild:id:1")
        .unwrap()
        .contains_key("schedule"));
    assert!(fixture.build.all().unwrap().is_empty());
    assert!(nightly.schema().unwrap().is_indexed("status"));
    assert!(fixture.build.schema().unwrap().field("schedule").is_none());
}

#[test]
fn subclass_members_survive_a_sync() {
    let fixture = Fixture::new();
    let nightly = fixture
        .build
        .subclass("NightlyBuild", |m| {
            m.field("schedule", FieldKind::String)?;
            Ok(())
        })
        .unwrap();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let plain = fixture.build.new(json!({"status": 0})).unwrap();
    let run = nightly
        .new(json!({"status": 1, "schedule": "0 3 * * *"}))
        .unwrap();

    run.set_one("instruction", &instructions).unwrap();
    instructions
        .set_many("builds", &[plain.clone(), run.clone()])
        .unwrap();
    assert_eq!(instructions.many("builds").unwrap().len(), 2);
    fixture
        .engine
        .persist(&[instructions.clone(), plain, run])
        .unwrap();

    assert_eq!(
        fixture
            .backend
            .sorted_set_range("clay:BuildInstruction:id:1:builds", 0, -1)
            .unwrap(),
        ["clay:Build:id:1", "clay:NightlyBuild:id:1"]
    );

    let loaded = fixture.instruction.find_by_id(1).unwrap();
    loaded.sync().unwrap();
    let builds = loaded.many("builds").unwrap();
    let models: Vec<&str> = builds.iter().map(|b| b.model().name()).collect();
    assert_eq!(models, ["Build", "NightlyBuild"]);
    assert_eq!(builds[1].get("schedule").unwrap(), "0 3 * * *");
    assert!(builds[1].one("instruction").unwrap().unwrap().ptr_eq(&loaded));
}

#[test]
fn unrelated_models_are_rejected_as_targets() {
    let fixture = Fixture::new();
    let instructions = fixture.instruction.new(json!({"name": "Clay"})).unwrap();
    let user = fixture.user.new(json!({"name": "Zach"})).unwrap();
    let err = instructions.set_many("builds", &[user]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "'BuildInstruction.builds' expects a Build, got a User"
    );
}
