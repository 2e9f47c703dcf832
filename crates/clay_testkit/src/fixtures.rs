//! Sample models and engine helpers.
//!
//! The models mirror a small CI server:
//!
//! - `User { name, email (unique), password: hash-of(name, email), created_at }`
//! - `BuildInstruction { name, repository_address, branch }` with
//!   `builds: has_many(Build, instruction)`
//! - `Build { status, stdout, stderr, date }` with `status` indexed

use clay_core::{FieldKind, Model, Registry, StorageConfig, StorageEngine};
use clay_storage::InMemoryBackend;
use std::sync::Arc;
use std::time::Duration;

/// A fresh registry with the sample models over an in-memory backend.
pub struct Fixture {
    /// The registry the models are declared in.
    pub registry: Registry,
    /// The primary engine of the registry.
    pub engine: Arc<StorageEngine>,
    /// The backend, for inspecting raw keys.
    pub backend: Arc<InMemoryBackend>,
    /// `User`
    pub user: Model,
    /// `Build`
    pub build: Model,
    /// `BuildInstruction`
    pub instruction: Model,
}

impl Fixture {
    /// Creates a fixture with the default engine configuration.
    pub fn new() -> Self {
        Self::with_config(StorageConfig::default())
    }

    /// Creates a fixture with an explicit engine configuration.
    pub fn with_config(config: StorageConfig) -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let engine = Arc::new(StorageEngine::from_arc(backend.clone(), config));
        let registry = Registry::new();
        registry.set_primary_storage(Arc::clone(&engine));

        let user = declare_user(&registry);
        let build = declare_build(&registry);
        let instruction = declare_build_instruction(&registry);

        Self {
            registry,
            engine,
            backend,
            user,
            build,
            instruction,
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Default configuration with a lock that gives up after about 50ms.
pub fn quick_config() -> StorageConfig {
    StorageConfig::new()
        .lock_max_attempts(50)
        .lock_poll_interval(Duration::from_millis(1))
}

/// Declares `User` in `registry`.
pub fn declare_user(registry: &Registry) -> Model {
    registry
        .declare("User", |m| {
            m.field("name", FieldKind::String)?
                .field("email", FieldKind::Email)?
                .field("password", FieldKind::hash_of(["name", "email"]))?
                .field("created_at", FieldKind::Auto)?
                .unique("email")?
                .required("name")?;
            Ok(())
        })
        .expect("User declaration is valid")
}

/// Declares `Build` in `registry`.
pub fn declare_build(registry: &Registry) -> Model {
    registry
        .declare("Build", |m| {
            m.field("status", FieldKind::Numeric)?
                .field("stdout", FieldKind::String)?
                .field("stderr", FieldKind::String)?
                .field("date", FieldKind::Datetime)?
                .index("status")?;
            Ok(())
        })
        .expect("Build declaration is valid")
}

/// Declares `BuildInstruction` in `registry`; `Build` must exist.
pub fn declare_build_instruction(registry: &Registry) -> Model {
    registry
        .declare("BuildInstruction", |m| {
            m.field("name", FieldKind::String)?
                .field("repository_address", FieldKind::String)?
                .field("branch", FieldKind::String)?
                .has_many("builds", "Build", "instruction")?;
            Ok(())
        })
        .expect("BuildInstruction declaration is valid")
}
