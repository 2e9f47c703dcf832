//! # Clay Testkit
//!
//! Test utilities for Clay.
//!
//! This crate provides:
//! - [`Fixture`]: a registry with the sample models wired to an in-memory
//!   engine
//! - Property-based generators using proptest
//! - Concurrent persist helpers for stress tests
//!
//! ## Usage
//!
//! ```rust
//! use clay_testkit::prelude::*;
//! use serde_json::json;
//!
//! let fixture = Fixture::new();
//! let zach = fixture.user.create(json!({"name": "Zach", "email": "zach@yipit.com"})).unwrap();
//! assert_eq!(zach.id(), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test subscriber once per process, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
