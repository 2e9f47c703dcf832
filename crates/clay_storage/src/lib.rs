//! # Clay Storage
//!
//! Key-value backend protocol and implementations for Clay.
//!
//! This crate provides the lowest-level storage abstraction for Clay.
//! Backends are **dumb key-value servers** - they know strings, hashes and
//! sorted sets, and nothing about models, indexes or relationships.
//!
//! ## Design Principles
//!
//! - Every operation is one request/response exchange
//! - No cursor or session state kept between calls
//! - Must be `Send + Sync` so one handle can be shared by many callers
//! - Clay owns all key layout and record interpretation
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`RedisBackend`] - A Redis server spoken to over RESP2
//!
//! ## Example
//!
//! ```rust
//! use clay_storage::{InMemoryBackend, KeyValueBackend};
//!
//! let backend = InMemoryBackend::new();
//! assert_eq!(backend.increment("clay:User:count").unwrap(), 1);
//! backend
//!     .hash_set_fields("clay:User:id:1", &[("name".into(), "Zach".into())])
//!     .unwrap();
//! let fields = backend.hash_get_all("clay:User:id:1").unwrap();
//! assert_eq!(fields["name"], "Zach");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod glob;
mod memory;
mod redis;
pub mod resp;

pub use backend::{HashFields, KeyValueBackend};
pub use error::{StorageError, StorageResult};
pub use glob::glob_match;
pub use memory::InMemoryBackend;
pub use redis::{RedisBackend, RedisConfig};
