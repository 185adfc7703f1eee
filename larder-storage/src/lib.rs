//! Larder Storage - Key-Value Store Abstraction
//!
//! The pipeline talks to exactly one shared store through the
//! [`KeyValueStore`] trait. Two backends implement it:
//!
//! - [`RedisStore`]: the production backend (feature `redis`, on by default)
//! - [`InMemoryStore`]: identical semantics in process, used by tests and
//!   local development
//!
//! Components receive the store as an explicit [`SharedStore`] handle; there
//! is no ambient connection.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod traits;

pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use traits::{KeyExpiry, KeyValueStore, SharedStore};

pub use larder_core::{StoreError, StoreResult};
