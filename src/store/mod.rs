//! Shared key-value state.
//!
//! # Responsibilities
//! - Define the `KvStore` abstraction used by nonce, cursor, dedup and
//!   idempotency state
//! - Provide a Redis-backed implementation for multi-instance deployments
//! - Provide an in-process implementation for tests and single-node runs
//!
//! # Design Decisions
//! - String values only; callers own their encoding
//! - TTLs are optional per write, matching the uneven expiry needs of the
//!   callers (locks expire in seconds, dedup markers in days, cursors never)
//! - `set_nx` is atomic so it can double as a lock primitive

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Errors that can occur against the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the request.
    #[error("store error: {0}")]
    Backend(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Minimal key-value contract shared by all persistent state in the service.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. `None` means the key does not exist (or has expired).
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a key, overwriting any existing value. A `ttl` of `None` keeps
    /// the key until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Write a key only if it does not already exist. Returns `true` when
    /// this call created the key. Atomic; usable as a lock acquire.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}
