//! EAP authentication state
//!
//! RADIUS is stateless per packet, but an EAP exchange spans several
//! Access-Request / Access-Challenge rounds. This module keeps the
//! in-progress state of each device between rounds.
//!
//! # Architecture
//!
//! - **StateBackend**: byte-oriented key/value storage with TTLs
//! - **MemoryStateBackend**: sharded in-process backend (DashMap)
//! - **AuthStateStore**: typed get/set/reset of [`AuthState`] containers
//!   keyed by [`SessionKey`](crate::session::SessionKey), instrumented
//!   through a [`CounterSink`](crate::counters::CounterSink)
//!
//! # Usage
//!
//! ```rust
//! use radius_proxy::counters::NoopCounters;
//! use radius_proxy::state::{AuthState, AuthStateStore, MemoryStateBackend, StateLookup};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main] async fn main() {
//! let backend = Arc::new(MemoryStateBackend::new());
//! let store = AuthStateStore::new(backend, Duration::from_secs(10), Arc::new(NoopCounters));
//!
//! store.set("eap__dev__ap", &AuthState::default()).await.unwrap();
//! assert!(matches!(store.get("eap__dev__ap").await.unwrap(), StateLookup::Found(_)));
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod store;

pub use error::StateError;
pub use memory::MemoryStateBackend;
pub use store::{AuthState, AuthStateStore, StateLookup};

use async_trait::async_trait;
use std::time::Duration;

/// Storage backend for serialized state
///
/// Implementations must be thread-safe; concurrent writers to one key are
/// last-writer-wins and writers to distinct keys never block each other.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Get a value by key
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError>;

    /// Replace the value with an optional TTL (`None` never expires)
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StateError>;

    /// Delete a key
    ///
    /// Returns `Ok(())` regardless of whether the key existed.
    async fn delete(&self, key: &str) -> Result<(), StateError>;

    /// Health check
    async fn ping(&self) -> Result<(), StateError>;

    /// Backend name used to tag instrumented operations
    fn storage_name(&self) -> &'static str;
}
