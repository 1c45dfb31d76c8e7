//! In-memory state backend implementation

use super::{StateBackend, StateError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// In-memory state backend
///
/// Stores all data in a sharded concurrent map local to the process. Writes
/// to one key replace the entry atomically; distinct keys live on
/// independent shards and do not contend on a global lock.
///
/// Expired entries are dropped when read. [`spawn_sweeper`](Self::spawn_sweeper)
/// additionally reclaims entries nobody reads again.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateBackend {
    store: Arc<DashMap<String, StoredValue>>,
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        Self { data, expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl MemoryStateBackend {
    /// Create a new in-memory state backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, value| !value.is_expired(now));
        before.saturating_sub(self.store.len())
    }

    /// Start a background task calling `cleanup_expired` every `interval`
    ///
    /// The task stops on its own once every handle to this backend is dropped.
    /// Intervals below one millisecond are rounded up to it.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store: Weak<DashMap<String, StoredValue>> = Arc::downgrade(&self.store);
        let interval = interval.max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let Some(store) = store.upgrade() else {
                    break;
                };

                let now = Instant::now();
                let before = store.len();
                store.retain(|_, value| !value.is_expired(now));
                let removed = before.saturating_sub(store.len());

                if removed > 0 {
                    debug!(
                        removed = removed,
                        remaining = store.len(),
                        "State sweep completed"
                    );
                }
            }

            debug!("State sweeper stopped");
        })
    }

    /// Number of stored keys (including expired ones not yet reclaimed)
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        let now = Instant::now();

        if let Some(value) = self.store.get(key) {
            if !value.is_expired(now) {
                return Ok(Some(value.data.clone()));
            }
        } else {
            return Ok(None);
        }

        // Only drop the entry if no writer replaced it in the meantime
        self.store.remove_if(key, |_, value| value.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StateError> {
        self.store
            .insert(key.to_string(), StoredValue::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        self.store.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StateError> {
        Ok(())
    }

    fn storage_name(&self) -> &'static str {
        "memory"
    }
}
