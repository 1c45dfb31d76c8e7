//! Typed EAP state store

use super::{StateBackend, StateError};
use crate::counters::{CounterSink, Operation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const OP_GET: &str = "eap_state_get";
const OP_SET: &str = "eap_state_set";
const OP_RESET: &str = "eap_state_reset";

const REASON_NOT_FOUND: &str = "not_found";
const REASON_DESERIALIZE_FAILED: &str = "deserialize_failed";
const REASON_SERIALIZE_FAILED: &str = "serialize_failed";
const REASON_BACKEND_ERROR: &str = "backend_error";

/// In-progress EAP exchange of one device
///
/// Created by the first `set` for a session key, replaced by each later
/// `set`, and gone after `reset` or once the entry outlives its TTL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    /// Negotiated EAP method, once a typed Request/Response was seen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eap_type: Option<u8>,
    /// Identifier of the last EAP packet seen in this exchange
    #[serde(default)]
    pub last_identifier: Option<u8>,
    /// Number of Access-Request rounds seen so far
    #[serde(default)]
    pub rounds: u32,
    /// Method specific state carried between rounds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub method_state: Vec<u8>,
}

/// Outcome of a state lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLookup {
    Found(AuthState),
    NotFound,
    /// An entry exists but does not decode as an [`AuthState`]
    Invalid,
}

/// EAP authentication state keyed by session key
///
/// `get` returns a copy; changes become visible to other requests only
/// through an explicit `set`.
pub struct AuthStateStore {
    backend: Arc<dyn StateBackend>,
    ttl: Duration,
    counters: Arc<dyn CounterSink>,
}

impl AuthStateStore {
    /// Create a store whose entries expire `ttl` after their last `set`
    pub fn new(backend: Arc<dyn StateBackend>, ttl: Duration, counters: Arc<dyn CounterSink>) -> Self {
        Self {
            backend,
            ttl,
            counters,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn operation(&self, name: &'static str) -> Operation {
        Operation::new(name).with_tag("storage", self.backend.storage_name())
    }

    /// Load the state stored under `key`
    pub async fn get(&self, key: &str) -> Result<StateLookup, StateError> {
        let op = self.operation(OP_GET);
        self.counters.start(&op);

        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.counters.failure(&op, REASON_NOT_FOUND);
                return Ok(StateLookup::NotFound);
            }
            Err(e) => {
                self.counters.failure(&op, REASON_BACKEND_ERROR);
                return Err(e);
            }
        };

        match serde_json::from_slice::<AuthState>(&bytes) {
            Ok(state) => {
                self.counters.success(&op);
                Ok(StateLookup::Found(state))
            }
            Err(e) => {
                warn!(session_key = %key, error = %e, "Stored EAP state is unreadable");
                self.counters.failure(&op, REASON_DESERIALIZE_FAILED);
                Ok(StateLookup::Invalid)
            }
        }
    }

    /// Replace the state stored under `key`
    pub async fn set(&self, key: &str, state: &AuthState) -> Result<(), StateError> {
        let op = self.operation(OP_SET);
        self.counters.start(&op);

        let bytes = match serde_json::to_vec(state) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.counters.failure(&op, REASON_SERIALIZE_FAILED);
                return Err(e.into());
            }
        };

        match self.backend.set(key, &bytes, Some(self.ttl)).await {
            Ok(()) => {
                debug!(session_key = %key, rounds = state.rounds, "EAP state stored");
                self.counters.success(&op);
                Ok(())
            }
            Err(e) => {
                self.counters.failure(&op, REASON_BACKEND_ERROR);
                Err(e)
            }
        }
    }

    /// Remove any state stored under `key`; removing nothing succeeds
    pub async fn reset(&self, key: &str) -> Result<(), StateError> {
        let op = self.operation(OP_RESET);
        self.counters.start(&op);

        match self.backend.delete(key).await {
            Ok(()) => {
                debug!(session_key = %key, "EAP state reset");
                self.counters.success(&op);
                Ok(())
            }
            Err(e) => {
                self.counters.failure(&op, REASON_BACKEND_ERROR);
                Err(e)
            }
        }
    }

    /// Check that the backend is reachable
    pub async fn ping(&self) -> Result<(), StateError> {
        self.backend.ping().await
    }

    pub fn storage_name(&self) -> &'static str {
        self.backend.storage_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::MemoryCounters;
    use crate::state::MemoryStateBackend;
    use async_trait::async_trait;

    fn store_with(ttl: Duration) -> (AuthStateStore, Arc<MemoryStateBackend>, Arc<MemoryCounters>) {
        let backend = Arc::new(MemoryStateBackend::new());
        let counters = Arc::new(MemoryCounters::new());
        let store = AuthStateStore::new(backend.clone(), ttl, counters.clone());
        (store, backend, counters)
    }

    fn sample_state(rounds: u32) -> AuthState {
        AuthState {
            eap_type: Some(50),
            last_identifier: Some(rounds as u8),
            rounds,
            method_state: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (store, _, _) = store_with(Duration::from_secs(10));
        let state = sample_state(2);

        store.set("eap__a__b", &state).await.unwrap();
        assert_eq!(store.get("eap__a__b").await.unwrap(), StateLookup::Found(state));
    }

    #[tokio::test]
    async fn test_set_replaces_previous() {
        let (store, _, _) = store_with(Duration::from_secs(10));

        store.set("k", &sample_state(1)).await.unwrap();
        store.set("k", &sample_state(2)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), StateLookup::Found(sample_state(2)));
    }

    #[tokio::test]
    async fn test_get_is_a_copy() {
        let (store, _, _) = store_with(Duration::from_secs(10));
        store.set("k", &sample_state(1)).await.unwrap();

        if let StateLookup::Found(mut state) = store.get("k").await.unwrap() {
            state.rounds = 99;
        }
        assert_eq!(store.get("k").await.unwrap(), StateLookup::Found(sample_state(1)));
    }

    #[tokio::test]
    async fn test_reset_then_get_not_found() {
        let (store, _, _) = store_with(Duration::from_secs(10));

        store.set("k", &sample_state(1)).await.unwrap();
        store.reset("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), StateLookup::NotFound);

        // Idempotent
        store.reset("k").await.unwrap();
        store.reset("never-set").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), StateLookup::NotFound);
    }

    #[tokio::test]
    async fn test_foreign_bytes_are_invalid() {
        let (store, backend, counters) = store_with(Duration::from_secs(10));
        backend.set("k", b"\x00not json", None).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), StateLookup::Invalid);
        assert_eq!(
            counters.get(OP_GET).failed.get(REASON_DESERIALIZE_FAILED),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_expiry_follows_ttl() {
        let (store, _, _) = store_with(Duration::from_millis(50));

        store.set("k", &sample_state(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.get("k").await.unwrap(), StateLookup::NotFound);
    }

    #[tokio::test]
    async fn test_counters_per_operation() {
        let (store, _, counters) = store_with(Duration::from_secs(10));

        store.get("k").await.unwrap();
        store.set("k", &sample_state(1)).await.unwrap();
        store.get("k").await.unwrap();
        store.reset("k").await.unwrap();

        let get = counters.get(OP_GET);
        assert_eq!(get.started, 2);
        assert_eq!(get.succeeded, 1);
        assert_eq!(get.failed.get(REASON_NOT_FOUND), Some(&1));

        let set = counters.get(OP_SET);
        assert_eq!((set.started, set.succeeded, set.failed_total()), (1, 1, 0));

        let reset = counters.get(OP_RESET);
        assert_eq!((reset.started, reset.succeeded, reset.failed_total()), (1, 1, 0));

        assert!(counters.render_prometheus().contains("storage=\"memory\""));
    }

    struct FailingBackend;

    #[async_trait]
    impl StateBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StateError> {
            Err(StateError::BackendError("down".into()))
        }
        async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> Result<(), StateError> {
            Err(StateError::Timeout("slow".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), StateError> {
            Err(StateError::BackendError("down".into()))
        }
        async fn ping(&self) -> Result<(), StateError> {
            Err(StateError::BackendError("down".into()))
        }
        fn storage_name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_backend_errors_are_retryable() {
        let counters = Arc::new(MemoryCounters::new());
        let store = AuthStateStore::new(Arc::new(FailingBackend), Duration::from_secs(1), counters.clone());

        assert!(store.get("k").await.unwrap_err().is_retryable());
        assert!(store.set("k", &sample_state(1)).await.unwrap_err().is_retryable());
        assert!(store.reset("k").await.is_err());

        for op in [OP_GET, OP_SET, OP_RESET] {
            let counts = counters.get(op);
            assert_eq!(counts.started, 1);
            assert_eq!(counts.failed.get(REASON_BACKEND_ERROR), Some(&1));
        }
    }

    #[tokio::test]
    async fn test_concurrent_keys_are_isolated() {
        let (store, _, _) = store_with(Duration::from_secs(10));
        let store = Arc::new(store);
        let mut handles = Vec::new();

        for i in 0..32u32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let key = format!("eap__dev{}__ap", i);
                for round in 1..=5 {
                    store.set(&key, &sample_state(i * 10 + round)).await.unwrap();
                }
                if i % 2 == 0 {
                    store.reset(&key).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..32u32 {
            let key = format!("eap__dev{}__ap", i);
            let expected = if i % 2 == 0 {
                StateLookup::NotFound
            } else {
                StateLookup::Found(sample_state(i * 10 + 5))
            };
            assert_eq!(store.get(&key).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_ping_reports_backend_health() {
        let (store, _, _) = store_with(Duration::from_secs(10));
        assert!(store.ping().await.is_ok());
        assert_eq!(store.storage_name(), "memory");
        assert_eq!(store.ttl(), Duration::from_secs(10));

        let failing = AuthStateStore::new(
            Arc::new(FailingBackend),
            Duration::from_secs(10),
            Arc::new(MemoryCounters::new()),
        );
        assert!(failing.ping().await.unwrap_err().is_retryable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_race_is_last_writer_wins() {
        let (store, _, _) = store_with(Duration::from_secs(10));
        let store = Arc::new(store);
        let key = "eap__shared__ap";

        // Containers of different sizes so a torn write could not pass as a valid one
        let written: Vec<AuthState> = (1..=16u32)
            .map(|i| AuthState {
                eap_type: Some(i as u8),
                last_identifier: Some(i as u8),
                rounds: i,
                method_state: vec![i as u8; i as usize * 64],
            })
            .collect();

        let mut writers = Vec::new();
        for state in written.clone() {
            let store = Arc::clone(&store);
            writers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.set(key, &state).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..200 {
                    seen.push(store.get(key).await.unwrap());
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        for writer in writers {
            writer.await.unwrap();
        }
        for reader in readers {
            for lookup in reader.await.unwrap() {
                match lookup {
                    StateLookup::NotFound => {}
                    StateLookup::Found(state) => assert!(written.contains(&state)),
                    StateLookup::Invalid => panic!("reader saw a partial container"),
                }
            }
        }

        let StateLookup::Found(last) = store.get(key).await.unwrap() else {
            panic!("the key should hold the last write");
        };
        assert!(written.contains(&last));
    }
}
