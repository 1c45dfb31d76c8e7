//! Proxy server
//!
//! Builds the router, the EAP state store, the filters and one pipeline per
//! listener from a [`ServerConfig`], then serves every listener.

use crate::config::{ConfigError, ServerConfig};
use crate::counters::{CounterSink, MemoryCounters};
use crate::filter::FilterChain;
use crate::listener::Listener;
use crate::loadbalance::LoadBalancer;
use crate::pipeline::{ModuleRegistry, ModuleServices, Pipeline, PipelineError};
use crate::state::{AuthStateStore, MemoryStateBackend, StateError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("State backend error: {0}")]
    State(#[from] StateError),
    #[error("Pipeline error on listener '{listener}': {source}")]
    Pipeline {
        listener: String,
        #[source]
        source: PipelineError,
    },
    #[error("Failed to bind listener '{listener}' on {address}: {source}")]
    Bind {
        listener: String,
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Listener task failed: {0}")]
    Task(String),
}

/// Everything built from a configuration before any socket is bound
struct Prepared {
    router: Arc<LoadBalancer>,
    state: Arc<AuthStateStore>,
    backend: MemoryStateBackend,
    filters: FilterChain,
    pipelines: Vec<(String, SocketAddr, Pipeline)>,
}

fn prepare(
    config: &ServerConfig,
    registry: &ModuleRegistry,
    counters: Arc<dyn CounterSink>,
) -> Result<Prepared, ServerError> {
    config.validate()?;

    let router = Arc::new(LoadBalancer::new(&config.load_balance, config.listener_names())?);
    let backend = MemoryStateBackend::new();
    let state = Arc::new(AuthStateStore::new(
        Arc::new(backend.clone()),
        config.dedup_window,
        counters,
    ));
    let filters = FilterChain::from_names(&config.filters, config.dedup_window)?;
    let secret: Arc<[u8]> = Arc::from(config.secret.as_bytes());

    let mut pipelines = Vec::with_capacity(config.listeners.len());
    for listener in &config.listeners {
        let services = ModuleServices {
            listener: listener.name.clone(),
            router: Arc::clone(&router),
            state: Arc::clone(&state),
            secret: Arc::clone(&secret),
        };
        let pipeline = registry
            .build(&listener.modules, &services)
            .map_err(|source| ServerError::Pipeline {
                listener: listener.name.clone(),
                source,
            })?;
        pipelines.push((listener.name.clone(), listener.bind_address()?, pipeline));
    }

    Ok(Prepared {
        router,
        state,
        backend,
        filters,
        pipelines,
    })
}

/// The edge proxy: every configured listener over one shared router and
/// one shared EAP state store
pub struct RadiusServer {
    listeners: Vec<Arc<Listener>>,
    router: Arc<LoadBalancer>,
    state: Arc<AuthStateStore>,
    counters: Arc<MemoryCounters>,
    sweeper: JoinHandle<()>,
}

impl RadiusServer {
    /// Check a configuration the way `from_config` would, without binding
    ///
    /// Must be called within a tokio runtime.
    pub fn check(config: &ServerConfig) -> Result<(), ServerError> {
        prepare(config, &ModuleRegistry::with_builtins(), Arc::new(MemoryCounters::new())).map(|_| ())
    }

    /// Build and bind a server with the built-in modules
    pub async fn from_config(config: ServerConfig) -> Result<Self, ServerError> {
        Self::with_registry(config, &ModuleRegistry::with_builtins()).await
    }

    /// Build and bind a server resolving module names through `registry`
    pub async fn with_registry(config: ServerConfig, registry: &ModuleRegistry) -> Result<Self, ServerError> {
        let counters = Arc::new(MemoryCounters::new());
        let prepared = prepare(&config, registry, counters.clone())?;
        let secret: Arc<[u8]> = Arc::from(config.secret.as_bytes());

        prepared.state.ping().await?;
        info!(
            storage = prepared.state.storage_name(),
            ttl = %humantime::format_duration(prepared.state.ttl()),
            "EAP state store ready"
        );

        let mut listeners = Vec::with_capacity(prepared.pipelines.len());
        for (name, address, pipeline) in prepared.pipelines {
            let listener = Listener::bind(
                name,
                address,
                pipeline,
                prepared.filters.clone(),
                Arc::clone(&secret),
                counters.clone(),
            )
            .await?;
            listeners.push(Arc::new(listener));
        }

        let sweeper = prepared.backend.spawn_sweeper(config.dedup_window / 4);

        Ok(RadiusServer {
            listeners,
            router: prepared.router,
            state: prepared.state,
            counters,
            sweeper,
        })
    }

    /// Bound address of each listener, in configuration order
    pub fn local_addrs(&self) -> Result<Vec<(String, SocketAddr)>, ServerError> {
        self.listeners
            .iter()
            .map(|listener| Ok((listener.name().to_string(), listener.local_addr()?)))
            .collect()
    }

    pub fn router(&self) -> &Arc<LoadBalancer> {
        &self.router
    }

    pub fn state(&self) -> &Arc<AuthStateStore> {
        &self.state
    }

    pub fn counters(&self) -> &Arc<MemoryCounters> {
        &self.counters
    }

    /// Serve every listener until one of them fails
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut tasks = JoinSet::new();
        for listener in &self.listeners {
            let listener = Arc::clone(listener);
            tasks.spawn(async move {
                let name = listener.name().to_string();
                listener.run().await.map_err(|e| (name, e))
            });
        }

        info!(listeners = self.listeners.len(), "RADIUS proxy running");

        let result = match tasks.join_next().await {
            Some(Ok(Ok(()))) | None => Ok(()),
            Some(Ok(Err((listener, e)))) => {
                error!(listener = %listener, error = %e, "Listener stopped");
                Err(e)
            }
            Some(Err(e)) => Err(ServerError::Task(e.to_string())),
        };

        tasks.abort_all();
        result
    }
}

impl Drop for RadiusServer {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RadiusConfig;
    use serde_json::json;

    fn config(modules: serde_json::Value, filters: serde_json::Value) -> ServerConfig {
        let value = json!({
            "server": {
                "secret": "123456",
                "dedupWindow": "10s",
                "loadBalance": {
                    "serviceTiers": [{ "name": "live_v1", "upstreamHosts": ["127.0.0.1:1"] }],
                    "liveTier": { "tierRoutes": [{ "listener": "auth", "serviceTier": "live_v1" }] },
                    "defaultTier": "live_v1"
                },
                "listeners": [{
                    "name": "auth",
                    "type": "udp",
                    "modules": modules,
                    "extra": { "address": "127.0.0.1", "port": 0 }
                }],
                "filters": filters
            }
        });
        RadiusConfig::from_json(&value.to_string()).unwrap().server
    }

    #[tokio::test]
    async fn test_from_config_binds_listeners() {
        let server = RadiusServer::from_config(config(json!([{ "name": "respond" }]), json!(["dedup"])))
            .await
            .unwrap();

        let addrs = server.local_addrs().unwrap();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].0, "auth");
        assert_ne!(addrs[0].1.port(), 0);
    }

    #[tokio::test]
    async fn test_unknown_module_is_fatal() {
        let err = RadiusServer::from_config(config(json!([{ "name": "ldap" }]), json!([])))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ServerError::Pipeline { ref listener, source: PipelineError::UnknownModule(_) } if listener == "auth"
        ));
    }

    #[tokio::test]
    async fn test_unknown_filter_is_fatal() {
        assert!(RadiusServer::check(&config(json!([]), json!(["ratelimit"]))).is_err());
        assert!(RadiusServer::check(&config(json!([]), json!(["dedup", "require_station_ids"]))).is_ok());
    }
}
