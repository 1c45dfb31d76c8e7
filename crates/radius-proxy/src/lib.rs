//! RADIUS Edge Proxy Core
//!
//! Terminates WiFi subscriber authentication at the network edge and
//! forwards it to upstream authentication tiers, built on the
//! `radius-proto` packet abstraction.
//!
//! # Features
//!
//! - Live/canary traffic slicing onto service tiers
//! - EAP state tracking across Access-Request rounds, keyed per device
//! - Ordered per-listener module pipelines
//! - Server-wide retransmission and sanity filters
//! - Operation counters with a pluggable sink
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_proxy::{RadiusConfig, RadiusServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RadiusConfig::from_file("radius-proxy.json")?;
//!
//!     let server = RadiusServer::from_config(config.server).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod counters;
pub mod filter;
pub mod listener;
pub mod loadbalance;
pub mod modules;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod state;

pub use config::{
    Canary, ConfigError, LIVE_TIER, ListenerConfig, ListenerRoute, LoadBalanceConfig, LogFormat,
    LoggingConfig, ModuleDescriptor, RadiusConfig, ServerConfig, ServiceTier, TierRouting,
};
pub use counters::{CounterSink, MemoryCounters, NoopCounters, Operation, TracingCounters};
pub use filter::{Filter, FilterChain};
pub use loadbalance::{LoadBalancer, RoutingError, Selection};
pub use pipeline::{
    ErrorAction, Module, ModuleError, ModuleOutcome, ModuleRegistry, ModuleServices, Pipeline,
    PipelineError, PipelineOutcome, RequestContext,
};
pub use server::{RadiusServer, ServerError};
pub use session::SessionKey;
pub use state::{AuthState, AuthStateStore, MemoryStateBackend, StateBackend, StateError, StateLookup};
