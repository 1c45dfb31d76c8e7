//! Server configuration
//!
//! The decoded configuration consumed by the proxy core. JSON field names
//! follow the deployed configuration files (`dedupWindow`, `loadBalance`,
//! `serviceTiers`, `tierRoutes`, ...). Everything here is loaded once at
//! startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Routing name reported for selections made from the live tier routing
pub const LIVE_TIER: &str = "live";

/// The only listener type served by this proxy
pub const UDP_LISTENER: &str = "udp";

/// Smallest accepted `dedupWindow`; background sweeps run every window/4
pub const MIN_DEDUP_WINDOW: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration at '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A descriptor for loading a single pipeline module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    /// Module specific settings, interpreted by the module itself
    #[serde(default)]
    pub config: Value,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Configuration of a single listener (one per bound port)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub listener_type: String,
    /// Execution order of the listener's pipeline
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl ListenerConfig {
    /// Address to bind, from `extra.address` (default `0.0.0.0`) and
    /// `extra.port` (default 1812)
    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        let field = |key: &str| format!("listeners[{}].extra.{}", self.name, key);

        let address = match self.extra.get("address") {
            None => IpAddr::from([0, 0, 0, 0]),
            Some(Value::String(address)) => address
                .parse()
                .map_err(|_| ConfigError::invalid(field("address"), format!("invalid IP address '{}'", address)))?,
            Some(other) => {
                return Err(ConfigError::invalid(
                    field("address"),
                    format!("expected a string, got {}", other),
                ));
            }
        };

        let port = match self.extra.get("port") {
            None => 1812,
            Some(value) => value
                .as_u64()
                .and_then(|port| u16::try_from(port).ok())
                .ok_or_else(|| {
                    ConfigError::invalid(field("port"), format!("expected a port number, got {}", value))
                })?,
        };

        Ok(SocketAddr::new(address, port))
    }
}

/// A uniquely named set of upstream hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTier {
    pub name: String,
    #[serde(default)]
    pub upstream_hosts: Vec<String>,
}

/// Maps a listener to the ServiceTier serving its traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerRoute {
    pub listener: String,
    pub service_tier: String,
}

/// A complete listener to tier mapping for one traffic slice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRouting {
    #[serde(rename = "tierRoutes", default)]
    pub routes: Vec<ListenerRoute>,
}

impl TierRouting {
    /// Tier serving `listener` in this routing, if one is routed
    pub fn tier_for(&self, listener: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|route| route.listener == listener)
            .map(|route| route.service_tier.as_str())
    }

    fn validate(&self, field: &str, tiers: &HashSet<&str>) -> Result<(), ConfigError> {
        let mut listeners = HashSet::new();
        for (i, route) in self.routes.iter().enumerate() {
            if route.listener.is_empty() {
                return Err(ConfigError::invalid(
                    format!("{}.tierRoutes[{}].listener", field, i),
                    "listener name cannot be empty",
                ));
            }
            if !listeners.insert(route.listener.as_str()) {
                return Err(ConfigError::invalid(
                    format!("{}.tierRoutes[{}].listener", field, i),
                    format!("listener '{}' is routed more than once", route.listener),
                ));
            }
            if !tiers.contains(route.service_tier.as_str()) {
                return Err(ConfigError::invalid(
                    format!("{}.tierRoutes[{}].serviceTier", field, i),
                    format!("unknown service tier '{}'", route.service_tier),
                ));
            }
        }
        Ok(())
    }
}

/// An alternate routing receiving a slice of the traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canary {
    pub name: String,
    pub traffic_slice_percent: i32,
    #[serde(default)]
    pub routing: TierRouting,
}

/// Complete configuration of the tier load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalanceConfig {
    pub service_tiers: Vec<ServiceTier>,
    #[serde(default)]
    pub live_tier: TierRouting,
    /// Evaluated in declared order; the first slice containing the draw wins
    #[serde(default)]
    pub canaries: Vec<Canary>,
    pub default_tier: String,
}

impl LoadBalanceConfig {
    /// Validate tier references, canary slices and host lists
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut tiers = HashSet::new();
        for (i, tier) in self.service_tiers.iter().enumerate() {
            let field = format!("loadBalance.serviceTiers[{}]", i);
            if tier.name.is_empty() {
                return Err(ConfigError::invalid(
                    format!("{}.name", field),
                    "service tier name cannot be empty",
                ));
            }
            if !tiers.insert(tier.name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("{}.name", field),
                    format!("duplicate service tier '{}'", tier.name),
                ));
            }
            if tier.upstream_hosts.is_empty() {
                return Err(ConfigError::invalid(
                    format!("{}.upstreamHosts", field),
                    format!("service tier '{}' has no upstream hosts", tier.name),
                ));
            }
            if let Some(j) = tier.upstream_hosts.iter().position(String::is_empty) {
                return Err(ConfigError::invalid(
                    format!("{}.upstreamHosts[{}]", field, j),
                    "upstream host cannot be empty",
                ));
            }
        }

        if !tiers.contains(self.default_tier.as_str()) {
            return Err(ConfigError::invalid(
                "loadBalance.defaultTier",
                format!("unknown service tier '{}'", self.default_tier),
            ));
        }

        self.live_tier.validate("loadBalance.liveTier", &tiers)?;

        let mut canary_names = HashSet::new();
        let mut total_percent = 0i64;
        for (i, canary) in self.canaries.iter().enumerate() {
            let field = format!("loadBalance.canaries[{}]", i);
            if canary.name.is_empty() || canary.name == LIVE_TIER {
                return Err(ConfigError::invalid(
                    format!("{}.name", field),
                    format!("canary name cannot be empty or '{}'", LIVE_TIER),
                ));
            }
            if !canary_names.insert(canary.name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("{}.name", field),
                    format!("duplicate canary '{}'", canary.name),
                ));
            }
            if !(0..=100).contains(&canary.traffic_slice_percent) {
                return Err(ConfigError::invalid(
                    format!("{}.trafficSlicePercent", field),
                    format!("{} is outside 0-100", canary.traffic_slice_percent),
                ));
            }
            total_percent += i64::from(canary.traffic_slice_percent);
            canary.routing.validate(&format!("{}.routing", field), &tiers)?;
        }

        if total_percent > 100 {
            return Err(ConfigError::invalid(
                "loadBalance.canaries",
                format!("traffic slices sum to {}%, which exceeds 100%", total_percent),
            ));
        }

        Ok(())
    }
}

/// Configuration of a radius server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Shared secret between the NASes, this proxy and the upstream tiers
    pub secret: String,
    /// Retransmission window; also bounds the lifetime of EAP state
    #[serde(with = "duration_serde")]
    pub dedup_window: Duration,
    pub load_balance: LoadBalanceConfig,
    pub listeners: Vec<ListenerConfig>,
    /// Server-wide packet filters, run before every listener's pipeline
    #[serde(default)]
    pub filters: Vec<String>,
}

impl ServerConfig {
    /// Validate configuration
    ///
    /// Module and filter names are resolved when the pipelines are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::invalid("secret", "secret cannot be empty"));
        }

        if self.dedup_window < MIN_DEDUP_WINDOW {
            return Err(ConfigError::invalid(
                "dedupWindow",
                format!("must be at least {}", humantime::format_duration(MIN_DEDUP_WINDOW)),
            ));
        }

        self.load_balance.validate()?;

        if self.listeners.is_empty() {
            return Err(ConfigError::invalid("listeners", "at least one listener is required"));
        }

        let mut names = HashSet::new();
        for (i, listener) in self.listeners.iter().enumerate() {
            if listener.name.is_empty() {
                return Err(ConfigError::invalid(
                    format!("listeners[{}].name", i),
                    "listener name cannot be empty",
                ));
            }
            if !names.insert(listener.name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("listeners[{}].name", i),
                    format!("duplicate listener '{}'", listener.name),
                ));
            }
            if listener.listener_type != UDP_LISTENER {
                return Err(ConfigError::invalid(
                    format!("listeners[{}].type", i),
                    format!("unsupported listener type '{}'", listener.listener_type),
                ));
            }
            listener.bind_address()?;
        }

        Ok(())
    }

    /// Names of all configured listeners, in declared order
    pub fn listener_names(&self) -> impl Iterator<Item = &str> {
        self.listeners.iter().map(|listener| listener.name.as_str())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Logging settings for the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// The configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiusConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RadiusConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration from a JSON document
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: RadiusConfig = serde_json::from_str(contents)?;
        config.server.validate()?;
        Ok(config)
    }
}

/// `dedupWindow` accepts a duration string ("10s", "1500ms") or integer
/// milliseconds, and is written back as a duration string.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Millis(millis) => Ok(Duration::from_millis(millis)),
            Repr::Text(text) => humantime::parse_duration(&text).map_err(D::Error::custom),
        }
    }
}
