//! Traffic tier router
//!
//! Decides which upstream host serves a request arriving on a listener.
//!
//! # Selection
//!
//! 1. Draw a uniform integer in `[0, 100)`.
//! 2. Walk the canaries in declared order, accumulating their
//!    `trafficSlicePercent`. The first canary whose cumulative bound exceeds
//!    the draw supplies the routing; otherwise the live routing is used.
//! 3. Look up the listener's tier in that routing, falling back to
//!    `defaultTier` when the routing has no entry for it.
//! 4. Pick a host of the tier by round-robin.
//!
//! With canaries `[c1: 10, c2: 20]` the draws `0..10` go to `c1`, `10..30`
//! to `c2` and `30..100` to live.

pub mod error;
pub mod tier;

pub use error::RoutingError;
pub use tier::{ServiceTierState, TierStatSnapshot};

use crate::config::{ConfigError, LIVE_TIER, LoadBalanceConfig, TierRouting};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::{trace, warn};

/// The result of routing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// `live` or the name of the canary that won the draw
    pub routing: String,
    pub tier: String,
    pub host: String,
}

impl Selection {
    pub fn is_canary(&self) -> bool {
        self.routing != LIVE_TIER
    }
}

#[derive(Debug)]
struct Routing {
    name: String,
    tiers: HashMap<String, String>,
}

impl Routing {
    fn new(name: &str, routing: &TierRouting) -> Self {
        Routing {
            name: name.to_string(),
            tiers: routing
                .routes
                .iter()
                .map(|route| (route.listener.clone(), route.service_tier.clone()))
                .collect(),
        }
    }
}

#[derive(Debug)]
struct CanarySlice {
    /// Exclusive upper bound of the draws this canary receives
    upper_bound: u32,
    routing: Routing,
}

/// Routes listeners onto service tiers under a live/canary split
///
/// Immutable after construction apart from the round-robin cursors, so one
/// instance is shared by every listener.
#[derive(Debug)]
pub struct LoadBalancer {
    tiers: HashMap<String, ServiceTierState>,
    live: Routing,
    canaries: Vec<CanarySlice>,
    default_tier: String,
    listeners: HashSet<String>,
}

impl LoadBalancer {
    /// Build a router for the given listeners
    ///
    /// Fails if `config` violates any load balancing invariant.
    pub fn new<'a>(
        config: &LoadBalanceConfig,
        listeners: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let tiers = config
            .service_tiers
            .iter()
            .map(|tier| {
                (
                    tier.name.clone(),
                    ServiceTierState::new(tier.name.clone(), tier.upstream_hosts.clone()),
                )
            })
            .collect();

        let mut upper_bound = 0u32;
        let canaries = config
            .canaries
            .iter()
            .map(|canary| {
                // validate() guarantees 0..=100 and a sum of at most 100
                upper_bound += canary.traffic_slice_percent.unsigned_abs();
                CanarySlice {
                    upper_bound,
                    routing: Routing::new(&canary.name, &canary.routing),
                }
            })
            .collect();

        Ok(LoadBalancer {
            tiers,
            live: Routing::new(LIVE_TIER, &config.live_tier),
            canaries,
            default_tier: config.default_tier.clone(),
            listeners: listeners.into_iter().map(str::to_string).collect(),
        })
    }

    /// Select a host for `listener` using a random draw
    pub fn select(&self, listener: &str) -> Result<Selection, RoutingError> {
        let draw = rand::rng().random_range(0..100);
        self.select_with_draw(listener, draw)
    }

    /// Select a host for `listener` given a draw in `[0, 100)`
    ///
    /// Deterministic for a given draw apart from the round-robin position
    /// within the chosen tier.
    pub fn select_with_draw(&self, listener: &str, draw: u32) -> Result<Selection, RoutingError> {
        if !self.listeners.contains(listener) {
            warn!(listener = %listener, "Request on a listener unknown to the router");
            return Err(RoutingError::UnknownListener(listener.to_string()));
        }

        let routing = self
            .canaries
            .iter()
            .find(|canary| draw < canary.upper_bound)
            .map(|canary| &canary.routing)
            .unwrap_or(&self.live);

        let tier_name = routing
            .tiers
            .get(listener)
            .unwrap_or(&self.default_tier);

        let tier = self
            .tiers
            .get(tier_name)
            .ok_or_else(|| RoutingError::UnknownTier(tier_name.clone()))?;

        let host = tier
            .next_host()
            .ok_or_else(|| RoutingError::UnknownTier(tier_name.clone()))?;

        trace!(
            listener = %listener,
            draw = draw,
            routing = %routing.name,
            tier = %tier_name,
            host = %host,
            "Upstream selected"
        );

        Ok(Selection {
            routing: routing.name.clone(),
            tier: tier_name.clone(),
            host: host.to_string(),
        })
    }

    /// Per-tier selection statistics, sorted by tier name
    pub fn stats(&self) -> Vec<TierStatSnapshot> {
        let mut stats: Vec<_> = self.tiers.values().map(ServiceTierState::snapshot).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}
