//! Server-wide packet filters
//!
//! Filters run before a listener's pipeline and decide whether a request
//! is processed at all. They are named in `ServerConfig.filters` and run in
//! declared order; the first filter refusing a packet drops it.

use crate::config::ConfigError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use radius_proto::{AttributeSource, AttributeType, Packet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, warn};

pub const DEDUP: &str = "dedup";
pub const REQUIRE_STATION_IDS: &str = "require_station_ids";

/// Upper bound on remembered requests
const DEDUP_MAX_ENTRIES: usize = 100_000;

const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

/// A pre-pipeline check on an inbound request
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the request should be processed
    fn accept(&self, source: SocketAddr, packet: &Packet) -> bool;
}

/// Request fingerprint for retransmission detection
///
/// Per RFC 2865 Section 2 a retransmission repeats the identifier and the
/// request authenticator of the original request.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RequestFingerprint {
    pub source_ip: IpAddr,
    pub identifier: u8,
    pub authenticator: [u8; 16],
}

impl RequestFingerprint {
    pub fn new(source_ip: IpAddr, packet: &Packet) -> Self {
        RequestFingerprint {
            source_ip,
            identifier: packet.identifier,
            authenticator: packet.authenticator,
        }
    }
}

/// Drops requests already seen within the dedup window
///
/// Entries are expired by a background task running every window/4 and,
/// for entries read before the task reaches them, on lookup.
pub struct DedupFilter {
    seen: Arc<DashMap<RequestFingerprint, Instant>>,
    window: Duration,
    max_entries: usize,
    cleanup_running: Arc<AtomicBool>,
}

impl DedupFilter {
    pub fn new(window: Duration) -> Self {
        Self::new_internal(window, DEDUP_MAX_ENTRIES, true)
    }

    #[cfg(test)]
    fn new_no_background(window: Duration, max_entries: usize) -> Self {
        Self::new_internal(window, max_entries, false)
    }

    fn new_internal(window: Duration, max_entries: usize, start_background: bool) -> Self {
        let seen: Arc<DashMap<RequestFingerprint, Instant>> = Arc::new(DashMap::new());
        let cleanup_running = Arc::new(AtomicBool::new(start_background));

        if start_background {
            let seen = Arc::clone(&seen);
            let cleanup_flag = Arc::clone(&cleanup_running);
            let cleanup_interval = (window / 4).max(MIN_CLEANUP_INTERVAL);

            tokio::spawn(async move {
                let mut interval = time::interval(cleanup_interval);
                interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

                while cleanup_flag.load(Ordering::Relaxed) {
                    interval.tick().await;

                    let now = Instant::now();
                    let before = seen.len();
                    seen.retain(|_, inserted_at| now.duration_since(*inserted_at) <= window);
                    let removed = before.saturating_sub(seen.len());

                    if removed > 0 {
                        debug!(
                            removed = removed,
                            remaining = seen.len(),
                            "Dedup cache cleanup completed"
                        );
                    }
                }

                debug!("Dedup cache cleanup task stopped");
            });
        }

        DedupFilter {
            seen,
            window,
            max_entries,
            cleanup_running,
        }
    }

    /// Record the request, returning `true` if it was seen within the window
    pub fn is_duplicate(&self, fingerprint: RequestFingerprint) -> bool {
        let now = Instant::now();

        if self.seen.len() >= self.max_entries && !self.seen.contains_key(&fingerprint) {
            let window = self.window;
            self.seen
                .retain(|_, inserted_at| now.duration_since(*inserted_at) <= window);
            if self.seen.len() >= self.max_entries {
                warn!(entries = self.seen.len(), "Dedup cache full, request not recorded");
                return false;
            }
        }

        match self.seen.entry(fingerprint) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) <= self.window {
                    true
                } else {
                    entry.insert(now);
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Drop for DedupFilter {
    fn drop(&mut self) {
        self.cleanup_running.store(false, Ordering::Relaxed);
    }
}

impl Filter for DedupFilter {
    fn name(&self) -> &str {
        DEDUP
    }

    fn accept(&self, source: SocketAddr, packet: &Packet) -> bool {
        let duplicate = self.is_duplicate(RequestFingerprint::new(source.ip(), packet));
        if duplicate {
            debug!(source = %source, identifier = packet.identifier, "Dropping retransmitted request");
        }
        !duplicate
    }
}

/// Drops requests missing either station id
///
/// Without both ids every such device would share one session key.
#[derive(Debug, Default)]
pub struct RequireStationIds;

impl Filter for RequireStationIds {
    fn name(&self) -> &str {
        REQUIRE_STATION_IDS
    }

    fn accept(&self, source: SocketAddr, packet: &Packet) -> bool {
        let complete = !packet.attribute_value(AttributeType::CallingStationId).is_empty()
            && !packet.attribute_value(AttributeType::CalledStationId).is_empty();
        if !complete {
            debug!(source = %source, identifier = packet.identifier, "Dropping request without station ids");
        }
        complete
    }
}

/// Filters in execution order
#[derive(Default, Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    /// Build the filters named in the server configuration
    ///
    /// Must be called within a tokio runtime when `dedup` is named.
    pub fn from_names(names: &[String], dedup_window: Duration) -> Result<Self, ConfigError> {
        let filters = names
            .iter()
            .enumerate()
            .map(|(i, name)| -> Result<Arc<dyn Filter>, ConfigError> {
                match name.as_str() {
                    DEDUP => Ok(Arc::new(DedupFilter::new(dedup_window))),
                    REQUIRE_STATION_IDS => Ok(Arc::new(RequireStationIds)),
                    other => Err(ConfigError::invalid(
                        format!("filters[{}]", i),
                        format!("unknown filter '{}'", other),
                    )),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FilterChain { filters })
    }

    /// Name of the first filter refusing the packet, if any
    pub fn check(&self, source: SocketAddr, packet: &Packet) -> Option<&str> {
        self.filters
            .iter()
            .find(|filter| !filter.accept(source, packet))
            .map(|filter| filter.name())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
