//! Service tiers and host selection

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A named set of upstream hosts with per-tier round-robin selection
#[derive(Debug)]
pub struct ServiceTierState {
    name: String,
    hosts: Vec<String>,
    next: AtomicUsize,
    selections: AtomicU64,
}

impl ServiceTierState {
    /// `hosts` must be non-empty; configuration validation guarantees it
    pub fn new(name: impl Into<String>, hosts: Vec<String>) -> Self {
        Self {
            name: name.into(),
            hosts,
            next: AtomicUsize::new(0),
            selections: AtomicU64::new(0),
        }
    }

    /// Next host in round-robin order, `None` for an empty tier
    pub fn next_host(&self) -> Option<&str> {
        if self.hosts.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        self.selections.fetch_add(1, Ordering::Relaxed);
        self.hosts.get(index).map(String::as_str)
    }

    pub fn snapshot(&self) -> TierStatSnapshot {
        TierStatSnapshot {
            name: self.name.clone(),
            hosts: self.hosts.len(),
            selections: self.selections.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time statistics for one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStatSnapshot {
    pub name: String,
    pub hosts: usize,
    pub selections: u64,
}
