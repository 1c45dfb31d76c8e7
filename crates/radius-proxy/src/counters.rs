//! Operation counters
//!
//! A narrow start / success / failure interface injected into the
//! components that need to report on their operations. The core never
//! depends on a telemetry backend; a sink decides where the counts go.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// An instrumented operation together with its tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Operation {
    pub name: &'static str,
    pub tags: Vec<(&'static str, String)>,
}

impl Operation {
    pub fn new(name: &'static str) -> Self {
        Operation {
            name,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.tags.push((key, value.into()));
        self
    }

    fn label_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Sink receiving operation outcomes
///
/// Every instrumented call reports `start` followed by exactly one of
/// `success` or `failure`.
pub trait CounterSink: Send + Sync {
    fn start(&self, op: &Operation);
    fn success(&self, op: &Operation);
    fn failure(&self, op: &Operation, reason: &str);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCounters;

impl CounterSink for NoopCounters {
    fn start(&self, _op: &Operation) {}
    fn success(&self, _op: &Operation) {}
    fn failure(&self, _op: &Operation, _reason: &str) {}
}

/// Emits each outcome as a tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCounters;

impl CounterSink for TracingCounters {
    fn start(&self, op: &Operation) {
        debug!(operation = op.name, tags = ?op.tags, "operation started");
    }

    fn success(&self, op: &Operation) {
        debug!(operation = op.name, tags = ?op.tags, "operation succeeded");
    }

    fn failure(&self, op: &Operation, reason: &str) {
        warn!(operation = op.name, tags = ?op.tags, reason = reason, "operation failed");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Outcome {
    Start,
    Success,
    Failure(String),
}

/// Point-in-time counts for one operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationCounts {
    pub started: u64,
    pub succeeded: u64,
    /// Failures keyed by reason
    pub failed: BTreeMap<String, u64>,
}

impl OperationCounts {
    pub fn failed_total(&self) -> u64 {
        self.failed.values().sum()
    }
}

/// In-process counters, readable as a snapshot or Prometheus text
#[derive(Debug, Default)]
pub struct MemoryCounters {
    counts: DashMap<(Operation, Outcome), AtomicU64>,
}

impl MemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, op: &Operation, outcome: Outcome) {
        self.counts
            .entry((op.clone(), outcome))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Counts for one operation, summed across its tags
    pub fn get(&self, name: &str) -> OperationCounts {
        let mut counts = OperationCounts::default();
        for entry in self.counts.iter() {
            let (op, outcome) = entry.key();
            if op.name != name {
                continue;
            }
            let value = entry.value().load(Ordering::Relaxed);
            match outcome {
                Outcome::Start => counts.started += value,
                Outcome::Success => counts.succeeded += value,
                Outcome::Failure(reason) => *counts.failed.entry(reason.clone()).or_default() += value,
            }
        }
        counts
    }

    /// Counts for every operation seen so far, keyed by operation name
    pub fn snapshot(&self) -> BTreeMap<String, OperationCounts> {
        let mut names: Vec<&'static str> = self.counts.iter().map(|entry| entry.key().0.name).collect();
        names.sort_unstable();
        names.dedup();
        names
            .into_iter()
            .map(|name| (name.to_string(), self.get(name)))
            .collect()
    }

    /// Render all counters in the Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let mut rows: Vec<(String, u64)> = self
            .counts
            .iter()
            .map(|entry| {
                let (op, outcome) = entry.key();
                let mut labels: Vec<(&str, &str)> = op.label_pairs().collect();
                let suffix = match outcome {
                    Outcome::Start => "started",
                    Outcome::Success => "succeeded",
                    Outcome::Failure(reason) => {
                        labels.push(("reason", reason.as_str()));
                        "failed"
                    }
                };
                let label_str = labels
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                (
                    format!("radius_proxy_{}_{}_total{{{}}}", op.name, suffix, label_str),
                    entry.value().load(Ordering::Relaxed),
                )
            })
            .collect();
        rows.sort();

        let mut content = String::new();
        let mut last_family = String::new();
        for (series, value) in rows {
            let family = series.split('{').next().unwrap_or_default().to_string();
            if family != last_family {
                let _ = writeln!(content, "# TYPE {} counter", family);
                last_family = family;
            }
            let _ = writeln!(content, "{} {}", series, value);
        }
        content
    }
}

/// Escape a label value for the Prometheus text format
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl CounterSink for MemoryCounters {
    fn start(&self, op: &Operation) {
        self.bump(op, Outcome::Start);
    }

    fn success(&self, op: &Operation) {
        self.bump(op, Outcome::Success);
    }

    fn failure(&self, op: &Operation, reason: &str) {
        self.bump(op, Outcome::Failure(reason.to_string()));
    }
}
