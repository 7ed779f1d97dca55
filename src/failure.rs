//! Per-node liveness accounting.
//!
//! The routing pipeline reports every transport-level outcome here; the
//! routing strategy upstream consults `is_available` when ordering
//! candidates.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cluster::{Node, NodeId};
use crate::store::StoreError;

/// Consumes per-node success/exception signals with latency.
///
/// Record calls are fire-and-forget: implementations must not panic or
/// propagate failures back into the pipeline.
pub trait FailureDetector: Send + Sync {
    fn record_success(&self, node: &Node, request_time_ms: u64);

    fn record_exception(&self, node: &Node, request_time_ms: u64, error: &StoreError);

    fn is_available(&self, node: &Node) -> bool;
}

/// Detector that ignores all signals and reports every node available.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopFailureDetector;

impl FailureDetector for NoopFailureDetector {
    fn record_success(&self, _node: &Node, _request_time_ms: u64) {}

    fn record_exception(&self, _node: &Node, _request_time_ms: u64, _error: &StoreError) {}

    fn is_available(&self, _node: &Node) -> bool {
        true
    }
}

#[derive(Clone, Debug, Default)]
struct NodeHealth {
    successes: u64,
    exceptions: u64,
    total_latency_ms: u64,
    last_exception: Option<Instant>,
}

/// Bans a node for a fixed period after each recorded exception.
///
/// Successes clear the ban immediately; latency is accumulated across both
/// outcomes so the routing strategy can rank healthy nodes.
pub struct BannageFailureDetector {
    bannage: Duration,
    health: Mutex<HashMap<NodeId, NodeHealth>>,
}

impl BannageFailureDetector {
    pub fn new(bannage: Duration) -> Self {
        Self {
            bannage,
            health: Mutex::new(HashMap::new()),
        }
    }

    pub fn bannage(&self) -> Duration {
        self.bannage
    }

    pub fn success_count(&self, node: &Node) -> u64 {
        self.with_health(node, |health| health.successes).unwrap_or(0)
    }

    pub fn exception_count(&self, node: &Node) -> u64 {
        self.with_health(node, |health| health.exceptions).unwrap_or(0)
    }

    /// Mean latency over every recorded outcome for this node, or `None`
    /// when nothing has been recorded yet.
    pub fn average_latency_ms(&self, node: &Node) -> Option<u64> {
        self.with_health(node, |health| {
            let samples = health.successes + health.exceptions;
            if samples == 0 {
                None
            } else {
                Some(health.total_latency_ms / samples)
            }
        })
        .flatten()
    }

    fn with_health<T>(&self, node: &Node, f: impl FnOnce(&NodeHealth) -> T) -> Option<T> {
        let health = self.health.lock().ok()?;
        health.get(&node.id()).map(f)
    }
}

impl FailureDetector for BannageFailureDetector {
    fn record_success(&self, node: &Node, request_time_ms: u64) {
        let Ok(mut health) = self.health.lock() else {
            return;
        };
        let entry = health.entry(node.id()).or_default();
        entry.successes += 1;
        entry.total_latency_ms += request_time_ms;
        entry.last_exception = None;
    }

    fn record_exception(&self, node: &Node, request_time_ms: u64, error: &StoreError) {
        let Ok(mut health) = self.health.lock() else {
            return;
        };
        let entry = health.entry(node.id()).or_default();
        entry.exceptions += 1;
        entry.total_latency_ms += request_time_ms;
        entry.last_exception = Some(Instant::now());
        tracing::debug!(
            node = %node,
            request_time_ms,
            %error,
            "recorded exception; node banned for {:?}",
            self.bannage
        );
    }

    fn is_available(&self, node: &Node) -> bool {
        self.with_health(node, |health| match health.last_exception {
            Some(at) => at.elapsed() >= self.bannage,
            None => true,
        })
        .unwrap_or(true)
    }
}
