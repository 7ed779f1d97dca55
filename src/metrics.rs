//! Minimal metrics emission helpers.
//!
//! Emissions go through an installable sink so tests can capture them; the
//! default sink logs structured events via tracing.

use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::socket::Destination;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricLabel {
    pub key: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricEvent {
    pub name: &'static str,
    pub value: MetricValue,
    pub labels: Vec<MetricLabel>,
}

pub trait MetricSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

struct TracingSink;

impl MetricSink for TracingSink {
    fn record(&self, event: MetricEvent) {
        match event.value {
            MetricValue::Counter(value) | MetricValue::Gauge(value) => {
                tracing::debug!(
                    target: "metrics",
                    metric = event.name,
                    value,
                    labels = ?event.labels
                );
            }
        }
    }
}

fn sink() -> &'static RwLock<Arc<dyn MetricSink>> {
    static SINK: OnceLock<RwLock<Arc<dyn MetricSink>>> = OnceLock::new();
    SINK.get_or_init(|| RwLock::new(Arc::new(TracingSink)))
}

/// Replace the process-wide sink. Intended for tests.
pub fn install_sink(new_sink: Arc<dyn MetricSink>) {
    if let Ok(mut guard) = sink().write() {
        *guard = new_sink;
    }
}

fn emit(name: &'static str, value: MetricValue, labels: Vec<MetricLabel>) {
    let Ok(guard) = sink().read() else {
        return;
    };
    guard.record(MetricEvent {
        name,
        value,
        labels,
    });
}

fn destination_label(dest: &Destination) -> MetricLabel {
    MetricLabel {
        key: "destination",
        value: dest.to_string(),
    }
}

pub fn connection_created(dest: &Destination) {
    emit(
        "socket_connections_created_total",
        MetricValue::Counter(1),
        vec![destination_label(dest)],
    );
}

pub fn connection_destroyed(dest: &Destination) {
    emit(
        "socket_connections_destroyed_total",
        MetricValue::Counter(1),
        vec![destination_label(dest)],
    );
}

pub fn checkout_timeout(dest: &Destination) {
    emit(
        "socket_checkout_timeouts_total",
        MetricValue::Counter(1),
        vec![destination_label(dest)],
    );
}

/// Capturing sink for unit tests.
#[derive(Default)]
pub struct TestSink {
    events: Mutex<Vec<MetricEvent>>,
}

impl TestSink {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl MetricSink for TestSink {
    fn record(&self, event: MetricEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
