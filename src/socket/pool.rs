//! Keyed blocking connection pool backed by [`SocketResourceFactory`].

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::ClientConfig;
use crate::metrics;

use super::{Destination, SocketAndStreams, SocketError, SocketResourceFactory};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timed out after {waited_ms}ms waiting for a connection to {destination}")]
    CheckoutTimeout {
        destination: Destination,
        waited_ms: u64,
    },
    #[error(transparent)]
    Socket(#[from] SocketError),
}

#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    pub max_per_destination: usize,
    pub checkout_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_destination: 6,
            checkout_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            max_per_destination: config.max_connections_per_destination,
            checkout_timeout: config.checkout_timeout(),
        }
    }
}

#[derive(Default)]
struct PoolEntry {
    idle: Vec<SocketAndStreams>,
    // idle plus checked-out transports for this destination
    total: usize,
}

/// Bounded per-destination pool with blocking checkout.
///
/// Idle transports are validated on the way out and on check-in; a
/// transport that fails validation (stale generation or dead socket) is
/// destroyed instead of reused.
pub struct SocketPool {
    factory: Arc<SocketResourceFactory>,
    max_per_destination: usize,
    checkout_timeout: Duration,
    state: Mutex<HashMap<Destination, PoolEntry>>,
    returned: Condvar,
}

impl SocketPool {
    pub fn new(factory: Arc<SocketResourceFactory>, config: PoolConfig) -> Self {
        Self {
            factory,
            max_per_destination: config.max_per_destination,
            checkout_timeout: config.checkout_timeout,
            state: Mutex::new(HashMap::new()),
            returned: Condvar::new(),
        }
    }

    pub fn factory(&self) -> &SocketResourceFactory {
        &self.factory
    }

    pub fn idle_count(&self, dest: &Destination) -> usize {
        let state = self.state.lock().expect("pool lock poisoned");
        state.get(dest).map_or(0, |entry| entry.idle.len())
    }

    pub fn live_count(&self, dest: &Destination) -> usize {
        let state = self.state.lock().expect("pool lock poisoned");
        state.get(dest).map_or(0, |entry| entry.total)
    }

    /// Borrow a transport for `dest`, creating one if the pool is under its
    /// bound, or blocking until one is checked in (up to the checkout
    /// timeout).
    pub fn checkout(&self, dest: &Destination) -> Result<SocketAndStreams, PoolError> {
        let deadline = Instant::now() + self.checkout_timeout;
        let mut state = self.state.lock().expect("pool lock poisoned");
        loop {
            let entry = state.entry(dest.clone()).or_default();

            while let Some(sands) = entry.idle.pop() {
                if self.factory.validate(dest, &sands) {
                    return Ok(sands);
                }
                entry.total -= 1;
                self.factory.destroy(dest, sands);
            }

            if entry.total < self.max_per_destination {
                entry.total += 1;
                drop(state);
                return match self.factory.create(dest) {
                    Ok(sands) => Ok(sands),
                    Err(err) => {
                        let mut state = self.state.lock().expect("pool lock poisoned");
                        if let Some(entry) = state.get_mut(dest) {
                            entry.total -= 1;
                        }
                        self.returned.notify_all();
                        Err(err.into())
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                metrics::checkout_timeout(dest);
                return Err(PoolError::CheckoutTimeout {
                    destination: dest.clone(),
                    waited_ms: self.checkout_timeout.as_millis() as u64,
                });
            }
            let (guard, _) = self
                .returned
                .wait_timeout(state, deadline - now)
                .expect("pool lock poisoned");
            state = guard;
        }
    }

    /// Return a transport. This is the generational catch-point: a
    /// transport created before its destination was marked closed fails
    /// validation here and is destroyed rather than pooled.
    pub fn checkin(&self, dest: &Destination, sands: SocketAndStreams) {
        let mut state = self.state.lock().expect("pool lock poisoned");
        let entry = state.entry(dest.clone()).or_default();
        if self.factory.validate(dest, &sands) {
            entry.idle.push(sands);
        } else {
            entry.total = entry.total.saturating_sub(1);
            self.factory.destroy(dest, sands);
        }
        drop(state);
        self.returned.notify_all();
    }

    /// Administratively invalidate `dest`: every future check-in of an
    /// older-generation transport destroys it, and all currently idle
    /// transports are purged now.
    pub fn close_destination(&self, dest: &Destination) {
        self.factory.mark_destination_closed(dest);

        let mut state = self.state.lock().expect("pool lock poisoned");
        let drained = match state.get_mut(dest) {
            Some(entry) => {
                let drained: Vec<_> = entry.idle.drain(..).collect();
                entry.total -= drained.len();
                drained
            }
            None => Vec::new(),
        };
        drop(state);

        for sands in drained {
            self.factory.destroy(dest, sands);
        }
        self.returned.notify_all();
    }

    /// Tear the pool down: destroy every idle transport, then clear factory
    /// state. The caller must not race this with checkout/checkin traffic.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("pool lock poisoned");
        let drained: Vec<(Destination, Vec<SocketAndStreams>)> = state
            .drain()
            .map(|(dest, entry)| (dest, entry.idle))
            .collect();
        drop(state);

        for (dest, idle) in drained {
            for sands in idle {
                self.factory.destroy(&dest, sands);
            }
        }
        self.factory.close();
        self.returned.notify_all();
    }
}
