//! Creates, validates and retires pooled transports.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use crate::config::ClientConfig;
use crate::metrics;

use super::{ConnectionId, Destination, SocketAndStreams};

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("i/o failure for {destination}: {source}")]
    Io {
        destination: Destination,
        #[source]
        source: io::Error,
    },
    #[error("{destination} did not resolve to an address")]
    Unresolvable { destination: Destination },
    #[error("{proposed} is not an acceptable protocol for the server")]
    ProtocolRejected { proposed: &'static str },
    #[error("unknown server response: {response}")]
    UnknownResponse { response: String },
}

impl SocketError {
    fn io(destination: &Destination, source: io::Error) -> Self {
        SocketError::Io {
            destination: destination.clone(),
            source,
        }
    }
}

/// Factory over [`Destination`]: `create`, `destroy`, `validate`, plus the
/// generational-invalidation extension `mark_destination_closed`.
///
/// Shared by every pipeline in the process. Counters are atomic; the
/// timestamp maps are locked per operation and no compound invariant spans
/// multiple keys.
///
/// The generational scheme closes a race where a destination is
/// reconfigured while transports are outstanding with callers: the factory
/// remembers when each destination's pool was last invalidated, and any
/// transport created at or before that instant fails validation when it
/// comes back.
pub struct SocketResourceFactory {
    so_timeout: Duration,
    socket_buffer_size: usize,
    require_create_timestamp: bool,
    created: AtomicU64,
    destroyed: AtomicU64,
    next_connection_id: AtomicU64,
    destination_closed_at: Mutex<HashMap<Destination, Instant>>,
    socket_created_at: Mutex<HashMap<ConnectionId, Instant>>,
}

impl SocketResourceFactory {
    pub fn new(so_timeout: Duration, socket_buffer_size: usize) -> Self {
        Self {
            so_timeout,
            socket_buffer_size,
            require_create_timestamp: false,
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            next_connection_id: AtomicU64::new(0),
            destination_closed_at: Mutex::new(HashMap::new()),
            socket_created_at: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let mut factory = Self::new(config.so_timeout(), config.socket_buffer_size);
        factory.require_create_timestamp = config.strict_validation;
        factory
    }

    /// Treat a missing creation timestamp as an invalid verdict instead of
    /// the default warn-only behaviour.
    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.require_create_timestamp = strict;
        self
    }

    pub fn so_timeout(&self) -> Duration {
        self.so_timeout
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Number of live transports holding a creation timestamp.
    pub fn tracked_connections(&self) -> usize {
        self.socket_created_at
            .lock()
            .expect("socket timestamp lock poisoned")
            .len()
    }

    /// Open, configure and handshake a transport to `dest`.
    pub fn create(&self, dest: &Destination) -> Result<SocketAndStreams, SocketError> {
        let addr = resolve(dest)?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| SocketError::io(dest, e))?;
        socket
            .set_recv_buffer_size(self.socket_buffer_size)
            .map_err(|e| SocketError::io(dest, e))?;
        socket
            .set_send_buffer_size(self.socket_buffer_size)
            .map_err(|e| SocketError::io(dest, e))?;
        socket
            .set_nodelay(true)
            .map_err(|e| SocketError::io(dest, e))?;
        socket
            .set_read_timeout(Some(self.so_timeout))
            .map_err(|e| SocketError::io(dest, e))?;
        socket
            .connect_timeout(&addr.into(), self.so_timeout)
            .map_err(|e| SocketError::io(dest, e))?;

        let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            connection = created,
            %dest,
            protocol = dest.protocol().code(),
            "created socket"
        );
        metrics::connection_created(dest);
        self.log_buffer_sizes(&socket);

        let stream: TcpStream = socket.into();
        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let mut sands = SocketAndStreams::new(id, stream, dest.protocol())
            .map_err(|e| SocketError::io(dest, e))?;

        // The creation timestamp is only recorded once the handshake has
        // succeeded; a transport that failed negotiation is dropped here and
        // never enters a pool.
        self.negotiate_protocol(&mut sands, dest)?;
        self.socket_created_at
            .lock()
            .expect("socket timestamp lock poisoned")
            .insert(id, Instant::now());

        Ok(sands)
    }

    /// Close the transport unconditionally and forget its creation
    /// timestamp. Consumes the transport, so double-destroy cannot happen.
    pub fn destroy(&self, dest: &Destination, sands: SocketAndStreams) {
        sands.shutdown();
        self.socket_created_at
            .lock()
            .expect("socket timestamp lock poisoned")
            .remove(&sands.id());
        let destroyed = self.destroyed.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(connection = %sands.id(), destroyed, %dest, "destroyed socket");
        metrics::connection_destroyed(dest);
    }

    /// Whether `sands` may be handed back out for `dest`.
    ///
    /// False when the transport was created at or before the destination's
    /// last close mark, or when the transport itself is no longer alive. A
    /// transport with no recorded creation timestamp is warned about but not
    /// invalidated unless strict validation was requested.
    pub fn validate(&self, dest: &Destination, sands: &SocketAndStreams) -> bool {
        let created_at = self
            .socket_created_at
            .lock()
            .expect("socket timestamp lock poisoned")
            .get(&sands.id())
            .copied();
        let closed_at = self
            .destination_closed_at
            .lock()
            .expect("destination timestamp lock poisoned")
            .get(dest)
            .copied();

        match created_at {
            Some(created_at) => {
                if let Some(closed_at) = closed_at {
                    if created_at <= closed_at {
                        tracing::debug!(
                            connection = %sands.id(),
                            %dest,
                            "socket predates destination close; invalidating"
                        );
                        return false;
                    }
                }
            }
            None => {
                tracing::warn!(connection = %sands.id(), %dest, "socket has no creation timestamp");
                if self.require_create_timestamp {
                    return false;
                }
            }
        }

        let alive = sands.is_alive();
        if !alive {
            tracing::debug!(connection = %sands.id(), %dest, "socket is no longer alive");
        }
        alive
    }

    /// Note the instant at which `dest`'s pool was invalidated.
    ///
    /// Transports already idle in a pool are the pool's job to purge;
    /// in-flight transports are caught here when they are validated on
    /// check-in, because their creation timestamp precedes this mark.
    pub fn mark_destination_closed(&self, dest: &Destination) {
        self.destination_closed_at
            .lock()
            .expect("destination timestamp lock poisoned")
            .insert(dest.clone(), Instant::now());
    }

    /// Factory teardown: forget all timestamps.
    pub fn close(&self) {
        self.destination_closed_at
            .lock()
            .expect("destination timestamp lock poisoned")
            .clear();
        self.socket_created_at
            .lock()
            .expect("socket timestamp lock poisoned")
            .clear();
    }

    fn negotiate_protocol(
        &self,
        sands: &mut SocketAndStreams,
        dest: &Destination,
    ) -> Result<(), SocketError> {
        let proposal = dest.protocol().code().as_bytes();
        let writer = sands.writer();
        writer
            .write_all(proposal)
            .map_err(|e| SocketError::io(dest, e))?;
        writer.flush().map_err(|e| SocketError::io(dest, e))?;

        let mut response = [0u8; 2];
        sands
            .reader()
            .read_exact(&mut response)
            .map_err(|e| SocketError::io(dest, e))?;

        match &response {
            b"ok" => Ok(()),
            b"no" => Err(SocketError::ProtocolRejected {
                proposed: dest.protocol().code(),
            }),
            other => Err(SocketError::UnknownResponse {
                response: String::from_utf8_lossy(other).into_owned(),
            }),
        }
    }

    // You often don't get out what you put in: the OS may clamp or double
    // the requested buffer sizes.
    fn log_buffer_sizes(&self, socket: &Socket) {
        if let Ok(actual) = socket.recv_buffer_size() {
            if actual != self.socket_buffer_size {
                tracing::debug!(
                    requested = self.socket_buffer_size,
                    actual,
                    "receive buffer size differs from requested"
                );
            }
        }
        if let Ok(actual) = socket.send_buffer_size() {
            if actual != self.socket_buffer_size {
                tracing::debug!(
                    requested = self.socket_buffer_size,
                    actual,
                    "send buffer size differs from requested"
                );
            }
        }
    }
}

fn resolve(dest: &Destination) -> Result<SocketAddr, SocketError> {
    (dest.host(), dest.port())
        .to_socket_addrs()
        .map_err(|e| SocketError::io(dest, e))?
        .next()
        .ok_or_else(|| SocketError::Unresolvable {
            destination: dest.clone(),
        })
}
