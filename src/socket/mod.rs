//! Pooled blocking transports and the factory that creates, validates and
//! retires them.

mod destination;
mod factory;
mod pool;
mod protocol;
mod sands;

pub use destination::Destination;
pub use factory::{SocketError, SocketResourceFactory};
pub use pool::{PoolConfig, PoolError, SocketPool};
pub use protocol::WireProtocol;
pub use sands::{ConnectionId, SocketAndStreams};
