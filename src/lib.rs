#![forbid(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod failure;
pub mod metrics;
pub mod routed;
pub mod socket;
pub mod store;
pub mod telemetry;

pub use error::{Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the routing surface at the crate root for convenience
pub use crate::cluster::{Node, NodeId};
pub use crate::config::{ClientConfig, LogFormat, LoggingConfig};
pub use crate::failure::{BannageFailureDetector, FailureDetector, NoopFailureDetector};
pub use crate::routed::{
    Action, Event, FatalError, Operation, PerformSerialRequests, Pipeline, PipelineData,
    PipelineError, PipelineRunner, RequestCompleted, StoreRequest,
};
pub use crate::socket::{
    ConnectionId, Destination, PoolConfig, PoolError, SocketAndStreams, SocketError, SocketPool,
    SocketResourceFactory, WireProtocol,
};
pub use crate::store::{ApplicationError, ByteKey, Store, StoreError};
