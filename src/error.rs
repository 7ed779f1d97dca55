use thiserror::Error;

use crate::config::ConfigError;
use crate::routed::{FatalError, PipelineError};
use crate::socket::{PoolError, SocketError};
use crate::store::StoreError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Crate-level convenience error: a thin wrapper over the per-module
/// error types.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Store(e) => store_transience(e),
            Error::Fatal(e) => match e {
                FatalError::Application(_) => Transience::Permanent,
                // More nodes may be reachable on a later attempt.
                FatalError::InsufficientOperationalNodes { .. } => Transience::Retryable,
            },
            Error::Pipeline(_) => Transience::Permanent,
            Error::Socket(e) => match e {
                SocketError::Io { .. } | SocketError::Unresolvable { .. } => Transience::Retryable,
                SocketError::ProtocolRejected { .. } | SocketError::UnknownResponse { .. } => {
                    Transience::Permanent
                }
            },
            Error::Pool(e) => match e {
                PoolError::CheckoutTimeout { .. } => Transience::Retryable,
                PoolError::Socket(SocketError::Io { .. })
                | PoolError::Socket(SocketError::Unresolvable { .. }) => Transience::Retryable,
                PoolError::Socket(_) => Transience::Permanent,
            },
            Error::Config(_) => Transience::Permanent,
        }
    }
}

fn store_transience(error: &StoreError) -> Transience {
    match error {
        StoreError::Unreachable(_) => Transience::Retryable,
        StoreError::Application(_) => Transience::Permanent,
        StoreError::Other { .. } => Transience::Unknown,
    }
}
