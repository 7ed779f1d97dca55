//! Blocking per-node store handles and their error taxonomy.

use std::fmt;

use thiserror::Error;

/// An opaque byte-array key. Content-defined; never interpreted by the
/// routing layer.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteKey(Vec<u8>);

impl ByteKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for ByteKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ByteKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for ByteKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for ByteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteKey(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// A blocking store handle for a single node.
///
/// Implementations sit on top of a pooled transport; the routing layer
/// borrows a handle for one attempt and never retains it across node
/// iterations.
pub trait Store: Send + Sync {
    fn get(&self, key: &ByteKey) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &ByteKey, value: Vec<u8>) -> Result<(), StoreError>;

    fn delete(&self, key: &ByteKey) -> Result<bool, StoreError>;
}

/// A non-retryable application-level fault reported by a store.
///
/// These are authoritative: the server understood the request and rejected
/// it for semantic reasons, so contacting further replicas cannot help.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ApplicationError {
    #[error("obsolete version for key: {0}")]
    ObsoleteVersion(String),
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("store is rebalancing: {0}")]
    Rebalancing(String),
}

/// The outcome taxonomy for a single per-node request.
///
/// Payloads are plain strings so the pipeline can store, clone and compare
/// recorded failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transport-level failure. The only variant that feeds the failure
    /// detector.
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// Authoritative semantic fault; aborts the pipeline.
    #[error(transparent)]
    Application(#[from] ApplicationError),

    /// Anything else that went wrong during the request. Recorded as a
    /// failure but not treated as a liveness signal.
    #[error("{message}")]
    Other {
        message: String,
        cause: Option<String>,
    },
}

impl StoreError {
    pub fn other(message: impl Into<String>) -> Self {
        StoreError::Other {
            message: message.into(),
            cause: None,
        }
    }

    pub fn other_with_cause(message: impl Into<String>, cause: impl ToString) -> Self {
        StoreError::Other {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Unreachable(_))
    }
}
