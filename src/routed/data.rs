//! Mutable state accumulated across pipeline stages.

use thiserror::Error;

use crate::cluster::Node;
use crate::store::{ApplicationError, ByteKey, StoreError};

use super::pipeline::Operation;

/// Record produced whenever a per-node request returns without failure.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestCompleted<V> {
    pub node: Node,
    pub key: ByteKey,
    /// Monotonic elapsed time for this single attempt, in milliseconds.
    pub request_time_ms: u64,
    pub result: V,
}

/// An error that ends the pipeline without a normal completion.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum FatalError {
    #[error(transparent)]
    Application(ApplicationError),

    #[error("{required} {operation}s required, but {successes} succeeded")]
    InsufficientOperationalNodes {
        required: usize,
        operation: Operation,
        successes: usize,
        failures: Vec<StoreError>,
    },
}

/// Per-operation pipeline state, list variant: an ordered candidate list
/// with a cursor, plus everything the stages have accumulated so far.
///
/// Owned by exactly one pipeline; actions mutate it in place.
#[derive(Debug)]
pub struct PipelineData<V> {
    key: ByteKey,
    nodes: Vec<Node>,
    node_index: usize,
    successes: usize,
    failures: Vec<StoreError>,
    interim_results: Vec<RequestCompleted<V>>,
    fatal_error: Option<FatalError>,
}

impl<V> PipelineData<V> {
    /// Seed with the candidate list in preference order. Counters start at
    /// zero and the cursor at the first candidate.
    pub fn new(key: ByteKey, nodes: Vec<Node>) -> Self {
        Self {
            key,
            nodes,
            node_index: 0,
            successes: 0,
            failures: Vec::new(),
            interim_results: Vec::new(),
            fatal_error: None,
        }
    }

    pub fn key(&self) -> &ByteKey {
        &self.key
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_index(&self) -> usize {
        self.node_index
    }

    /// Position the cursor past candidates an earlier stage has already
    /// attempted. The cursor never moves backwards.
    pub fn set_node_index(&mut self, index: usize) {
        debug_assert!(index >= self.node_index);
        self.node_index = index;
    }

    pub fn advance_node_index(&mut self) {
        self.node_index += 1;
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn increment_successes(&mut self) {
        self.successes += 1;
    }

    pub fn failures(&self) -> &[StoreError] {
        &self.failures
    }

    pub fn record_failure(&mut self, error: StoreError) {
        self.failures.push(error);
    }

    pub fn interim_results(&self) -> &[RequestCompleted<V>] {
        &self.interim_results
    }

    pub fn push_interim_result(&mut self, result: RequestCompleted<V>) {
        self.interim_results.push(result);
    }

    /// Hand the accumulated results to a downstream consumer.
    pub fn take_interim_results(&mut self) -> Vec<RequestCompleted<V>> {
        std::mem::take(&mut self.interim_results)
    }

    pub fn fatal_error(&self) -> Option<&FatalError> {
        self.fatal_error.as_ref()
    }

    /// At most one fatal error per pipeline; once set, the pipeline must
    /// not produce a normal completion. The first one wins.
    pub fn set_fatal_error(&mut self, error: FatalError) {
        if self.fatal_error.is_none() {
            self.fatal_error = Some(error);
        }
    }
}
