//! Serial fallback stage of the quorum pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cluster::{Node, NodeId};
use crate::failure::FailureDetector;
use crate::store::{Store, StoreError};

use super::super::data::{FatalError, PipelineData, RequestCompleted};
use super::super::pipeline::{Action, Event, Pipeline};

/// The caller-supplied closure encoding which store operation to perform.
/// This is the sole point of operation-specificity in the stage.
pub type StoreRequest<V> = Box<dyn Fn(&Node, &dyn Store) -> Result<V, StoreError>>;

/// Makes up a quorum shortfall with blocking per-node requests.
///
/// An earlier parallel stage may have left fewer than `preferred`
/// successes; this stage walks the remaining candidates in order, issuing
/// one blocking request at a time, until the pipeline has `preferred`
/// successes or runs out of nodes. It then steers the pipeline by whether
/// `required` successes were reached.
pub struct PerformSerialRequests<V> {
    required: usize,
    preferred: usize,
    stores: HashMap<NodeId, Arc<dyn Store>>,
    failure_detector: Arc<dyn FailureDetector>,
    store_request: StoreRequest<V>,
    complete_event: Event,
    insufficient_successes_event: Option<Event>,
}

impl<V> PerformSerialRequests<V> {
    pub fn new(
        required: usize,
        preferred: usize,
        stores: HashMap<NodeId, Arc<dyn Store>>,
        failure_detector: Arc<dyn FailureDetector>,
        store_request: StoreRequest<V>,
        complete_event: Event,
    ) -> Self {
        debug_assert!(required <= preferred);
        Self {
            required,
            preferred,
            stores,
            failure_detector,
            store_request,
            complete_event,
            insufficient_successes_event: None,
        }
    }

    /// Hand off to another recovery stage instead of failing when fewer
    /// than `required` successes were accumulated.
    pub fn with_insufficient_successes_event(mut self, event: Event) -> Self {
        self.insufficient_successes_event = Some(event);
        self
    }

    /// Box into the closure form the [`PipelineRunner`] registry takes.
    ///
    /// [`PipelineRunner`]: super::super::pipeline::PipelineRunner
    pub fn into_action(self) -> Action<V>
    where
        V: 'static,
    {
        Box::new(move |pipeline, data, _event| self.execute(pipeline, data))
    }

    pub fn execute(&self, pipeline: &mut Pipeline, data: &mut PipelineData<V>) {
        while data.successes() < self.preferred && data.node_index() < data.nodes().len() {
            let node = data.nodes()[data.node_index()].clone();
            let start = Instant::now();

            let outcome = match self.stores.get(&node.id()) {
                Some(store) => (self.store_request)(&node, store.as_ref()),
                None => Err(StoreError::other(format!("no store registered for {node}"))),
            };

            match outcome {
                Ok(result) => {
                    let request_time_ms = elapsed_ms(start);
                    data.increment_successes();
                    let key = data.key().clone();
                    data.push_interim_result(RequestCompleted {
                        node: node.clone(),
                        key,
                        request_time_ms,
                        result,
                    });
                    self.failure_detector.record_success(&node, request_time_ms);
                }
                Err(error @ StoreError::Unreachable(_)) => {
                    let request_time_ms = elapsed_ms(start);
                    data.record_failure(error.clone());
                    self.failure_detector
                        .record_exception(&node, request_time_ms, &error);
                }
                Err(StoreError::Application(fault)) => {
                    // Authoritative: no further nodes are tried, and the
                    // cursor stays on this node.
                    data.set_fatal_error(FatalError::Application(fault));
                    pipeline.add_event(Event::Error);
                    return;
                }
                Err(error @ StoreError::Other { .. }) => {
                    tracing::warn!(
                        operation = %pipeline.operation(),
                        %node,
                        %error,
                        "error during serial request"
                    );
                    data.record_failure(error);
                }
            }

            data.advance_node_index();
        }

        if data.successes() < self.required {
            if let Some(event) = self.insufficient_successes_event {
                pipeline.add_event(event);
            } else {
                data.set_fatal_error(FatalError::InsufficientOperationalNodes {
                    required: self.required,
                    operation: pipeline.operation(),
                    successes: data.successes(),
                    failures: data.failures().to_vec(),
                });
                pipeline.add_event(Event::Error);
            }
        } else {
            pipeline.add_event(self.complete_event);
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Node;
    use crate::failure::NoopFailureDetector;
    use crate::routed::Operation;
    use crate::socket::WireProtocol;
    use crate::store::ByteKey;

    struct FixedStore(Result<Option<Vec<u8>>, StoreError>);

    impl Store for FixedStore {
        fn get(&self, _key: &ByteKey) -> Result<Option<Vec<u8>>, StoreError> {
            self.0.clone()
        }

        fn put(&self, _key: &ByteKey, _value: Vec<u8>) -> Result<(), StoreError> {
            Ok(())
        }

        fn delete(&self, _key: &ByteKey) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    fn node(id: u32) -> Node {
        Node::new(NodeId(id), "localhost", 6666, WireProtocol::NativeV1)
    }

    fn get_request() -> StoreRequest<Option<Vec<u8>>> {
        Box::new(|_, store| store.get(&ByteKey::from("k")))
    }

    fn action_with(
        required: usize,
        preferred: usize,
        stores: HashMap<NodeId, Arc<dyn Store>>,
    ) -> PerformSerialRequests<Option<Vec<u8>>> {
        PerformSerialRequests::new(
            required,
            preferred,
            stores,
            Arc::new(NoopFailureDetector),
            get_request(),
            Event::Completed,
        )
    }

    #[test]
    fn empty_candidate_list_skips_the_loop() {
        let action = action_with(0, 0, HashMap::new());
        let mut pipeline = Pipeline::new(Operation::Get);
        let mut data = PipelineData::new(ByteKey::from("k"), Vec::new());

        action.execute(&mut pipeline, &mut data);

        assert_eq!(pipeline.next_event(), Some(Event::Completed));
        assert_eq!(data.node_index(), 0);
    }

    #[test]
    fn zero_preferred_still_decides_success_or_failure() {
        // preferred == 0: the loop never runs, and required == 0 is already
        // satisfied by zero successes.
        let action = action_with(0, 0, HashMap::new());
        let mut pipeline = Pipeline::new(Operation::Get);
        let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0)]);

        action.execute(&mut pipeline, &mut data);

        assert_eq!(pipeline.next_event(), Some(Event::Completed));
        assert_eq!(data.node_index(), 0);
        assert!(data.fatal_error().is_none());
    }

    #[test]
    fn missing_store_handle_is_an_unclassified_failure() {
        // Node 0 has no registered store; the attempt is recorded as a
        // failure and the loop moves on to node 1.
        let mut stores: HashMap<NodeId, Arc<dyn Store>> = HashMap::new();
        stores.insert(
            NodeId(1),
            Arc::new(FixedStore(Ok(Some(b"v".to_vec())))) as Arc<dyn Store>,
        );
        let action = action_with(1, 1, stores);
        let mut pipeline = Pipeline::new(Operation::Get);
        let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0), node(1)]);

        action.execute(&mut pipeline, &mut data);

        assert_eq!(pipeline.next_event(), Some(Event::Completed));
        assert_eq!(data.successes(), 1);
        assert_eq!(data.failures().len(), 1);
        assert!(matches!(data.failures()[0], StoreError::Other { .. }));
        assert_eq!(data.node_index(), 2);
    }

    #[test]
    fn exhausted_cursor_runs_only_the_post_loop_branch() {
        let mut stores: HashMap<NodeId, Arc<dyn Store>> = HashMap::new();
        stores.insert(
            NodeId(0),
            Arc::new(FixedStore(Ok(Some(b"v".to_vec())))) as Arc<dyn Store>,
        );
        let action = action_with(1, 1, stores);
        let mut pipeline = Pipeline::new(Operation::Get);
        let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0)]);
        data.set_node_index(1);

        action.execute(&mut pipeline, &mut data);

        // No successes were accumulated and no candidates remain.
        assert_eq!(pipeline.next_event(), Some(Event::Error));
        assert!(matches!(
            data.fatal_error(),
            Some(FatalError::InsufficientOperationalNodes { .. })
        ));
    }
}
