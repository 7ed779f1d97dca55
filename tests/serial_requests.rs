//! Scenario tests for the serial fallback stage of the quorum pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quorus::{
    ApplicationError, ByteKey, Event, FailureDetector, FatalError, Node, NodeId, Operation,
    PerformSerialRequests, Pipeline, PipelineData, PipelineRunner, Store, StoreError, StoreRequest,
    WireProtocol,
};

fn node(id: u32) -> Node {
    Node::new(NodeId(id), "localhost", 6660 + id as u16, WireProtocol::NativeV1)
}

/// Store whose `get` yields scripted outcomes in order.
struct ScriptedStore {
    responses: Mutex<Vec<Result<Option<Vec<u8>>, StoreError>>>,
}

impl ScriptedStore {
    fn new(responses: Vec<Result<Option<Vec<u8>>, StoreError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    fn ok(value: &str) -> Self {
        Self::new(vec![Ok(Some(value.as_bytes().to_vec()))])
    }

    fn failing(error: StoreError) -> Self {
        Self::new(vec![Err(error)])
    }
}

impl Store for ScriptedStore {
    fn get(&self, _key: &ByteKey) -> Result<Option<Vec<u8>>, StoreError> {
        let mut responses = self.responses.lock().unwrap();
        assert!(!responses.is_empty(), "store contacted more than scripted");
        responses.remove(0)
    }

    fn put(&self, _key: &ByteKey, _value: Vec<u8>) -> Result<(), StoreError> {
        unimplemented!("scenarios only issue gets")
    }

    fn delete(&self, _key: &ByteKey) -> Result<bool, StoreError> {
        unimplemented!("scenarios only issue gets")
    }
}

/// Store that must never be contacted.
struct UntouchableStore;

impl Store for UntouchableStore {
    fn get(&self, _key: &ByteKey) -> Result<Option<Vec<u8>>, StoreError> {
        panic!("this node must not be contacted");
    }

    fn put(&self, _key: &ByteKey, _value: Vec<u8>) -> Result<(), StoreError> {
        panic!("this node must not be contacted");
    }

    fn delete(&self, _key: &ByteKey) -> Result<bool, StoreError> {
        panic!("this node must not be contacted");
    }
}

#[derive(Default)]
struct RecordingDetector {
    successes: Mutex<Vec<NodeId>>,
    exceptions: Mutex<Vec<NodeId>>,
}

impl FailureDetector for RecordingDetector {
    fn record_success(&self, node: &Node, _request_time_ms: u64) {
        self.successes.lock().unwrap().push(node.id());
    }

    fn record_exception(&self, node: &Node, _request_time_ms: u64, _error: &StoreError) {
        self.exceptions.lock().unwrap().push(node.id());
    }

    fn is_available(&self, _node: &Node) -> bool {
        true
    }
}

fn get_request() -> StoreRequest<Option<Vec<u8>>> {
    Box::new(|_, store| store.get(&ByteKey::from("k")))
}

fn stores(
    entries: Vec<(u32, Arc<dyn Store>)>,
) -> HashMap<NodeId, Arc<dyn Store>> {
    entries
        .into_iter()
        .map(|(id, store)| (NodeId(id), store))
        .collect()
}

fn result_str(result: &Option<Vec<u8>>) -> &str {
    std::str::from_utf8(result.as_deref().unwrap_or_default()).unwrap()
}

// S1: quorum met on the first pass over the candidates.
#[test]
fn quorum_met_on_first_attempts() {
    let detector = Arc::new(RecordingDetector::default());
    let action = PerformSerialRequests::new(
        2,
        2,
        stores(vec![
            (0, Arc::new(ScriptedStore::ok("a")) as Arc<dyn Store>),
            (1, Arc::new(ScriptedStore::ok("b")) as Arc<dyn Store>),
            (2, Arc::new(UntouchableStore) as Arc<dyn Store>),
        ]),
        detector.clone(),
        get_request(),
        Event::Completed,
    );

    let mut pipeline = Pipeline::new(Operation::Get);
    let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0), node(1), node(2)]);
    action.execute(&mut pipeline, &mut data);

    assert_eq!(pipeline.next_event(), Some(Event::Completed));
    assert_eq!(pipeline.next_event(), None);
    assert_eq!(data.successes(), 2);
    assert_eq!(data.node_index(), 2);
    assert!(data.failures().is_empty());
    assert!(data.fatal_error().is_none());

    let results = data.interim_results();
    assert_eq!(results.len(), 2);
    assert_eq!(result_str(&results[0].result), "a");
    assert_eq!(result_str(&results[1].result), "b");
    assert_eq!(results[0].node.id(), NodeId(0));
    assert_eq!(results[1].node.id(), NodeId(1));
    assert_eq!(*detector.successes.lock().unwrap(), vec![NodeId(0), NodeId(1)]);
}

// S2: a shortfall from an earlier stage is made up serially, skipping an
// unreachable candidate along the way.
#[test]
fn shortfall_made_up_serially() {
    let detector = Arc::new(RecordingDetector::default());
    let action = PerformSerialRequests::new(
        2,
        3,
        stores(vec![
            (0, Arc::new(UntouchableStore) as Arc<dyn Store>),
            (1, Arc::new(UntouchableStore) as Arc<dyn Store>),
            (
                2,
                Arc::new(ScriptedStore::failing(StoreError::Unreachable(
                    "connection refused".to_string(),
                ))) as Arc<dyn Store>,
            ),
            (3, Arc::new(ScriptedStore::ok("c")) as Arc<dyn Store>),
            (4, Arc::new(ScriptedStore::ok("d")) as Arc<dyn Store>),
        ]),
        detector.clone(),
        get_request(),
        Event::Completed,
    );

    let mut pipeline = Pipeline::new(Operation::Get);
    let mut data = PipelineData::new(
        ByteKey::from("k"),
        vec![node(0), node(1), node(2), node(3), node(4)],
    );
    // An earlier parallel stage already attempted nodes 0 and 1 and got one
    // success out of them.
    data.set_node_index(2);
    data.increment_successes();

    action.execute(&mut pipeline, &mut data);

    assert_eq!(pipeline.next_event(), Some(Event::Completed));
    assert_eq!(data.successes(), 3);
    assert_eq!(data.node_index(), 5);
    assert_eq!(data.failures().len(), 1);
    assert!(data.failures()[0].is_unreachable());
    assert_eq!(*detector.exceptions.lock().unwrap(), vec![NodeId(2)]);
    assert_eq!(*detector.successes.lock().unwrap(), vec![NodeId(3), NodeId(4)]);
    // Only the serial attempts produce interim results here.
    assert_eq!(data.interim_results().len(), 2);
}

// S3: every candidate unreachable and no hand-off configured.
#[test]
fn insufficient_operational_nodes() {
    let detector = Arc::new(RecordingDetector::default());
    let action = PerformSerialRequests::new(
        2,
        2,
        stores(vec![
            (
                0,
                Arc::new(ScriptedStore::failing(StoreError::Unreachable(
                    "timeout".to_string(),
                ))) as Arc<dyn Store>,
            ),
            (
                1,
                Arc::new(ScriptedStore::failing(StoreError::Unreachable(
                    "refused".to_string(),
                ))) as Arc<dyn Store>,
            ),
        ]),
        detector.clone(),
        get_request(),
        Event::Completed,
    );

    let mut pipeline = Pipeline::new(Operation::Get);
    let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0), node(1)]);
    action.execute(&mut pipeline, &mut data);

    assert_eq!(pipeline.next_event(), Some(Event::Error));
    assert_eq!(pipeline.next_event(), None);
    assert_eq!(data.failures().len(), 2);
    let fatal = data.fatal_error().expect("fatal error");
    assert_eq!(fatal.to_string(), "2 Gets required, but 0 succeeded");
    match fatal {
        FatalError::InsufficientOperationalNodes { failures, .. } => {
            assert_eq!(failures.len(), 2)
        }
        other => panic!("unexpected fatal error: {other}"),
    }
}

// S4: an application error is authoritative and short-circuits without
// advancing past the failing node.
#[test]
fn application_error_short_circuits() {
    let detector = Arc::new(RecordingDetector::default());
    let action = PerformSerialRequests::new(
        2,
        3,
        stores(vec![
            (0, Arc::new(ScriptedStore::ok("a")) as Arc<dyn Store>),
            (
                1,
                Arc::new(ScriptedStore::failing(StoreError::Application(
                    ApplicationError::ObsoleteVersion("k".to_string()),
                ))) as Arc<dyn Store>,
            ),
            (2, Arc::new(UntouchableStore) as Arc<dyn Store>),
        ]),
        detector.clone(),
        get_request(),
        Event::Completed,
    );

    let mut pipeline = Pipeline::new(Operation::Put);
    let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0), node(1), node(2)]);
    action.execute(&mut pipeline, &mut data);

    assert_eq!(pipeline.next_event(), Some(Event::Error));
    assert_eq!(pipeline.next_event(), None);
    assert_eq!(data.successes(), 1);
    // The cursor still points at the failing node.
    assert_eq!(data.node_index(), 1);
    assert!(matches!(
        data.fatal_error(),
        Some(FatalError::Application(ApplicationError::ObsoleteVersion(_)))
    ));
    // Application faults are not liveness signals.
    assert!(detector.exceptions.lock().unwrap().is_empty());
}

// An unclassified error is recorded but does not touch the detector.
#[test]
fn unclassified_error_continues_without_detector_signal() {
    let detector = Arc::new(RecordingDetector::default());
    let action = PerformSerialRequests::new(
        1,
        1,
        stores(vec![
            (
                0,
                Arc::new(ScriptedStore::failing(StoreError::other(
                    "unexpected response shape",
                ))) as Arc<dyn Store>,
            ),
            (1, Arc::new(ScriptedStore::ok("a")) as Arc<dyn Store>),
        ]),
        detector.clone(),
        get_request(),
        Event::Completed,
    );

    let mut pipeline = Pipeline::new(Operation::Get);
    let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0), node(1)]);
    action.execute(&mut pipeline, &mut data);

    assert_eq!(pipeline.next_event(), Some(Event::Completed));
    assert_eq!(data.failures().len(), 1);
    assert!(detector.exceptions.lock().unwrap().is_empty());
    assert_eq!(*detector.successes.lock().unwrap(), vec![NodeId(1)]);
}

// With a configured hand-off event, a shortfall defers instead of failing.
#[test]
fn shortfall_hands_off_when_configured() {
    let action = PerformSerialRequests::new(
        2,
        2,
        stores(vec![(
            0,
            Arc::new(ScriptedStore::failing(StoreError::Unreachable(
                "refused".to_string(),
            ))) as Arc<dyn Store>,
        )]),
        Arc::new(RecordingDetector::default()),
        get_request(),
        Event::Completed,
    )
    .with_insufficient_successes_event(Event::InsufficientSuccesses);

    let mut pipeline = Pipeline::new(Operation::Get);
    let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0)]);
    action.execute(&mut pipeline, &mut data);

    assert_eq!(pipeline.next_event(), Some(Event::InsufficientSuccesses));
    assert_eq!(pipeline.next_event(), None);
    assert!(data.fatal_error().is_none());
}

// The stage composes with the runner: trigger event in, terminal event out.
#[test]
fn runs_under_the_pipeline_runner() {
    let action = PerformSerialRequests::new(
        1,
        1,
        stores(vec![(0, Arc::new(ScriptedStore::ok("a")) as Arc<dyn Store>)]),
        Arc::new(RecordingDetector::default()),
        get_request(),
        Event::Completed,
    );

    let mut runner = PipelineRunner::new();
    runner.register(Event::Started, action.into_action());

    let mut pipeline = Pipeline::new(Operation::Get);
    let mut data = PipelineData::new(ByteKey::from("k"), vec![node(0)]);
    runner
        .run(&mut pipeline, &mut data, Event::Started)
        .unwrap();

    assert_eq!(data.successes(), 1);
    assert!(data.fatal_error().is_none());
}

// Invariant checks across a mixed run: cursor moves forward by exactly the
// attempts made, and bookkeeping adds up.
#[test]
fn accounting_invariants_hold() {
    let action = PerformSerialRequests::new(
        2,
        3,
        stores(vec![
            (0, Arc::new(ScriptedStore::ok("a")) as Arc<dyn Store>),
            (
                1,
                Arc::new(ScriptedStore::failing(StoreError::other("oops"))) as Arc<dyn Store>,
            ),
            (2, Arc::new(ScriptedStore::ok("b")) as Arc<dyn Store>),
            (
                3,
                Arc::new(ScriptedStore::failing(StoreError::Unreachable(
                    "refused".to_string(),
                ))) as Arc<dyn Store>,
            ),
            (4, Arc::new(ScriptedStore::ok("c")) as Arc<dyn Store>),
        ]),
        Arc::new(RecordingDetector::default()),
        get_request(),
        Event::Completed,
    );

    let mut pipeline = Pipeline::new(Operation::Get);
    let mut data = PipelineData::new(
        ByteKey::from("k"),
        vec![node(0), node(1), node(2), node(3), node(4)],
    );
    let index_before = data.node_index();
    action.execute(&mut pipeline, &mut data);

    assert!(data.node_index() >= index_before);
    assert!(data.node_index() <= data.nodes().len());
    // Every attempted node produced exactly one success or one failure.
    assert_eq!(
        data.successes() + data.failures().len(),
        data.node_index() - index_before
    );
    assert_eq!(data.interim_results().len(), data.successes());
    assert_eq!(data.successes(), 3);
    assert_eq!(data.failures().len(), 2);
    assert_eq!(pipeline.next_event(), Some(Event::Completed));
}
