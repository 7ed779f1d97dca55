//! Event queue and the event-to-action registry.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use thiserror::Error;

use super::data::PipelineData;

/// A tag driving the routing state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    Started,
    Configured,
    ResponsesReceived,
    InsufficientSuccesses,
    Completed,
    Error,
}

impl Event {
    /// Terminal events end the dispatch loop; no action runs for them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Event::Completed | Event::Error)
    }
}

/// The store operation a pipeline is executing, used for log and error
/// messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Get,
    GetAll,
    GetVersions,
    Put,
    Delete,
}

impl Operation {
    pub fn simple_name(self) -> &'static str {
        match self {
            Operation::Get => "Get",
            Operation::GetAll => "GetAll",
            Operation::GetVersions => "GetVersions",
            Operation::Put => "Put",
            Operation::Delete => "Delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.simple_name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no action registered for {event:?} during {operation}")]
    UnhandledEvent { operation: Operation, event: Event },
}

/// Single-threaded cooperative event queue for one client operation.
///
/// Exactly one action runs at a time; it returns before the next event is
/// dispatched. Actions enqueue follow-up events via [`Pipeline::add_event`].
#[derive(Debug)]
pub struct Pipeline {
    operation: Operation,
    queue: VecDeque<Event>,
}

impl Pipeline {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            queue: VecDeque::new(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn add_event(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Pop the next event in FIFO order.
    pub fn next_event(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Drop everything still queued. A higher layer cancels a pipeline by
    /// draining it before its next event is dispatched.
    pub fn drain(&mut self) {
        self.queue.clear();
    }
}

/// An action: executes synchronously, mutates the pipeline data and
/// enqueues the next event. The dispatched event is passed through for
/// actions registered under more than one trigger.
pub type Action<V> = Box<dyn FnMut(&mut Pipeline, &mut PipelineData<V>, Event)>;

/// Finite map from event tag to action.
pub struct PipelineRunner<V> {
    actions: HashMap<Event, Action<V>>,
}

impl<V> Default for PipelineRunner<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PipelineRunner<V> {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, event: Event, action: F)
    where
        F: FnMut(&mut Pipeline, &mut PipelineData<V>, Event) + 'static,
    {
        self.actions.insert(event, Box::new(action));
    }

    /// Dispatch events one at a time until a terminal event is reached or
    /// the queue drains.
    pub fn run(
        &mut self,
        pipeline: &mut Pipeline,
        data: &mut PipelineData<V>,
        start: Event,
    ) -> Result<(), PipelineError> {
        pipeline.add_event(start);
        while let Some(event) = pipeline.next_event() {
            if event.is_terminal() {
                tracing::debug!(operation = %pipeline.operation(), ?event, "pipeline finished");
                return Ok(());
            }
            let action = self
                .actions
                .get_mut(&event)
                .ok_or(PipelineError::UnhandledEvent {
                    operation: pipeline.operation(),
                    event,
                })?;
            action(pipeline, data, event);
        }
        Ok(())
    }
}
