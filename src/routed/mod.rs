//! Client-side routing state machine.
//!
//! A [`Pipeline`] carries an ordered event queue; a [`PipelineRunner`]
//! dispatches each event to its registered action, and actions steer the
//! pipeline by enqueueing follow-up events while mutating the shared
//! [`PipelineData`] in place.

pub mod action;
mod data;
mod pipeline;

pub use action::{PerformSerialRequests, StoreRequest};
pub use data::{FatalError, PipelineData, RequestCompleted};
pub use pipeline::{Action, Event, Operation, Pipeline, PipelineError, PipelineRunner};
