//! Pipeline actions.

mod perform_serial_requests;

pub use perform_serial_requests::{PerformSerialRequests, StoreRequest};
