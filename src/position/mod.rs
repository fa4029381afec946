//! Position lifecycle: state machine, exit rules and the controller that
//! drives a position from signal to settlement

pub mod controller;
pub mod exit;
pub mod types;

pub use controller::PositionController;
pub use types::{ExitTrigger, Position, PositionState};
