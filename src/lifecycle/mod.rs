//! Period lifecycle: the state machine, the controller that applies it,
//! and the background runner that executes calculations.

mod controller;
mod runner;
mod transitions;

pub use controller::{PayrollLifecycle, RecalculateAccepted};
pub use transitions::{PeriodAction, next_status};
