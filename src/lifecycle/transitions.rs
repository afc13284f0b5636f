//! The period state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::PeriodStatus;

/// Something that moves a period between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodAction {
    /// Start a calculation run.
    Recalculate,
    /// Lock the period's results.
    Approve,
    /// Abandon the period.
    Cancel,
    /// A calculation run saved its results.
    CompleteRun,
}

impl fmt::Display for PeriodAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeriodAction::Recalculate => "recalculate",
            PeriodAction::Approve => "approve",
            PeriodAction::Cancel => "cancel",
            PeriodAction::CompleteRun => "complete",
        };
        f.write_str(name)
    }
}

/// Returns the status `action` moves a period in `from` to.
///
/// Recalculating a period that is already Calculating is a `Conflict`
/// (a run owns it); every other illegal pair is an `InvalidTransition`.
///
/// ```
/// use payroll_engine::lifecycle::{PeriodAction, next_status};
/// use payroll_engine::models::PeriodStatus;
///
/// assert_eq!(
///     next_status(PeriodStatus::Calculated, PeriodAction::Approve).unwrap(),
///     PeriodStatus::Approved
/// );
/// assert!(next_status(PeriodStatus::Draft, PeriodAction::Approve).is_err());
/// ```
pub fn next_status(from: PeriodStatus, action: PeriodAction) -> EngineResult<PeriodStatus> {
    use PeriodAction::*;
    use PeriodStatus::*;

    match (from, action) {
        (Draft | Calculated, Recalculate) => Ok(Calculating),
        (Calculating, Recalculate) => Err(EngineError::Conflict {
            message: "a calculation run is already in progress for this period".to_string(),
        }),
        (Calculating, CompleteRun) => Ok(Calculated),
        (Calculated, Approve) => Ok(Approved),
        (Draft | Calculating | Calculated, Cancel) => Ok(Cancelled),
        (from, action) => Err(EngineError::InvalidTransition { from, action }),
    }
}
