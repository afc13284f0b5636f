//! Calculation run models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SkippedEmployee;

/// The status of a calculation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Reserved, not yet started.
    Pending,
    /// The engine is working.
    Running,
    /// Finished and results were written.
    Succeeded,
    /// Finished without writing results.
    Failed,
}

impl RunStatus {
    /// Returns true once the run can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

/// Why a run finished with a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunErrorKind {
    /// Succeeded, but some employees were skipped.
    PartialCalculationFailure,
    /// The run failed as a whole; the period reverted.
    SystemicFailure,
    /// The period left Calculating before the run finished; results dropped.
    Discarded,
}

/// One execution attempt of the calculation engine against a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRun {
    /// Unique identifier for the run.
    pub id: Uuid,
    /// The period being calculated.
    pub period_id: Uuid,
    /// Current status.
    pub status: RunStatus,
    /// Progress from 0 to 100, never decreasing.
    pub progress_percent: u8,
    /// When the run was reserved.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Kind of problem, if any.
    pub error_kind: Option<RunErrorKind>,
    /// Human-readable problem description.
    pub error_message: Option<String>,
    /// Number of employees calculated.
    pub calculated_count: usize,
    /// Employees skipped with an error.
    pub skipped: Vec<SkippedEmployee>,
}

impl CalculationRun {
    /// A freshly reserved run.
    pub fn pending(id: Uuid, period_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            period_id,
            status: RunStatus::Pending,
            progress_percent: 0,
            started_at: now,
            finished_at: None,
            error_kind: None,
            error_message: None,
            calculated_count: 0,
            skipped: Vec::new(),
        }
    }
}
