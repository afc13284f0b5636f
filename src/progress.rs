//! Calculation run tracking.
//!
//! The [`ProgressReporter`] holds every [`CalculationRun`] and at most one
//! active run per period. Reserving a run hands out a [`RunHandle`]; only
//! the handle can move its run forward, and a handle dropped before it
//! finished marks the run failed and frees the period.

use std::sync::Arc;

use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{CalculationRun, RunErrorKind, RunStatus, SkippedEmployee};

/// Shared registry of calculation runs, polled by the API.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    runs: Arc<DashMap<Uuid, CalculationRun>>,
    active: Arc<DashMap<Uuid, Uuid>>,
}

impl ProgressReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a new Pending run for a period.
    ///
    /// Fails with `Conflict` while another run of the same period is not
    /// yet terminal.
    pub fn start(&self, period_id: Uuid) -> EngineResult<RunHandle> {
        match self.active.entry(period_id) {
            Entry::Occupied(existing) => Err(EngineError::Conflict {
                message: format!(
                    "period {} already has an active calculation run {}",
                    period_id,
                    existing.get()
                ),
            }),
            Entry::Vacant(slot) => {
                let run_id = Uuid::new_v4();
                self.runs
                    .insert(run_id, CalculationRun::pending(run_id, period_id, Utc::now()));
                slot.insert(run_id);
                debug!(run_id = %run_id, period_id = %period_id, "Run reserved");
                Ok(RunHandle {
                    reporter: self.clone(),
                    run_id,
                    period_id,
                    finished: false,
                })
            }
        }
    }

    /// Returns a snapshot of a run.
    pub fn get(&self, run_id: Uuid) -> EngineResult<CalculationRun> {
        self.runs
            .get(&run_id)
            .map(|run| run.clone())
            .ok_or_else(|| EngineError::NotFound {
                entity: "Run",
                id: run_id.to_string(),
            })
    }

    /// Returns the non-terminal run of a period, if any.
    pub fn active_run(&self, period_id: Uuid) -> Option<CalculationRun> {
        let run_id = self.active.get(&period_id).map(|id| *id)?;
        self.get(run_id).ok()
    }

    fn record_progress(&self, run_id: Uuid, percent: u8) {
        if let Some(mut run) = self.runs.get_mut(&run_id) {
            if run.status.is_terminal() {
                return;
            }
            run.progress_percent = run.progress_percent.max(percent.min(100));
            run.status = RunStatus::Running;
        }
    }

    fn finish<F>(&self, run_id: Uuid, period_id: Uuid, update: F) -> Option<CalculationRun>
    where
        F: FnOnce(&mut CalculationRun),
    {
        let finished = self.runs.get_mut(&run_id).map(|mut run| {
            update(&mut run);
            run.finished_at = Some(Utc::now());
            run.clone()
        });
        self.active.remove_if(&period_id, |_, active| *active == run_id);
        finished
    }
}

/// Exclusive write access to one run.
#[derive(Debug)]
pub struct RunHandle {
    reporter: ProgressReporter,
    run_id: Uuid,
    period_id: Uuid,
    finished: bool,
}

impl RunHandle {
    /// The run this handle owns.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The period being calculated.
    pub fn period_id(&self) -> Uuid {
        self.period_id
    }

    /// Raises progress. Lower values are ignored and values above 100 are
    /// clamped. The first report moves the run from Pending to Running.
    pub fn report_progress(&self, percent: u8) {
        self.reporter.record_progress(self.run_id, percent);
    }

    /// A cloneable progress callback for the blocking engine task.
    pub fn sink(&self) -> ProgressSink {
        ProgressSink {
            reporter: self.reporter.clone(),
            run_id: self.run_id,
        }
    }

    /// Marks the run Succeeded at 100%.
    ///
    /// If employees were skipped the run still succeeds, flagged with
    /// `PARTIAL_CALCULATION_FAILURE`.
    pub fn complete(
        mut self,
        calculated_count: usize,
        skipped: Vec<SkippedEmployee>,
    ) -> Option<CalculationRun> {
        self.finished = true;
        self.reporter.finish(self.run_id, self.period_id, |run| {
            run.status = RunStatus::Succeeded;
            run.progress_percent = 100;
            run.calculated_count = calculated_count;
            if !skipped.is_empty() {
                run.error_kind = Some(RunErrorKind::PartialCalculationFailure);
                run.error_message = Some(format!(
                    "{} employee(s) could not be calculated",
                    skipped.len()
                ));
            }
            run.skipped = skipped;
        })
    }

    /// Marks the run Failed.
    pub fn fail(mut self, kind: RunErrorKind, message: impl Into<String>) -> Option<CalculationRun> {
        self.finished = true;
        let message = message.into();
        self.reporter.finish(self.run_id, self.period_id, |run| {
            run.status = RunStatus::Failed;
            run.error_kind = Some(kind);
            run.error_message = Some(message);
        })
    }

    /// Forgets a run that never started, as if it had not been reserved.
    pub fn abandon(mut self) {
        self.finished = true;
        self.reporter.runs.remove(&self.run_id);
        self.reporter
            .active
            .remove_if(&self.period_id, |_, active| *active == self.run_id);
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(run_id = %self.run_id, period_id = %self.period_id, "Run handle dropped before finishing");
        self.reporter.finish(self.run_id, self.period_id, |run| {
            run.status = RunStatus::Failed;
            run.error_kind = Some(RunErrorKind::SystemicFailure);
            run.error_message = Some("calculation run ended unexpectedly".to_string());
        });
    }
}

/// Progress callback detached from the handle's ownership.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    reporter: ProgressReporter,
    run_id: Uuid,
}

impl ProgressSink {
    /// Same as [`RunHandle::report_progress`].
    pub fn report(&self, percent: u8) {
        self.reporter.record_progress(self.run_id, percent);
    }
}
