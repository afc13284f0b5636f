//! The lifecycle controller.
//!
//! All period mutations go through [`PayrollLifecycle`]. Each transition
//! reads the period, checks the state machine, then compare-and-swaps the
//! status at the version it read, so two racing requests cannot both win.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::calculation::CalculationEngine;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    CalculationBatch, CalculationRun, EmployeePayrollInfo, NewPeriod, PayrollPeriod,
    PeriodFilter, PeriodStatus,
};
use crate::progress::ProgressReporter;
use crate::store::{PayrollInfoSource, PeriodStore};

use super::runner::{CalculationJob, run_calculation};
use super::transitions::{PeriodAction, next_status};

/// Returned when a recalculation was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculateAccepted {
    /// The run to poll.
    pub run_id: Uuid,
    /// The period being calculated.
    pub period_id: Uuid,
}

/// Coordinates periods, calculation runs and the engine.
pub struct PayrollLifecycle {
    store: Arc<dyn PeriodStore>,
    payroll_info: Arc<dyn PayrollInfoSource>,
    engine: Arc<CalculationEngine>,
    progress: ProgressReporter,
}

impl PayrollLifecycle {
    /// Creates a controller over the given store, payroll info and engine.
    pub fn new(
        store: Arc<dyn PeriodStore>,
        payroll_info: Arc<dyn PayrollInfoSource>,
        engine: CalculationEngine,
    ) -> Self {
        Self {
            store,
            payroll_info,
            engine: Arc::new(engine),
            progress: ProgressReporter::new(),
        }
    }

    /// The run registry.
    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// The calculation engine.
    pub fn engine(&self) -> &CalculationEngine {
        &self.engine
    }

    /// Validates and stores a new Draft period.
    pub async fn create_period(&self, input: NewPeriod) -> EngineResult<PayrollPeriod> {
        let period = self.store.create(input).await?;
        info!(
            period_id = %period.id,
            pay_group = %period.pay_group,
            start_date = %period.start_date,
            end_date = %period.end_date,
            "Period created"
        );
        Ok(period)
    }

    /// Fetches a period.
    pub async fn get_period(&self, id: Uuid) -> EngineResult<PayrollPeriod> {
        self.store.get(id).await
    }

    /// Lists periods matching a filter.
    pub async fn list_periods(&self, filter: &PeriodFilter) -> EngineResult<Vec<PayrollPeriod>> {
        self.store.list(filter).await
    }

    /// Moves a Draft or Calculated period to Calculating and starts a
    /// background run.
    ///
    /// Returns as soon as the run is reserved and the period is moved; poll
    /// [`run`](Self::run) for progress. Fails with `Conflict` if a run is
    /// already active or the period changed concurrently, and with
    /// `InvalidTransition` for Approved and Cancelled periods even while a
    /// discarded run is still winding down.
    pub async fn recalculate(&self, period_id: Uuid) -> EngineResult<RecalculateAccepted> {
        let handle = match self.progress.start(period_id) {
            Ok(handle) => handle,
            Err(conflict @ EngineError::Conflict { .. }) => {
                let period = self.store.get(period_id).await?;
                next_status(period.status, PeriodAction::Recalculate)?;
                return Err(conflict);
            }
            Err(err) => return Err(err),
        };

        let moved = async {
            let period = self.store.get(period_id).await?;
            let next = next_status(period.status, PeriodAction::Recalculate)?;
            let calculating = self
                .store
                .set_status(period.id, period.status, period.version, next)
                .await?;
            Ok::<_, EngineError>((period.status, calculating))
        }
        .await;

        let (prior_status, calculating) = match moved {
            Ok(moved) => moved,
            Err(err) => {
                handle.abandon();
                return Err(err);
            }
        };

        let accepted = RecalculateAccepted {
            run_id: handle.run_id(),
            period_id,
        };
        info!(
            run_id = %accepted.run_id,
            period_id = %period_id,
            prior_status = %prior_status,
            "Recalculation accepted"
        );

        let job = CalculationJob {
            store: Arc::clone(&self.store),
            payroll_info: Arc::clone(&self.payroll_info),
            engine: Arc::clone(&self.engine),
            period: calculating,
            prior_status,
        };
        tokio::spawn(run_calculation(job, handle));

        Ok(accepted)
    }

    /// Approves a Calculated period.
    ///
    /// Blocked with `PartialCalculationFailure` when the last run skipped
    /// employees, and with `ApprovalBlocked` when there is nothing to pay.
    pub async fn approve(&self, period_id: Uuid) -> EngineResult<PayrollPeriod> {
        let period = self.store.get(period_id).await?;
        let next = next_status(period.status, PeriodAction::Approve)?;

        let batch = self.store.calculations(period_id).await?;
        if !batch.skipped.is_empty() {
            let employee_ids: Vec<String> =
                batch.skipped.iter().map(|s| s.employee_id.clone()).collect();
            warn!(
                period_id = %period_id,
                skipped_count = employee_ids.len(),
                "Approval blocked by skipped employees"
            );
            return Err(EngineError::PartialCalculationFailure { employee_ids });
        }
        if batch.calculations.is_empty() {
            return Err(EngineError::ApprovalBlocked {
                period_id,
                reason: "the period has no calculations".to_string(),
            });
        }

        let approved = self
            .store
            .set_status(period_id, period.status, period.version, next)
            .await?;
        info!(
            period_id = %period_id,
            calculations = batch.calculations.len(),
            "Period approved"
        );
        Ok(approved)
    }

    /// Cancels a period that is not yet Approved.
    ///
    /// Cancelling a Calculating period does not stop its run; the run's
    /// results are discarded when it tries to save them.
    pub async fn cancel(&self, period_id: Uuid) -> EngineResult<PayrollPeriod> {
        let period = self.store.get(period_id).await?;
        let next = next_status(period.status, PeriodAction::Cancel)?;
        let cancelled = self
            .store
            .set_status(period_id, period.status, period.version, next)
            .await?;
        info!(period_id = %period_id, prior_status = %period.status, "Period cancelled");
        Ok(cancelled)
    }

    /// The current calculation batch of a period.
    pub async fn calculations(&self, period_id: Uuid) -> EngineResult<CalculationBatch> {
        self.store.calculations(period_id).await
    }

    /// A snapshot of a calculation run.
    pub fn run(&self, run_id: Uuid) -> EngineResult<CalculationRun> {
        self.progress.get(run_id)
    }

    /// Inserts or replaces an employee's payroll info.
    pub async fn upsert_payroll_info(&self, info: EmployeePayrollInfo) -> EngineResult<()> {
        let employee_id = info.employee_id.clone();
        self.payroll_info.upsert(info).await?;
        info!(employee_id = %employee_id, "Payroll info updated");
        Ok(())
    }

    /// One employee's payroll info, or `NotFound`.
    pub async fn employee_payroll_info(&self, employee_id: &str) -> EngineResult<EmployeePayrollInfo> {
        self.payroll_info.get_info(employee_id).await
    }

    /// Checks the period store is reachable.
    pub async fn health_check(&self) -> EngineResult<()> {
        self.store.health_check().await
    }

    /// All payroll info records, ordered by employee id.
    pub async fn payroll_info(&self) -> EngineResult<Vec<EmployeePayrollInfo>> {
        self.payroll_info.snapshot().await
    }

    /// Returns periods left in Calculating by a previous process to Draft.
    ///
    /// Only meaningful with a persistent store, at startup, before any run
    /// is started. Returns how many periods were reset.
    pub async fn recover_interrupted(&self) -> EngineResult<usize> {
        let stuck = self
            .store
            .list(&PeriodFilter {
                status: Some(PeriodStatus::Calculating),
                pay_group: None,
            })
            .await?;

        let mut recovered = 0;
        for period in stuck {
            if self.progress.active_run(period.id).is_some() {
                continue;
            }
            match self
                .store
                .set_status(
                    period.id,
                    PeriodStatus::Calculating,
                    period.version,
                    PeriodStatus::Draft,
                )
                .await
            {
                Ok(_) => {
                    warn!(period_id = %period.id, "Interrupted calculation reset to draft");
                    recovered += 1;
                }
                Err(EngineError::Conflict { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(recovered)
    }
}
