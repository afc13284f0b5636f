//! Persistence for payroll periods, their calculations and employee payroll info.
//!
//! [`PeriodStore`] owns periods and calculation batches. Every status change
//! is a compare-and-swap on `(status, version)`, and calculation batches are
//! only accepted while the period is still Calculating at the version the
//! run started from. [`PayrollInfoSource`] is the engine's read-only input,
//! plus the upsert used by the admin API.

mod memory;
mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    CalculationBatch, EmployeePayrollInfo, NewPeriod, PayrollPeriod, PeriodFilter, PeriodStatus,
};

pub use memory::{InMemoryPayrollInfo, InMemoryPeriodStore};
pub use sqlite::SqliteStore;

/// Storage for payroll periods and their calculations.
#[async_trait]
pub trait PeriodStore: Send + Sync {
    /// Stores a new Draft period.
    ///
    /// Fails with `Validation` for an inverted range and `Conflict` when the
    /// range overlaps a non-cancelled period of the same pay group.
    async fn create(&self, input: NewPeriod) -> EngineResult<PayrollPeriod>;

    /// Fetches a period, or `NotFound`.
    async fn get(&self, id: Uuid) -> EngineResult<PayrollPeriod>;

    /// Lists periods matching the filter, ordered by start date.
    async fn list(&self, filter: &PeriodFilter) -> EngineResult<Vec<PayrollPeriod>>;

    /// Moves a period to `next` if it is still at `expected` and `expected_version`.
    ///
    /// Returns the updated period with its version bumped, `Conflict` if the
    /// stored status or version differ, or `NotFound`.
    async fn set_status(
        &self,
        id: Uuid,
        expected: PeriodStatus,
        expected_version: u64,
        next: PeriodStatus,
    ) -> EngineResult<PayrollPeriod>;

    /// Atomically replaces all calculations of a period.
    ///
    /// Only accepted while the period is Calculating at `expected_version`;
    /// `Conflict` otherwise. Readers never see a partially written batch.
    async fn replace_calculations(
        &self,
        period_id: Uuid,
        expected_version: u64,
        batch: CalculationBatch,
    ) -> EngineResult<()>;

    /// Returns the current batch of a period; empty if never calculated.
    async fn calculations(&self, period_id: Uuid) -> EngineResult<CalculationBatch>;

    /// Checks the backing storage is reachable.
    async fn health_check(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// Source of employee payroll info records.
#[async_trait]
pub trait PayrollInfoSource: Send + Sync {
    /// All records, ordered by employee id.
    async fn snapshot(&self) -> EngineResult<Vec<EmployeePayrollInfo>>;

    /// Fetches one employee's record, or `NotFound`.
    async fn get_info(&self, employee_id: &str) -> EngineResult<EmployeePayrollInfo>;

    /// Inserts or replaces an employee's record.
    async fn upsert(&self, info: EmployeePayrollInfo) -> EngineResult<()>;
}

/// Checks a creation request before it touches storage.
pub fn validate_new_period(input: &NewPeriod) -> EngineResult<()> {
    if input.start_date > input.end_date {
        return Err(EngineError::Validation {
            field: "end_date".to_string(),
            message: format!(
                "end date {} is before start date {}",
                input.end_date, input.start_date
            ),
        });
    }
    if input
        .pay_group
        .as_deref()
        .is_some_and(|g| g.trim().is_empty())
    {
        return Err(EngineError::Validation {
            field: "pay_group".to_string(),
            message: "pay group must not be blank".to_string(),
        });
    }
    Ok(())
}

/// Checks a payroll info record before it is stored.
///
/// Missing fields are allowed; they are reported when a period is
/// calculated. Values that are present must make sense.
pub fn validate_payroll_info(info: &EmployeePayrollInfo) -> EngineResult<()> {
    let invalid = |field: &str, message: String| EngineError::Validation {
        field: field.to_string(),
        message,
    };
    if info.employee_id.trim().is_empty() {
        return Err(invalid("employee_id", "employee id must not be blank".to_string()));
    }
    if info.rate.is_some_and(|r| r.is_sign_negative()) {
        return Err(invalid("rate", "rate must not be negative".to_string()));
    }
    if info.hours.is_some_and(|h| h.is_sign_negative()) {
        return Err(invalid("hours", "hours must not be negative".to_string()));
    }
    if info.effective_to.is_some_and(|to| to < info.effective_from) {
        return Err(invalid(
            "effective_to",
            "effective_to is before effective_from".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn overlap_conflict(existing: &PayrollPeriod) -> EngineError {
    EngineError::Conflict {
        message: format!(
            "period overlaps {} ({} to {}) in pay group '{}'",
            existing.id, existing.start_date, existing.end_date, existing.pay_group
        ),
    }
}

pub(crate) fn status_conflict(
    current: &PayrollPeriod,
    expected: PeriodStatus,
    expected_version: u64,
) -> EngineError {
    EngineError::Conflict {
        message: format!(
            "period {} is '{}' at version {}, expected '{}' at version {}",
            current.id, current.status, current.version, expected, expected_version
        ),
    }
}

pub(crate) fn batch_period_mismatch(period_id: Uuid, batch: &CalculationBatch) -> EngineError {
    EngineError::Validation {
        field: "period_id".to_string(),
        message: format!(
            "batch belongs to period {}, not {}",
            batch.period_id, period_id
        ),
    }
}
