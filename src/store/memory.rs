//! In-memory stores.
//!
//! Used by tests and by the service when no database URL is configured.
//! Each operation runs under a single write lock, which makes creation,
//! status compare-and-swap and batch replacement atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    CalculationBatch, EmployeePayrollInfo, NewPeriod, PayrollPeriod, PeriodFilter, PeriodStatus,
};

use super::{
    PayrollInfoSource, PeriodStore, batch_period_mismatch, overlap_conflict, status_conflict,
    validate_new_period, validate_payroll_info,
};

#[derive(Debug, Default)]
struct Inner {
    periods: HashMap<Uuid, PayrollPeriod>,
    calculations: HashMap<Uuid, CalculationBatch>,
}

/// Period store backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryPeriodStore {
    inner: RwLock<Inner>,
}

impl InMemoryPeriodStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeriodStore for InMemoryPeriodStore {
    async fn create(&self, input: NewPeriod) -> EngineResult<PayrollPeriod> {
        validate_new_period(&input)?;
        let period = PayrollPeriod::draft(input, Utc::now());

        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.periods.values().find(|p| {
            p.status != PeriodStatus::Cancelled
                && p.overlaps(&period.pay_group, period.start_date, period.end_date)
        }) {
            return Err(overlap_conflict(existing));
        }
        inner.periods.insert(period.id, period.clone());
        Ok(period)
    }

    async fn get(&self, id: Uuid) -> EngineResult<PayrollPeriod> {
        self.inner
            .read()
            .await
            .periods
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::period_not_found(id))
    }

    async fn list(&self, filter: &PeriodFilter) -> EngineResult<Vec<PayrollPeriod>> {
        let inner = self.inner.read().await;
        let mut periods: Vec<PayrollPeriod> = inner
            .periods
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        periods.sort_by(|a, b| (a.start_date, a.id).cmp(&(b.start_date, b.id)));
        Ok(periods)
    }

    async fn set_status(
        &self,
        id: Uuid,
        expected: PeriodStatus,
        expected_version: u64,
        next: PeriodStatus,
    ) -> EngineResult<PayrollPeriod> {
        let mut inner = self.inner.write().await;
        let period = inner
            .periods
            .get_mut(&id)
            .ok_or_else(|| EngineError::period_not_found(id))?;

        if period.status != expected || period.version != expected_version {
            return Err(status_conflict(period, expected, expected_version));
        }

        period.status = next;
        period.version += 1;
        period.updated_at = Utc::now();
        Ok(period.clone())
    }

    async fn replace_calculations(
        &self,
        period_id: Uuid,
        expected_version: u64,
        batch: CalculationBatch,
    ) -> EngineResult<()> {
        if batch.period_id != period_id {
            return Err(batch_period_mismatch(period_id, &batch));
        }

        let mut inner = self.inner.write().await;
        let period = inner
            .periods
            .get(&period_id)
            .ok_or_else(|| EngineError::period_not_found(period_id))?;

        if period.status != PeriodStatus::Calculating || period.version != expected_version {
            return Err(status_conflict(
                period,
                PeriodStatus::Calculating,
                expected_version,
            ));
        }

        inner.calculations.insert(period_id, batch);
        Ok(())
    }

    async fn calculations(&self, period_id: Uuid) -> EngineResult<CalculationBatch> {
        let inner = self.inner.read().await;
        if !inner.periods.contains_key(&period_id) {
            return Err(EngineError::period_not_found(period_id));
        }
        Ok(inner
            .calculations
            .get(&period_id)
            .cloned()
            .unwrap_or_else(|| CalculationBatch::empty(period_id)))
    }
}

/// Payroll info records held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryPayrollInfo {
    records: RwLock<BTreeMap<String, EmployeePayrollInfo>>,
}

impl InMemoryPayrollInfo {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source pre-filled with records. Later duplicates win.
    pub fn with_records(records: impl IntoIterator<Item = EmployeePayrollInfo>) -> Self {
        Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|r| (r.employee_id.clone(), r))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl PayrollInfoSource for InMemoryPayrollInfo {
    async fn snapshot(&self) -> EngineResult<Vec<EmployeePayrollInfo>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn get_info(&self, employee_id: &str) -> EngineResult<EmployeePayrollInfo> {
        self.records
            .read()
            .await
            .get(employee_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound {
                entity: "Employee payroll info",
                id: employee_id.to_string(),
            })
    }

    async fn upsert(&self, info: EmployeePayrollInfo) -> EngineResult<()> {
        validate_payroll_info(&info)?;
        self.records
            .write()
            .await
            .insert(info.employee_id.clone(), info);
        Ok(())
    }
}
