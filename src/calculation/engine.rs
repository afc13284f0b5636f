//! The payroll calculation engine.
//!
//! [`CalculationEngine::calculate`] is a pure function of the period, the
//! payroll info snapshot and the configuration. Results are ordered by
//! employee id and carry no ids or timestamps, so repeating a calculation
//! with the same inputs yields identical output.

use std::collections::BTreeMap;

use crate::config::PayrollConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AuditTrace, CalculationOutcome, EmployeePay, EmployeePayrollInfo, PayrollPeriod,
    SkippedEmployee,
};

use super::deductions::apply_deductions;
use super::gross_pay::calculate_gross_pay;

/// Computes per-employee pay for a period.
#[derive(Debug, Clone)]
pub struct CalculationEngine {
    config: PayrollConfig,
}

impl CalculationEngine {
    /// Creates an engine for the given configuration.
    pub fn new(config: PayrollConfig) -> Self {
        Self { config }
    }

    /// Returns the engine's configuration.
    pub fn config(&self) -> &PayrollConfig {
        &self.config
    }

    /// Calculates every eligible employee.
    ///
    /// Employees that are inactive, or whose payroll info does not overlap
    /// the period, are left out. Employees whose info cannot be calculated
    /// are listed in `skipped`; the rest are still calculated.
    pub fn calculate(
        &self,
        period: &PayrollPeriod,
        payroll_info: &[EmployeePayrollInfo],
    ) -> CalculationOutcome {
        self.calculate_with_progress(period, payroll_info, |_, _| {})
    }

    /// Like [`calculate`](Self::calculate), calling `on_progress(done, total)`
    /// after each eligible employee.
    pub fn calculate_with_progress<F>(
        &self,
        period: &PayrollPeriod,
        payroll_info: &[EmployeePayrollInfo],
        mut on_progress: F,
    ) -> CalculationOutcome
    where
        F: FnMut(usize, usize),
    {
        let mut by_employee: BTreeMap<&str, Vec<&EmployeePayrollInfo>> = BTreeMap::new();
        for info in payroll_info
            .iter()
            .filter(|i| i.active && i.is_effective_during(period.start_date, period.end_date))
        {
            by_employee.entry(info.employee_id.as_str()).or_default().push(info);
        }

        let total = by_employee.len();
        let mut outcome = CalculationOutcome::default();

        for (done, (employee_id, records)) in by_employee.into_iter().enumerate() {
            let result = match records.as_slice() {
                [info] => self.calculate_employee(period, info),
                _ => Err(EngineError::InvalidPayrollInfo {
                    employee_id: employee_id.to_string(),
                    message: format!("{} payroll records overlap the period", records.len()),
                }),
            };

            match result {
                Ok(pay) => outcome.results.push(pay),
                Err(err) => outcome.skipped.push(SkippedEmployee {
                    employee_id: employee_id.to_string(),
                    reason: err.to_string(),
                }),
            }
            on_progress(done + 1, total);
        }

        outcome
    }

    /// Calculates a single employee.
    pub fn calculate_employee(
        &self,
        period: &PayrollPeriod,
        info: &EmployeePayrollInfo,
    ) -> EngineResult<EmployeePay> {
        let mut audit_trace = AuditTrace::default();

        let gross = calculate_gross_pay(info, period, &self.config, audit_trace.next_step_number())?;
        audit_trace.push(gross.audit_step);

        let (deductions, state) =
            apply_deductions(info, gross.gross_pay, &self.config, &mut audit_trace)?;

        Ok(EmployeePay {
            employee_id: info.employee_id.clone(),
            gross_pay: gross.gross_pay,
            deductions,
            total_deductions: state.total,
            net_pay: state.remaining(),
            audit_trace,
        })
    }
}
