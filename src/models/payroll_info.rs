//! Employee payroll info models.
//!
//! These records are the calculation engine's input. Fields the engine needs
//! are optional here: an incomplete record can still be saved from the admin
//! screen, and is reported as skipped when a period is calculated.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How an employee's rate is turned into gross pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateBasis {
    /// `rate` is per hour, multiplied by `hours` worked in the period.
    Hourly,
    /// `rate` is an annual salary, spread over the configured pay periods.
    Salary,
    /// `rate` is a fixed amount per pay period.
    PerPeriod,
}

/// An employee's enrolment in a configured deduction.
///
/// `amount` and `rate` override the catalogue defaults for this employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionEnrolment {
    /// The deduction code from the catalogue.
    pub code: String,
    /// Per-employee flat amount.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Per-employee percentage rate (0.05 = 5%).
    #[serde(default)]
    pub rate: Option<Decimal>,
}

/// Payroll info for one employee.
///
/// # Example
///
/// ```
/// use payroll_engine::models::{EmployeePayrollInfo, RateBasis};
/// use chrono::NaiveDate;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let info = EmployeePayrollInfo {
///     employee_id: "emp_001".to_string(),
///     active: true,
///     rate_basis: Some(RateBasis::Hourly),
///     rate: Some(Decimal::from_str("32.50").unwrap()),
///     hours: Some(Decimal::from_str("76").unwrap()),
///     effective_from: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
///     effective_to: None,
///     deductions: vec![],
/// };
/// assert!(info.is_effective_during(
///     NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
///     NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
/// ));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePayrollInfo {
    /// Unique identifier for the employee.
    pub employee_id: String,
    /// Inactive employees are never calculated.
    #[serde(default = "default_active")]
    pub active: bool,
    /// How `rate` is interpreted.
    #[serde(default)]
    pub rate_basis: Option<RateBasis>,
    /// Pay rate, interpreted by `rate_basis`.
    #[serde(default)]
    pub rate: Option<Decimal>,
    /// Hours worked in the period, for hourly employees.
    #[serde(default)]
    pub hours: Option<Decimal>,
    /// First day this record applies (inclusive).
    pub effective_from: NaiveDate,
    /// Last day this record applies (inclusive); open-ended when absent.
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    /// Deductions the employee is enrolled in.
    #[serde(default)]
    pub deductions: Vec<DeductionEnrolment>,
}

fn default_active() -> bool {
    true
}

impl EmployeePayrollInfo {
    /// Returns true if the effective range shares at least one day with `start..=end`.
    pub fn is_effective_during(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.effective_from <= end && self.effective_to.is_none_or(|to| to >= start)
    }

    /// Number of days of `start..=end` covered by the effective range.
    pub fn effective_days_within(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        let from = self.effective_from.max(start);
        let to = self.effective_to.map_or(end, |to| to.min(end));
        if to < from {
            0
        } else {
            (to - from).num_days() + 1
        }
    }

    /// Finds the employee's enrolment for a deduction code.
    pub fn enrolment(&self, code: &str) -> Option<&DeductionEnrolment> {
        self.deductions.iter().find(|d| d.code == code)
    }
}
