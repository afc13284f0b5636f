//! Request types for the payroll API.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{
    DeductionEnrolment, EmployeePayrollInfo, NewPeriod, PeriodFilter, PeriodStatus, RateBasis,
};

/// Request body for `POST /periods`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePeriodRequest {
    /// Optional display label.
    #[serde(default)]
    pub name: Option<String>,
    /// Pay group; `default` when omitted.
    #[serde(default)]
    pub pay_group: Option<String>,
    /// First day of the period (inclusive).
    pub start_date: NaiveDate,
    /// Last day of the period (inclusive).
    pub end_date: NaiveDate,
}

impl From<CreatePeriodRequest> for NewPeriod {
    fn from(req: CreatePeriodRequest) -> Self {
        NewPeriod {
            name: req.name,
            pay_group: req.pay_group,
            start_date: req.start_date,
            end_date: req.end_date,
        }
    }
}

/// Query string for `GET /periods`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPeriodsQuery {
    /// Only periods in this status.
    #[serde(default)]
    pub status: Option<PeriodStatus>,
    /// Only periods of this pay group.
    #[serde(default)]
    pub pay_group: Option<String>,
}

impl From<ListPeriodsQuery> for PeriodFilter {
    fn from(query: ListPeriodsQuery) -> Self {
        PeriodFilter {
            status: query.status,
            pay_group: query.pay_group,
        }
    }
}

/// Request body for `PUT /employees/{id}/payroll-info`.
///
/// The employee id comes from the path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollInfoRequest {
    /// Whether the employee is paid.
    #[serde(default = "default_active")]
    pub active: bool,
    /// How `rate` is interpreted.
    #[serde(default)]
    pub rate_basis: Option<RateBasis>,
    /// Hourly rate, annual salary or per-period amount.
    #[serde(default)]
    pub rate: Option<Decimal>,
    /// Hours worked in the period, for hourly employees.
    #[serde(default)]
    pub hours: Option<Decimal>,
    /// First day the record applies.
    pub effective_from: NaiveDate,
    /// Last day the record applies; open-ended when omitted.
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    /// Deduction enrolments.
    #[serde(default)]
    pub deductions: Vec<DeductionEnrolment>,
}

fn default_active() -> bool {
    true
}

impl PayrollInfoRequest {
    /// Builds the stored record for an employee.
    pub fn into_info(self, employee_id: String) -> EmployeePayrollInfo {
        EmployeePayrollInfo {
            employee_id,
            active: self.active,
            rate_basis: self.rate_basis,
            rate: self.rate,
            hours: self.hours,
            effective_from: self.effective_from,
            effective_to: self.effective_to,
            deductions: self.deductions,
        }
    }
}
