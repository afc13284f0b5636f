//! Core data models for the payroll engine.
//!
//! This module contains all the domain models used throughout the engine.

mod audit;
mod calculation;
mod payroll_info;
mod period;
mod run;

pub use audit::{AuditStep, AuditTrace, AuditWarning};
pub use calculation::{
    CalculationBatch, CalculationOutcome, DeductionCategory, DeductionLine, EmployeePay,
    PayrollCalculation, SkippedEmployee,
};
pub use payroll_info::{DeductionEnrolment, EmployeePayrollInfo, RateBasis};
pub use period::{DEFAULT_PAY_GROUP, NewPeriod, PayrollPeriod, PeriodFilter, PeriodStatus};
pub use run::{CalculationRun, RunErrorKind, RunStatus};
