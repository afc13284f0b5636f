//! Calculation logic for the payroll engine.
//!
//! This module contains gross pay calculation for hourly, salaried and
//! per-period employees, the ordered deduction pipeline, and the
//! [`CalculationEngine`] that runs both for every eligible employee of a
//! period.

mod deductions;
mod engine;
mod gross_pay;

pub use deductions::{
    AppliedDeduction, DeductionState, apply_deductions, apply_rule, bracketed_amount,
};
pub use engine::CalculationEngine;
pub use gross_pay::{GrossPayResult, calculate_gross_pay};
