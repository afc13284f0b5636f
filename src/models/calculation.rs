//! Calculation models.
//!
//! [`EmployeePay`] is the engine's pure output for one employee.
//! [`PayrollCalculation`] is the persisted row wrapping it with an id,
//! owning period and timestamp. A recalculation replaces a period's whole
//! [`CalculationBatch`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuditTrace;

/// Broad grouping of a deduction, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionCategory {
    /// Income tax withholding.
    Tax,
    /// Benefits such as salary sacrifice or health cover.
    Benefit,
    /// Court-ordered garnishments.
    Garnishment,
    /// Anything else (union dues, loan repayments).
    Other,
}

/// One applied deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionLine {
    /// The deduction code from the catalogue.
    pub code: String,
    /// The human-readable name of the deduction.
    pub name: String,
    /// The category of the deduction.
    pub category: DeductionCategory,
    /// The taxable base this deduction was computed from.
    pub taxable_base: Decimal,
    /// The amount deducted, already rounded and capped.
    pub amount: Decimal,
}

/// The engine's result for one employee.
///
/// `net_pay == gross_pay - total_deductions` and all amounts are non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePay {
    /// The employee this result is for.
    pub employee_id: String,
    /// Gross pay for the period.
    pub gross_pay: Decimal,
    /// Deductions in the order they were applied.
    pub deductions: Vec<DeductionLine>,
    /// Sum of all deduction amounts.
    pub total_deductions: Decimal,
    /// Pay after deductions.
    pub net_pay: Decimal,
    /// Record of every rule applied.
    pub audit_trace: AuditTrace,
}

/// An employee the engine could not calculate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEmployee {
    /// The employee that was skipped.
    pub employee_id: String,
    /// Why the employee was skipped.
    pub reason: String,
}

/// Everything the engine produced for a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationOutcome {
    /// Successful results, ordered by employee id.
    pub results: Vec<EmployeePay>,
    /// Employees skipped with an error, ordered by employee id.
    pub skipped: Vec<SkippedEmployee>,
}

impl CalculationOutcome {
    /// Returns true if at least one employee was skipped.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Wraps the results into persisted rows for a period.
    pub fn into_batch(self, period_id: Uuid, computed_at: DateTime<Utc>) -> CalculationBatch {
        CalculationBatch {
            period_id,
            calculations: self
                .results
                .into_iter()
                .map(|pay| PayrollCalculation::from_pay(pay, period_id, computed_at))
                .collect(),
            skipped: self.skipped,
        }
    }
}

/// A persisted per-employee calculation for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollCalculation {
    /// Unique identifier for this calculation.
    pub id: Uuid,
    /// The owning period.
    pub period_id: Uuid,
    /// The employee this calculation is for.
    pub employee_id: String,
    /// Gross pay for the period.
    pub gross_pay: Decimal,
    /// Deductions in the order they were applied.
    pub deductions: Vec<DeductionLine>,
    /// Sum of all deduction amounts.
    pub total_deductions: Decimal,
    /// Pay after deductions.
    pub net_pay: Decimal,
    /// When the calculation was produced.
    pub computed_at: DateTime<Utc>,
    /// Record of every rule applied.
    pub audit_trace: AuditTrace,
}

impl PayrollCalculation {
    /// Wraps an engine result into a persisted row.
    pub fn from_pay(pay: EmployeePay, period_id: Uuid, computed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            period_id,
            employee_id: pay.employee_id,
            gross_pay: pay.gross_pay,
            deductions: pay.deductions,
            total_deductions: pay.total_deductions,
            net_pay: pay.net_pay,
            computed_at,
            audit_trace: pay.audit_trace,
        }
    }
}

/// The full set of calculations for a period, replaced atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationBatch {
    /// The owning period.
    pub period_id: Uuid,
    /// One row per calculated employee.
    pub calculations: Vec<PayrollCalculation>,
    /// Employees skipped with an error.
    pub skipped: Vec<SkippedEmployee>,
}

impl CalculationBatch {
    /// An empty batch, returned for periods never calculated.
    pub fn empty(period_id: Uuid) -> Self {
        Self {
            period_id,
            calculations: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn pay(employee_id: &str, gross: &str) -> EmployeePay {
        EmployeePay {
            employee_id: employee_id.to_string(),
            gross_pay: dec(gross),
            deductions: vec![],
            total_deductions: Decimal::ZERO,
            net_pay: dec(gross),
            audit_trace: AuditTrace::default(),
        }
    }

    #[test]
    fn test_outcome_into_batch_keeps_order_and_skips() {
        let outcome = CalculationOutcome {
            results: vec![pay("emp_001", "100.00"), pay("emp_002", "250.50")],
            skipped: vec![SkippedEmployee {
                employee_id: "emp_003".to_string(),
                reason: "missing rate".to_string(),
            }],
        };
        assert!(outcome.is_partial());

        let period_id = Uuid::new_v4();
        let batch = outcome.into_batch(period_id, Utc::now());
        assert_eq!(batch.calculations.len(), 2);
        assert_eq!(batch.calculations[0].employee_id, "emp_001");
        assert!(batch.calculations.iter().all(|c| c.period_id == period_id));
        assert_eq!(batch.skipped[0].employee_id, "emp_003");
    }

    #[test]
    fn test_decimals_serialize_as_strings() {
        let json = serde_json::to_value(pay("emp_001", "1234.56")).unwrap();
        assert_eq!(json["gross_pay"], "1234.56");
    }
}
