//! Ordered deduction pipeline.
//!
//! The deduction catalogue is applied left to right. Each rule sees the
//! running taxable base left by the rules before it: salary sacrifice lowers
//! the base income tax is computed on, and income tax lowers the disposable
//! base a garnishment is computed on. Every amount is rounded, then capped at
//! the pay still remaining so net pay never drops below zero.

use rust_decimal::Decimal;

use crate::config::{DeductionKind, DeductionRule, PayrollConfig, TaxBracket};
use crate::error::{EngineError, EngineResult};
use crate::models::{AuditStep, AuditTrace, DeductionEnrolment, DeductionLine, EmployeePayrollInfo};

/// Running totals threaded through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionState {
    /// Gross pay, fixed for the whole pipeline.
    pub gross_pay: Decimal,
    /// Base the next rule is computed from.
    pub taxable_base: Decimal,
    /// Sum of deductions applied so far.
    pub total: Decimal,
}

impl DeductionState {
    /// Starting state: the whole gross is taxable, nothing deducted.
    pub fn new(gross_pay: Decimal) -> Self {
        Self {
            gross_pay,
            taxable_base: gross_pay,
            total: Decimal::ZERO,
        }
    }

    /// Pay not yet taken by deductions.
    pub fn remaining(&self) -> Decimal {
        self.gross_pay - self.total
    }
}

/// One rule applied to a state.
#[derive(Debug, Clone)]
pub struct AppliedDeduction {
    /// State after the rule.
    pub state: DeductionState,
    /// The line to record.
    pub line: DeductionLine,
    /// Amount before capping, when the cap was hit.
    pub capped_from: Option<Decimal>,
}

/// Progressive tax over `base`, or `None` if the amount overflows.
///
/// ```
/// use payroll_engine::calculation::bracketed_amount;
/// use payroll_engine::config::TaxBracket;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let d = |s: &str| Decimal::from_str(s).unwrap();
/// let brackets = vec![
///     TaxBracket { up_to: Some(d("700")), rate: d("0") },
///     TaxBracket { up_to: Some(d("3000")), rate: d("0.19") },
///     TaxBracket { up_to: None, rate: d("0.325") },
/// ];
/// // (3000 - 700) * 0.19 + (3500 - 3000) * 0.325
/// assert_eq!(bracketed_amount(&brackets, d("3500")), Some(d("599.5")));
/// ```
pub fn bracketed_amount(brackets: &[TaxBracket], base: Decimal) -> Option<Decimal> {
    let mut lower = Decimal::ZERO;
    let mut amount = Decimal::ZERO;
    for bracket in brackets {
        let upper = bracket.up_to.map_or(base, |up_to| up_to.min(base));
        if upper > lower {
            let slice = (upper - lower).checked_mul(bracket.rate)?;
            amount = amount.checked_add(slice)?;
        }
        match bracket.up_to {
            Some(up_to) if up_to < base => lower = up_to,
            _ => break,
        }
    }
    Some(amount)
}

fn raw_amount(
    rule: &DeductionRule,
    enrolment: Option<&DeductionEnrolment>,
    base: Decimal,
    employee_id: &str,
) -> EngineResult<Decimal> {
    let overflow = || EngineError::InvalidPayrollInfo {
        employee_id: employee_id.to_string(),
        message: "amount overflows".to_string(),
    };
    match &rule.kind {
        DeductionKind::Flat { amount } => enrolment
            .and_then(|e| e.amount)
            .or(*amount)
            .ok_or_else(|| EngineError::MissingPayrollField {
                employee_id: employee_id.to_string(),
                field: format!("deductions.{}.amount", rule.code),
            }),
        DeductionKind::Percent { rate } => {
            let rate = enrolment.and_then(|e| e.rate).unwrap_or(*rate);
            base.checked_mul(rate).ok_or_else(overflow)
        }
        DeductionKind::Bracketed { brackets } => {
            bracketed_amount(brackets, base).ok_or_else(overflow)
        }
    }
}

/// Applies one rule to the running state. Pure: the state is not mutated.
pub fn apply_rule(
    state: DeductionState,
    rule: &DeductionRule,
    enrolment: Option<&DeductionEnrolment>,
    employee_id: &str,
    config: &PayrollConfig,
) -> EngineResult<AppliedDeduction> {
    let rounded = config.round(raw_amount(rule, enrolment, state.taxable_base, employee_id)?);
    let remaining = state.remaining();
    let (amount, capped_from) = if rounded > remaining {
        (remaining, Some(rounded))
    } else {
        (rounded, None)
    };

    let taxable_base = if rule.reduces_taxable_base {
        (state.taxable_base - amount).max(Decimal::ZERO)
    } else {
        state.taxable_base
    };

    Ok(AppliedDeduction {
        state: DeductionState {
            gross_pay: state.gross_pay,
            taxable_base,
            total: state.total + amount,
        },
        line: DeductionLine {
            code: rule.code.clone(),
            name: rule.name.clone(),
            category: rule.category,
            taxable_base: state.taxable_base,
            amount,
        },
        capped_from,
    })
}

/// Checks an employee's enrolments against the catalogue.
fn validate_enrolments(info: &EmployeePayrollInfo, config: &PayrollConfig) -> EngineResult<()> {
    for enrolment in &info.deductions {
        if config.deduction(&enrolment.code).is_none() {
            return Err(EngineError::UnknownDeduction {
                employee_id: info.employee_id.clone(),
                code: enrolment.code.clone(),
            });
        }
        if enrolment.amount.is_some_and(|a| a < Decimal::ZERO) {
            return Err(EngineError::InvalidPayrollInfo {
                employee_id: info.employee_id.clone(),
                message: format!("deduction '{}' amount must not be negative", enrolment.code),
            });
        }
        if enrolment
            .rate
            .is_some_and(|r| r < Decimal::ZERO || r > Decimal::ONE)
        {
            return Err(EngineError::InvalidPayrollInfo {
                employee_id: info.employee_id.clone(),
                message: format!("deduction '{}' rate must be between 0 and 1", enrolment.code),
            });
        }
    }
    Ok(())
}

/// Runs the whole catalogue for one employee.
///
/// Mandatory rules always apply; other rules apply only to enrolled
/// employees. Steps and cap warnings are appended to `trace`.
pub fn apply_deductions(
    info: &EmployeePayrollInfo,
    gross_pay: Decimal,
    config: &PayrollConfig,
    trace: &mut AuditTrace,
) -> EngineResult<(Vec<DeductionLine>, DeductionState)> {
    validate_enrolments(info, config)?;

    let mut state = DeductionState::new(gross_pay);
    let mut lines = Vec::new();

    for rule in config.deductions() {
        let enrolment = info.enrolment(&rule.code);
        if !rule.mandatory && enrolment.is_none() {
            continue;
        }

        let applied = apply_rule(state, rule, enrolment, &info.employee_id, config)?;

        if let Some(requested) = applied.capped_from {
            trace.warn(
                "DEDUCTION_CAPPED",
                format!(
                    "Deduction '{}' of ${} capped at remaining pay ${}",
                    rule.code, requested, applied.line.amount
                ),
                "medium",
            );
        }

        trace.push(AuditStep {
            step_number: trace.next_step_number(),
            rule_id: format!("deduction:{}", rule.code),
            rule_name: rule.name.clone(),
            input: serde_json::json!({
                "taxable_base": state.taxable_base.to_string(),
                "remaining_pay": state.remaining().to_string(),
                "enrolled": enrolment.is_some(),
                "mandatory": rule.mandatory
            }),
            output: serde_json::json!({
                "amount": applied.line.amount.to_string(),
                "taxable_base_after": applied.state.taxable_base.to_string()
            }),
            reasoning: format!(
                "{} on base ${} = ${}",
                rule.name, state.taxable_base, applied.line.amount
            ),
        });

        state = applied.state;
        lines.push(applied.line);
    }

    Ok((lines, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayrollPolicy;
    use crate::models::{DeductionCategory, RateBasis};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn rule(code: &str, kind: DeductionKind, mandatory: bool, reduces: bool) -> DeductionRule {
        DeductionRule {
            code: code.to_string(),
            name: code.to_string(),
            category: DeductionCategory::Other,
            kind,
            mandatory,
            reduces_taxable_base: reduces,
        }
    }

    fn catalogue() -> PayrollConfig {
        PayrollConfig::new(
            PayrollPolicy::default(),
            vec![
                rule(
                    "salary_sacrifice",
                    DeductionKind::Percent { rate: dec("0.05") },
                    false,
                    true,
                ),
                rule(
                    "income_tax",
                    DeductionKind::Bracketed {
                        brackets: vec![
                            TaxBracket {
                                up_to: Some(dec("700")),
                                rate: dec("0"),
                            },
                            TaxBracket {
                                up_to: Some(dec("3000")),
                                rate: dec("0.19"),
                            },
                            TaxBracket {
                                up_to: None,
                                rate: dec("0.325"),
                            },
                        ],
                    },
                    true,
                    true,
                ),
                rule(
                    "garnishment",
                    DeductionKind::Percent { rate: dec("0.10") },
                    false,
                    true,
                ),
                rule(
                    "loan",
                    DeductionKind::Flat { amount: None },
                    false,
                    false,
                ),
            ],
        )
        .unwrap()
    }

    fn employee(enrolments: Vec<DeductionEnrolment>) -> EmployeePayrollInfo {
        EmployeePayrollInfo {
            employee_id: "emp_001".to_string(),
            active: true,
            rate_basis: Some(RateBasis::Salary),
            rate: Some(dec("78000")),
            hours: None,
            effective_from: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            effective_to: None,
            deductions: enrolments,
        }
    }

    fn enrol(code: &str) -> DeductionEnrolment {
        DeductionEnrolment {
            code: code.to_string(),
            amount: None,
            rate: None,
        }
    }

    #[test]
    fn test_bracketed_below_threshold_is_zero() {
        let brackets = vec![
            TaxBracket {
                up_to: Some(dec("700")),
                rate: dec("0"),
            },
            TaxBracket {
                up_to: None,
                rate: dec("0.2"),
            },
        ];
        assert_eq!(bracketed_amount(&brackets, dec("650")), Some(Decimal::ZERO));
        assert_eq!(bracketed_amount(&brackets, dec("800")), Some(dec("20")));
    }

    #[test]
    fn test_bounded_brackets_stop_at_last_bound() {
        let brackets = vec![TaxBracket {
            up_to: Some(dec("1000")),
            rate: dec("0.1"),
        }];
        assert_eq!(bracketed_amount(&brackets, dec("5000")), Some(dec("100")));
    }

    #[test]
    fn test_bracketed_overflow_is_none() {
        let brackets = vec![TaxBracket {
            up_to: None,
            rate: dec("1000"),
        }];
        assert_eq!(bracketed_amount(&brackets, Decimal::MAX), None);
    }

    #[test]
    fn test_overflowing_rate_override_is_invalid() {
        let config = catalogue();
        let sacrifice = config.deduction("salary_sacrifice").unwrap();
        let mut enrolment = enrol("salary_sacrifice");
        enrolment.rate = Some(dec("2"));
        let result = apply_rule(
            DeductionState::new(Decimal::MAX),
            sacrifice,
            Some(&enrolment),
            "emp_001",
            &config,
        );
        assert!(matches!(
            result,
            Err(EngineError::InvalidPayrollInfo { ref message, .. }) if message == "amount overflows"
        ));
    }

    #[test]
    fn test_mandatory_tax_applies_without_enrolment() {
        let mut trace = AuditTrace::default();
        let (lines, state) =
            apply_deductions(&employee(vec![]), dec("3000.00"), &catalogue(), &mut trace).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].code, "income_tax");
        // (3000 - 700) * 0.19 = 437.00
        assert_eq!(lines[0].amount, dec("437.00"));
        assert_eq!(state.total, dec("437.00"));
        assert_eq!(trace.steps.len(), 1);
    }

    #[test]
    fn test_earlier_deductions_lower_later_bases() {
        let mut trace = AuditTrace::default();
        let (lines, state) = apply_deductions(
            &employee(vec![enrol("garnishment"), enrol("salary_sacrifice")]),
            dec("3000.00"),
            &catalogue(),
            &mut trace,
        )
        .unwrap();

        let codes: Vec<&str> = lines.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["salary_sacrifice", "income_tax", "garnishment"]);

        // Sacrifice: 3000 * 0.05 = 150.00, base 2850.00
        assert_eq!(lines[0].amount, dec("150.00"));
        // Tax on 2850: (2850 - 700) * 0.19 = 408.50, base 2441.50
        assert_eq!(lines[1].taxable_base, dec("2850.00"));
        assert_eq!(lines[1].amount, dec("408.50"));
        // Garnishment on 2441.50: 244.15
        assert_eq!(lines[2].taxable_base, dec("2441.50"));
        assert_eq!(lines[2].amount, dec("244.15"));
        assert_eq!(state.total, dec("802.65"));
    }

    #[test]
    fn test_employee_overrides_rate() {
        let mut trace = AuditTrace::default();
        let mut sacrifice = enrol("salary_sacrifice");
        sacrifice.rate = Some(dec("0.10"));
        let (lines, _) =
            apply_deductions(&employee(vec![sacrifice]), dec("1000.00"), &catalogue(), &mut trace)
                .unwrap();
        assert_eq!(lines[0].amount, dec("100.00"));
    }

    #[test]
    fn test_flat_deduction_capped_at_remaining_pay() {
        let mut trace = AuditTrace::default();
        let mut loan = enrol("loan");
        loan.amount = Some(dec("900.00"));
        let (lines, state) =
            apply_deductions(&employee(vec![loan]), dec("500.00"), &catalogue(), &mut trace)
                .unwrap();
        // No tax below 700; loan capped at the full 500.00
        assert_eq!(lines[1].amount, dec("500.00"));
        assert_eq!(state.remaining(), Decimal::ZERO);
        assert_eq!(trace.warnings.len(), 1);
        assert_eq!(trace.warnings[0].code, "DEDUCTION_CAPPED");
    }

    #[test]
    fn test_flat_without_amount_is_missing_field() {
        let mut trace = AuditTrace::default();
        let result =
            apply_deductions(&employee(vec![enrol("loan")]), dec("500.00"), &catalogue(), &mut trace);
        assert!(matches!(
            result,
            Err(EngineError::MissingPayrollField { ref field, .. }) if field == "deductions.loan.amount"
        ));
    }

    #[test]
    fn test_unknown_enrolment_rejected() {
        let mut trace = AuditTrace::default();
        let result = apply_deductions(
            &employee(vec![enrol("gym_membership")]),
            dec("500.00"),
            &catalogue(),
            &mut trace,
        );
        assert!(matches!(result, Err(EngineError::UnknownDeduction { ref code, .. }) if code == "gym_membership"));
    }

    #[test]
    fn test_non_reducing_rule_keeps_base() {
        let config = catalogue();
        let loan = config.deduction("loan").unwrap();
        let mut enrolment = enrol("loan");
        enrolment.amount = Some(dec("25"));
        let applied = apply_rule(
            DeductionState::new(dec("1000")),
            loan,
            Some(&enrolment),
            "emp_001",
            &config,
        )
        .unwrap();
        assert_eq!(applied.state.taxable_base, dec("1000"));
        assert_eq!(applied.state.total, dec("25"));
    }
}
