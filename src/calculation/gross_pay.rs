//! Gross pay calculation.
//!
//! Turns an employee's rate basis, rate and hours into gross pay for a
//! period, prorating salaried and per-period employees whose payroll info
//! only covers part of the period.

use rust_decimal::Decimal;

use crate::config::PayrollConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{AuditStep, EmployeePayrollInfo, PayrollPeriod, RateBasis};

/// The result of a gross pay calculation, including the audit step.
#[derive(Debug, Clone)]
pub struct GrossPayResult {
    /// Gross pay rounded to currency precision.
    pub gross_pay: Decimal,
    /// The audit step recording this calculation.
    pub audit_step: AuditStep,
}

fn missing(info: &EmployeePayrollInfo, field: &str) -> EngineError {
    EngineError::MissingPayrollField {
        employee_id: info.employee_id.clone(),
        field: field.to_string(),
    }
}

fn negative(info: &EmployeePayrollInfo, field: &str, value: Decimal) -> EngineError {
    EngineError::InvalidPayrollInfo {
        employee_id: info.employee_id.clone(),
        message: format!("{field} must not be negative, got {value}"),
    }
}

fn overflow(info: &EmployeePayrollInfo) -> EngineError {
    EngineError::InvalidPayrollInfo {
        employee_id: info.employee_id.clone(),
        message: "amount overflows".to_string(),
    }
}

/// Calculates gross pay for one employee over a period.
///
/// - `hourly`: `rate * hours`
/// - `salary`: `rate / periods_per_year`, prorated by effective days
/// - `per_period`: `rate`, prorated by effective days
///
/// # Returns
///
/// Returns an error if `rate_basis`, `rate` or (for hourly employees) `hours`
/// is missing (`MissingPayrollField`), or if a value is negative or too
/// large to calculate with (`InvalidPayrollInfo`).
///
/// # Examples
///
/// ```
/// use payroll_engine::calculation::calculate_gross_pay;
/// use payroll_engine::config::{PayrollConfig, PayrollPolicy};
/// use payroll_engine::models::{EmployeePayrollInfo, NewPeriod, PayrollPeriod, RateBasis};
/// use chrono::{NaiveDate, Utc};
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let config = PayrollConfig::new(PayrollPolicy::default(), vec![]).unwrap();
/// let period = PayrollPeriod::draft(
///     NewPeriod {
///         name: None,
///         pay_group: None,
///         start_date: NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
///         end_date: NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
///     },
///     Utc::now(),
/// );
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
///
/// let result = calculate_gross_pay(&info, &period, &config, 1).unwrap();
/// assert_eq!(result.gross_pay, Decimal::from_str("2470.00").unwrap());
/// ```
pub fn calculate_gross_pay(
    info: &EmployeePayrollInfo,
    period: &PayrollPeriod,
    config: &PayrollConfig,
    step_number: u32,
) -> EngineResult<GrossPayResult> {
    let basis = info.rate_basis.ok_or_else(|| missing(info, "rate_basis"))?;
    let rate = info.rate.ok_or_else(|| missing(info, "rate"))?;
    if rate < Decimal::ZERO {
        return Err(negative(info, "rate", rate));
    }

    let effective_days = info.effective_days_within(period.start_date, period.end_date);
    let period_days = period.days();
    let proration = Decimal::from(effective_days) / Decimal::from(period_days);

    let (raw, reasoning) = match basis {
        RateBasis::Hourly => {
            let hours = info.hours.ok_or_else(|| missing(info, "hours"))?;
            if hours < Decimal::ZERO {
                return Err(negative(info, "hours", hours));
            }
            (
                rate.checked_mul(hours).ok_or_else(|| overflow(info))?,
                format!("{} hours x ${}", hours.normalize(), rate.normalize()),
            )
        }
        RateBasis::Salary => {
            let periods = config.policy().periods_per_year;
            let divisor = Decimal::from(periods) * Decimal::from(period_days);
            (
                rate.checked_mul(Decimal::from(effective_days))
                    .and_then(|scaled| scaled.checked_div(divisor))
                    .ok_or_else(|| overflow(info))?,
                format!(
                    "${} / {} periods x {}/{} days",
                    rate.normalize(),
                    periods,
                    effective_days,
                    period_days
                ),
            )
        }
        RateBasis::PerPeriod => (
            rate.checked_mul(proration).ok_or_else(|| overflow(info))?,
            format!(
                "${} per period x {}/{} days",
                rate.normalize(),
                effective_days,
                period_days
            ),
        ),
    };

    let gross_pay = config.round(raw);

    let audit_step = AuditStep {
        step_number,
        rule_id: "gross_pay".to_string(),
        rule_name: "Gross Pay".to_string(),
        input: serde_json::json!({
            "rate_basis": basis,
            "rate": rate.normalize().to_string(),
            "hours": info.hours.map(|h| h.normalize().to_string()),
            "effective_days": effective_days,
            "period_days": period_days
        }),
        output: serde_json::json!({
            "gross_pay": gross_pay.to_string()
        }),
        reasoning: format!("{} = ${}", reasoning, gross_pay),
    };

    Ok(GrossPayResult {
        gross_pay,
        audit_step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayrollPolicy;
    use crate::models::NewPeriod;
    use chrono::{NaiveDate, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> PayrollConfig {
        PayrollConfig::new(PayrollPolicy::default(), vec![]).unwrap()
    }

    fn fortnight() -> PayrollPeriod {
        PayrollPeriod::draft(
            NewPeriod {
                name: None,
                pay_group: None,
                start_date: date(2026, 1, 12),
                end_date: date(2026, 1, 25),
            },
            Utc::now(),
        )
    }

    fn info(basis: Option<RateBasis>, rate: Option<&str>, hours: Option<&str>) -> EmployeePayrollInfo {
        EmployeePayrollInfo {
            employee_id: "emp_001".to_string(),
            active: true,
            rate_basis: basis,
            rate: rate.map(dec),
            hours: hours.map(dec),
            effective_from: date(2025, 7, 1),
            effective_to: None,
            deductions: vec![],
        }
    }

    #[test]
    fn test_hourly_gross() {
        let result = calculate_gross_pay(
            &info(Some(RateBasis::Hourly), Some("28.54"), Some("38.5")),
            &fortnight(),
            &config(),
            1,
        )
        .unwrap();
        // 38.5 * 28.54 = 1098.79
        assert_eq!(result.gross_pay, dec("1098.79"));
        assert_eq!(result.audit_step.rule_id, "gross_pay");
    }

    #[test]
    fn test_salary_gross_full_period() {
        let result = calculate_gross_pay(
            &info(Some(RateBasis::Salary), Some("78000"), None),
            &fortnight(),
            &config(),
            1,
        )
        .unwrap();
        // 78000 / 26 = 3000.00
        assert_eq!(result.gross_pay, dec("3000.00"));
    }

    #[test]
    fn test_salary_prorated_when_starting_mid_period() {
        let mut record = info(Some(RateBasis::Salary), Some("78000"), None);
        record.effective_from = date(2026, 1, 19);
        let result = calculate_gross_pay(&record, &fortnight(), &config(), 1).unwrap();
        // 3000 * 7 / 14 = 1500.00
        assert_eq!(result.gross_pay, dec("1500.00"));
    }

    #[test]
    fn test_per_period_gross_rounds_with_bankers_rounding() {
        let mut record = info(Some(RateBasis::PerPeriod), Some("100.07"), None);
        record.effective_to = Some(date(2026, 1, 18));
        let result = calculate_gross_pay(&record, &fortnight(), &config(), 1).unwrap();
        // 100.07 * 7 / 14 = 50.035 -> 50.04 (half to even)
        assert_eq!(result.gross_pay, dec("50.04"));
    }

    #[test]
    fn test_missing_rate_is_reported() {
        let result = calculate_gross_pay(
            &info(Some(RateBasis::Hourly), None, Some("10")),
            &fortnight(),
            &config(),
            1,
        );
        match result {
            Err(EngineError::MissingPayrollField { employee_id, field }) => {
                assert_eq!(employee_id, "emp_001");
                assert_eq!(field, "rate");
            }
            other => panic!("Expected MissingPayrollField, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_rate_basis_is_reported() {
        let result = calculate_gross_pay(&info(None, Some("10"), None), &fortnight(), &config(), 1);
        assert!(matches!(
            result,
            Err(EngineError::MissingPayrollField { ref field, .. }) if field == "rate_basis"
        ));
    }

    #[test]
    fn test_hourly_without_hours_is_reported() {
        let result = calculate_gross_pay(
            &info(Some(RateBasis::Hourly), Some("30"), None),
            &fortnight(),
            &config(),
            1,
        );
        assert!(matches!(
            result,
            Err(EngineError::MissingPayrollField { ref field, .. }) if field == "hours"
        ));
    }

    #[test]
    fn test_negative_rate_is_invalid() {
        let result = calculate_gross_pay(
            &info(Some(RateBasis::PerPeriod), Some("-5"), None),
            &fortnight(),
            &config(),
            1,
        );
        assert!(matches!(result, Err(EngineError::InvalidPayrollInfo { .. })));
    }

    #[test]
    fn test_overflowing_hourly_gross_is_invalid() {
        let result = calculate_gross_pay(
            &info(
                Some(RateBasis::Hourly),
                Some("100000000000000000"),
                Some("100000000000000"),
            ),
            &fortnight(),
            &config(),
            1,
        );
        match result {
            Err(EngineError::InvalidPayrollInfo { employee_id, message }) => {
                assert_eq!(employee_id, "emp_001");
                assert_eq!(message, "amount overflows");
            }
            other => panic!("Expected InvalidPayrollInfo, got {:?}", other),
        }
    }
}
