//! Configuration types for payroll calculation.
//!
//! This module contains the strongly-typed configuration structures that
//! are deserialized from YAML configuration files.

use std::collections::HashSet;
use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::models::DeductionCategory;

/// How monetary amounts are rounded to currency precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Round half to even (banker's rounding).
    Bankers,
    /// Round half away from zero.
    HalfUp,
}

impl RoundingMode {
    /// The `rust_decimal` strategy for this mode.
    pub fn strategy(&self) -> RoundingStrategy {
        match self {
            RoundingMode::Bankers => RoundingStrategy::MidpointNearestEven,
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
        }
    }
}

/// Retry policy for transient store failures while saving results.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_backoff_multiplier() -> u32 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// ```
    /// use payroll_engine::config::RetryConfig;
    /// use std::time::Duration;
    ///
    /// let retry = RetryConfig::default();
    /// assert_eq!(retry.backoff_after(1), Duration::from_millis(50));
    /// assert_eq!(retry.backoff_after(3), Duration::from_millis(200));
    /// ```
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

/// Payroll-wide policy from payroll.yaml.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayrollPolicy {
    /// ISO currency code (informational).
    pub currency: String,
    /// Decimal places money is rounded to.
    pub precision: u32,
    /// Rounding applied at every monetary step.
    pub rounding: RoundingMode,
    /// Pay periods per year, used to spread annual salaries.
    pub periods_per_year: u32,
    /// Retry policy for saving results.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for PayrollPolicy {
    fn default() -> Self {
        Self {
            currency: "AUD".to_string(),
            precision: 2,
            rounding: RoundingMode::Bankers,
            periods_per_year: 26,
            retry: RetryConfig::default(),
        }
    }
}

/// One progressive tax bracket.
///
/// The bracket covers the base from the previous bracket's `up_to` to this
/// one's; `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaxBracket {
    /// Upper bound of the bracket (inclusive), unbounded when absent.
    #[serde(default)]
    pub up_to: Option<Decimal>,
    /// Marginal rate within the bracket (0.19 = 19%).
    pub rate: Decimal,
}

/// How a deduction amount is computed from the current taxable base.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeductionKind {
    /// A fixed amount; the default may be overridden per employee.
    Flat {
        /// Default amount, required unless every enrolment carries one.
        #[serde(default)]
        amount: Option<Decimal>,
    },
    /// A percentage of the current base; overridable per employee.
    Percent {
        /// Default rate (0.05 = 5%).
        rate: Decimal,
    },
    /// Progressive brackets over the current base.
    Bracketed {
        /// Brackets in ascending order.
        brackets: Vec<TaxBracket>,
    },
}

fn default_reduces_taxable_base() -> bool {
    true
}

/// One entry of the ordered deduction catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeductionRule {
    /// Unique deduction code.
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Reporting category.
    pub category: DeductionCategory,
    /// How the amount is computed.
    #[serde(flatten)]
    pub kind: DeductionKind,
    /// Applied to every employee, enrolled or not.
    #[serde(default)]
    pub mandatory: bool,
    /// Whether later rules see a base lowered by this deduction.
    #[serde(default = "default_reduces_taxable_base")]
    pub reduces_taxable_base: bool,
}

/// Deductions configuration file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct DeductionsConfig {
    /// The catalogue, in application order.
    pub deductions: Vec<DeductionRule>,
}

/// The complete payroll configuration.
#[derive(Debug, Clone)]
pub struct PayrollConfig {
    /// Payroll-wide policy.
    policy: PayrollPolicy,
    /// Deduction catalogue in application order.
    deductions: Vec<DeductionRule>,
}

impl PayrollConfig {
    /// Creates and validates a configuration from its parts.
    pub fn new(policy: PayrollPolicy, deductions: Vec<DeductionRule>) -> EngineResult<Self> {
        validate_policy(&policy)?;
        validate_deductions(&deductions)?;
        Ok(Self { policy, deductions })
    }

    /// Returns the payroll-wide policy.
    pub fn policy(&self) -> &PayrollPolicy {
        &self.policy
    }

    /// Returns the deduction catalogue in application order.
    pub fn deductions(&self) -> &[DeductionRule] {
        &self.deductions
    }

    /// Finds a deduction rule by code.
    pub fn deduction(&self, code: &str) -> Option<&DeductionRule> {
        self.deductions.iter().find(|d| d.code == code)
    }

    /// Rounds an amount to currency precision with the configured strategy.
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.policy.precision, self.policy.rounding.strategy())
    }
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::InvalidConfig {
        message: message.into(),
    }
}

fn is_rate(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

fn validate_policy(policy: &PayrollPolicy) -> EngineResult<()> {
    if policy.precision > 10 {
        return Err(invalid(format!(
            "precision {} exceeds 10 decimal places",
            policy.precision
        )));
    }
    if policy.periods_per_year == 0 {
        return Err(invalid("periods_per_year must be positive"));
    }
    if policy.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts must be at least 1"));
    }
    Ok(())
}

fn validate_deductions(rules: &[DeductionRule]) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for rule in rules {
        if rule.code.trim().is_empty() {
            return Err(invalid("deduction code must not be empty"));
        }
        if !seen.insert(rule.code.as_str()) {
            return Err(invalid(format!("duplicate deduction code '{}'", rule.code)));
        }
        match &rule.kind {
            DeductionKind::Flat { amount } => {
                if amount.is_some_and(|a| a < Decimal::ZERO) {
                    return Err(invalid(format!("deduction '{}' has a negative amount", rule.code)));
                }
                if rule.mandatory && amount.is_none() {
                    return Err(invalid(format!(
                        "mandatory deduction '{}' needs a default amount",
                        rule.code
                    )));
                }
            }
            DeductionKind::Percent { rate } => {
                if !is_rate(*rate) {
                    return Err(invalid(format!(
                        "deduction '{}' rate must be between 0 and 1",
                        rule.code
                    )));
                }
            }
            DeductionKind::Bracketed { brackets } => validate_brackets(&rule.code, brackets)?,
        }
    }
    Ok(())
}

fn validate_brackets(code: &str, brackets: &[TaxBracket]) -> EngineResult<()> {
    if brackets.is_empty() {
        return Err(invalid(format!("deduction '{code}' has no brackets")));
    }
    let mut previous = Decimal::ZERO;
    for (i, bracket) in brackets.iter().enumerate() {
        if !is_rate(bracket.rate) {
            return Err(invalid(format!(
                "deduction '{code}' bracket {} rate must be between 0 and 1",
                i + 1
            )));
        }
        match bracket.up_to {
            Some(up_to) if up_to <= previous => {
                return Err(invalid(format!(
                    "deduction '{code}' brackets must be strictly ascending"
                )));
            }
            Some(up_to) => previous = up_to,
            None if i + 1 != brackets.len() => {
                return Err(invalid(format!(
                    "deduction '{code}' only the last bracket may be unbounded"
                )));
            }
            None => {}
        }
    }
    Ok(())
}
