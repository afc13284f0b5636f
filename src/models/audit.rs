//! Audit trace models.
//!
//! Every employee result carries an [`AuditTrace`] recording each rule the
//! engine applied, so a payroll officer can explain a figure before approving.
//! Traces hold no timestamps or durations, keeping results reproducible.

use serde::{Deserialize, Serialize};

/// A single step in the audit trace recording a calculation decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStep {
    /// The sequential step number.
    pub step_number: u32,
    /// The unique identifier of the rule that was applied.
    pub rule_id: String,
    /// The human-readable name of the rule.
    pub rule_name: String,
    /// The input data for this step.
    pub input: serde_json::Value,
    /// The output data from this step.
    pub output: serde_json::Value,
    /// Human-readable explanation of the decision.
    pub reasoning: String,
}

/// A warning generated during calculation.
///
/// Warnings flag figures that were adjusted (e.g., a deduction capped at the
/// remaining pay) without preventing the calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditWarning {
    /// A code identifying the type of warning.
    pub code: String,
    /// A human-readable description of the warning.
    pub message: String,
    /// The severity level (e.g., "low", "medium", "high").
    pub severity: String,
}

/// The complete audit trace for one employee's calculation.
///
/// # Example
///
/// ```
/// use payroll_engine::models::AuditTrace;
///
/// let mut trace = AuditTrace::default();
/// let n = trace.next_step_number();
/// assert_eq!(n, 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrace {
    /// The sequence of calculation steps.
    pub steps: Vec<AuditStep>,
    /// Any warnings generated during calculation.
    pub warnings: Vec<AuditWarning>,
}

impl AuditTrace {
    /// Step number the next pushed step should carry.
    pub fn next_step_number(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    /// Appends a step.
    pub fn push(&mut self, step: AuditStep) {
        self.steps.push(step);
    }

    /// Appends a warning.
    pub fn warn(&mut self, code: &str, message: impl Into<String>, severity: &str) {
        self.warnings.push(AuditWarning {
            code: code.to_string(),
            message: message.into(),
            severity: severity.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_numbers_follow_pushes() {
        let mut trace = AuditTrace::default();
        trace.push(AuditStep {
            step_number: trace.next_step_number(),
            rule_id: "gross_pay".to_string(),
            rule_name: "Gross Pay".to_string(),
            input: serde_json::json!({}),
            output: serde_json::json!({}),
            reasoning: String::new(),
        });
        assert_eq!(trace.steps[0].step_number, 1);
        assert_eq!(trace.next_step_number(), 2);
    }

    #[test]
    fn test_warning_serialization() {
        let mut trace = AuditTrace::default();
        trace.warn("DEDUCTION_CAPPED", "capped at remaining pay", "medium");
        let json = serde_json::to_string(&trace).unwrap();
        assert!(json.contains("\"code\":\"DEDUCTION_CAPPED\""));
        assert!(json.contains("\"severity\":\"medium\""));
    }
}
