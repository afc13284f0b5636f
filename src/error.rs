//! Error types for the payroll engine.
//!
//! This module provides strongly-typed errors using the `thiserror` crate
//! for every error condition raised by the store, the calculation engine
//! and the period lifecycle.

use thiserror::Error;
use uuid::Uuid;

use crate::lifecycle::PeriodAction;
use crate::models::PeriodStatus;

/// The main error type for the payroll engine.
///
/// # Example
///
/// ```
/// use payroll_engine::error::EngineError;
///
/// let error = EngineError::ConfigNotFound {
///     path: "/missing/payroll.yaml".to_string(),
/// };
/// assert_eq!(error.to_string(), "Configuration file not found: /missing/payroll.yaml");
/// ```
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Configuration file was not found at the specified path.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration file '{path}': {message}")]
    ConfigParseError {
        /// The path to the file that failed to parse.
        path: String,
        /// A description of the parse error.
        message: String,
    },

    /// Configuration parsed but is not usable.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        message: String,
    },

    /// A period, run or employee record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record that was looked up.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A compare-and-swap lost, or a run is already active.
    #[error("Conflict: {message}")]
    Conflict {
        /// A description of the conflicting state.
        message: String,
    },

    /// The action is not legal from the period's current status.
    #[error("Cannot {action} a period in status '{from}'")]
    InvalidTransition {
        /// The status the period was in.
        from: PeriodStatus,
        /// The action that was attempted.
        action: PeriodAction,
    },

    /// Request input was malformed.
    #[error("Invalid field '{field}': {message}")]
    Validation {
        /// The offending field.
        field: String,
        /// A description of what made the field invalid.
        message: String,
    },

    /// Approval is blocked because employees were skipped during calculation.
    #[error("{} employee(s) could not be calculated: {}", employee_ids.len(), employee_ids.join(", "))]
    PartialCalculationFailure {
        /// The employees without a calculation.
        employee_ids: Vec<String>,
    },

    /// Approval guard failed for a reason other than skipped employees.
    #[error("Approval blocked for period {period_id}: {reason}")]
    ApprovalBlocked {
        /// The period that could not be approved.
        period_id: Uuid,
        /// Why the period could not be approved.
        reason: String,
    },

    /// An employee's payroll info lacks a field required for calculation.
    #[error("Employee '{employee_id}' is missing required field '{field}'")]
    MissingPayrollField {
        /// The employee being calculated.
        employee_id: String,
        /// The missing field.
        field: String,
    },

    /// An employee's payroll info holds a value the engine cannot use.
    #[error("Invalid payroll info for employee '{employee_id}': {message}")]
    InvalidPayrollInfo {
        /// The employee being calculated.
        employee_id: String,
        /// What is wrong with the record.
        message: String,
    },

    /// An employee is enrolled in a deduction that is not configured.
    #[error("Employee '{employee_id}' is enrolled in unknown deduction '{code}'")]
    UnknownDeduction {
        /// The employee being calculated.
        employee_id: String,
        /// The unknown deduction code.
        code: String,
    },

    /// The backing store could not be reached. Retryable.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// The underlying storage error.
        message: String,
    },

    /// A run failed as a whole.
    #[error("Systemic failure: {message}")]
    SystemicFailure {
        /// A description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Shorthand for [`EngineError::NotFound`] on a period.
    pub fn period_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "Period",
            id: id.to_string(),
        }
    }

    /// Returns true for failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

/// A type alias for Results that return EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
