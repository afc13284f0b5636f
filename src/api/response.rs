//! Response types for the payroll API.
//!
//! This module defines the error response structures and the mapping from
//! [`EngineError`] to HTTP statuses. Storage and internal failures are
//! reported with a generic message; their details only go to the log.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// API error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates a new API error with details.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Creates a validation error response.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Creates a malformed JSON error response.
    pub fn malformed_json(message: impl Into<String>) -> Self {
        Self::new("MALFORMED_JSON", message)
    }
}

/// API error with HTTP status code.
#[derive(Debug)]
pub struct ApiErrorResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The error body.
    pub error: ApiError,
}

impl ApiErrorResponse {
    /// A 400 response with the given body.
    pub fn bad_request(error: ApiError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error,
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            Json(self.error),
        )
            .into_response()
    }
}

impl From<EngineError> for ApiErrorResponse {
    fn from(error: EngineError) -> Self {
        let message = error.to_string();
        let (status, error) = match error {
            EngineError::ConfigNotFound { .. }
            | EngineError::ConfigParseError { .. }
            | EngineError::InvalidConfig { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("CONFIG_ERROR", "Configuration error"),
            ),
            EngineError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", message))
            }
            EngineError::Conflict { .. } => {
                (StatusCode::CONFLICT, ApiError::new("CONFLICT", message))
            }
            EngineError::InvalidTransition { from, action } => (
                StatusCode::CONFLICT,
                ApiError::with_details(
                    "INVALID_TRANSITION",
                    message,
                    format!("'{action}' is not allowed while the period is '{from}'"),
                ),
            ),
            EngineError::Validation { field, .. } => (
                StatusCode::BAD_REQUEST,
                ApiError::with_details("VALIDATION_ERROR", message, format!("field: {field}")),
            ),
            EngineError::PartialCalculationFailure { employee_ids } => (
                StatusCode::CONFLICT,
                ApiError::with_details(
                    "PARTIAL_CALCULATION_FAILURE",
                    message,
                    employee_ids.join(","),
                ),
            ),
            EngineError::ApprovalBlocked { .. } => (
                StatusCode::CONFLICT,
                ApiError::new("APPROVAL_BLOCKED", message),
            ),
            EngineError::MissingPayrollField { .. }
            | EngineError::InvalidPayrollInfo { .. }
            | EngineError::UnknownDeduction { .. } => (
                StatusCode::BAD_REQUEST,
                ApiError::new("INVALID_PAYROLL_INFO", message),
            ),
            EngineError::StoreUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new(
                    "STORE_UNAVAILABLE",
                    "Storage is temporarily unavailable, please retry",
                ),
            ),
            EngineError::SystemicFailure { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("SYSTEMIC_FAILURE", "Internal error"),
            ),
        };
        ApiErrorResponse { status, error }
    }
}
