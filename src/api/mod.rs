//! HTTP API module for the payroll engine.
//!
//! This module provides the JSON endpoints for managing payroll periods,
//! polling calculation runs and maintaining employee payroll info.

mod handlers;
mod request;
mod response;
mod state;

pub use handlers::create_router;
pub use request::{CreatePeriodRequest, ListPeriodsQuery, PayrollInfoRequest};
pub use response::{ApiError, ApiErrorResponse};
pub use state::AppState;
