//! Application state for the payroll API.
//!
//! This module defines the shared application state that is available
//! to all request handlers.

use std::sync::Arc;

use crate::lifecycle::PayrollLifecycle;

/// Shared application state.
///
/// Handlers reach periods, runs and payroll info only through the
/// lifecycle controller.
#[derive(Clone)]
pub struct AppState {
    lifecycle: Arc<PayrollLifecycle>,
}

impl AppState {
    /// Creates a new application state around a lifecycle controller.
    pub fn new(lifecycle: PayrollLifecycle) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
        }
    }

    /// Returns the lifecycle controller.
    pub fn lifecycle(&self) -> &PayrollLifecycle {
        &self.lifecycle
    }
}
