//! Configuration loading and management for the payroll engine.
//!
//! Payroll policy and the deduction catalogue come from YAML files; process
//! settings (listen address, database, log filter) come from the environment.
//!
//! # Example
//!
//! ```no_run
//! use payroll_engine::config::ConfigLoader;
//!
//! let config = ConfigLoader::load("./config/payroll").unwrap();
//! println!("Pay periods per year: {}", config.policy().periods_per_year);
//! ```

mod loader;
mod settings;
mod types;

pub use loader::ConfigLoader;
pub use settings::Settings;
pub use types::{
    DeductionKind, DeductionRule, DeductionsConfig, PayrollConfig, PayrollPolicy, RetryConfig,
    RoundingMode, TaxBracket,
};
