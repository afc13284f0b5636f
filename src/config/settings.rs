//! Process settings read from the environment.

use std::collections::HashMap;

/// Where the service listens, stores data and finds its payroll config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Socket address for the HTTP listener.
    pub bind_addr: String,
    /// SQLite URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Directory holding payroll.yaml and deductions.yaml.
    pub config_dir: String,
    /// tracing-subscriber env filter directive.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            database_url: None,
            config_dir: "./config/payroll".into(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars().collect())
    }

    /// Reads settings from the given variables, falling back to defaults.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        let mut settings = Settings::default();
        let non_empty = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();

        if let Some(v) = non_empty("PAYROLL_BIND_ADDR") {
            settings.bind_addr = v;
        }
        if let Some(v) = non_empty("PAYROLL_DATABASE_URL") {
            settings.database_url = Some(v);
        }
        if let Some(v) = non_empty("PAYROLL_CONFIG_DIR") {
            settings.config_dir = v;
        }
        if let Some(v) = non_empty("PAYROLL_LOG").or_else(|| non_empty("RUST_LOG")) {
            settings.log_filter = v;
        }

        settings
    }
}
