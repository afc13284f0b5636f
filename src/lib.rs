//! Payroll Period Lifecycle Engine
//!
//! This crate manages payroll periods from creation through calculation to
//! approval. Calculations run in the background against a snapshot of
//! employee payroll info, and their progress can be polled over the HTTP API.

#![warn(missing_docs)]

pub mod api;
pub mod calculation;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod progress;
pub mod store;
