//! Payroll period models.
//!
//! This module contains the [`PayrollPeriod`] record, its [`PeriodStatus`]
//! and the inputs used to create and query periods.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pay group used when a period is created without one.
pub const DEFAULT_PAY_GROUP: &str = "default";

/// The lifecycle status of a payroll period.
///
/// # Example
///
/// ```
/// use payroll_engine::models::PeriodStatus;
///
/// assert_eq!(PeriodStatus::Calculated.to_string(), "calculated");
/// assert!(PeriodStatus::Approved.is_terminal());
/// assert!(!PeriodStatus::Draft.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    /// Created, not yet calculated.
    Draft,
    /// A calculation run is in flight.
    Calculating,
    /// Calculations are present and awaiting approval.
    Calculated,
    /// Locked for payment.
    Approved,
    /// Abandoned. Cancelled periods are kept, never deleted.
    Cancelled,
}

impl PeriodStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Draft => "draft",
            PeriodStatus::Calculating => "calculating",
            PeriodStatus::Calculated => "calculated",
            PeriodStatus::Approved => "approved",
            PeriodStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a wire name back into a status.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PeriodStatus::Draft),
            "calculating" => Some(PeriodStatus::Calculating),
            "calculated" => Some(PeriodStatus::Calculated),
            "approved" => Some(PeriodStatus::Approved),
            "cancelled" => Some(PeriodStatus::Cancelled),
            _ => None,
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeriodStatus::Approved | PeriodStatus::Cancelled)
    }
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payroll period: a date range calculated and approved as a unit.
///
/// `version` increases on every status change and is the compare-and-swap
/// token for lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollPeriod {
    /// Unique identifier for the period.
    pub id: Uuid,
    /// Optional human-readable label (e.g., "FY26 Fortnight 14").
    pub name: Option<String>,
    /// The pay group this period belongs to.
    pub pay_group: String,
    /// The start date of the period (inclusive).
    pub start_date: NaiveDate,
    /// The end date of the period (inclusive).
    pub end_date: NaiveDate,
    /// The current lifecycle status.
    pub status: PeriodStatus,
    /// Row version, bumped on every status change.
    pub version: u64,
    /// When the period was created.
    pub created_at: DateTime<Utc>,
    /// When the period last changed status.
    pub updated_at: DateTime<Utc>,
}

impl PayrollPeriod {
    /// Checks if a given date falls within this period (inclusive).
    ///
    /// # Example
    ///
    /// ```
    /// use payroll_engine::models::{NewPeriod, PayrollPeriod};
    /// use chrono::{NaiveDate, Utc};
    ///
    /// let period = PayrollPeriod::draft(
    ///     NewPeriod {
    ///         name: None,
    ///         pay_group: None,
    ///         start_date: NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
    ///         end_date: NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
    ///     },
    ///     Utc::now(),
    /// );
    ///
    /// assert!(period.contains_date(NaiveDate::from_ymd_opt(2026, 1, 12).unwrap()));
    /// assert!(period.contains_date(NaiveDate::from_ymd_opt(2026, 1, 25).unwrap()));
    /// assert!(!period.contains_date(NaiveDate::from_ymd_opt(2026, 1, 26).unwrap()));
    /// ```
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Number of calendar days in the period, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Returns true if both periods share a pay group and at least one day.
    pub fn overlaps(&self, pay_group: &str, start: NaiveDate, end: NaiveDate) -> bool {
        self.pay_group == pay_group && self.start_date <= end && start <= self.end_date
    }

    /// Builds a new Draft period from creation input.
    pub fn draft(input: NewPeriod, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            pay_group: input
                .pay_group
                .unwrap_or_else(|| DEFAULT_PAY_GROUP.to_string()),
            start_date: input.start_date,
            end_date: input.end_date,
            status: PeriodStatus::Draft,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPeriod {
    /// Optional human-readable label.
    #[serde(default)]
    pub name: Option<String>,
    /// Pay group; defaults to [`DEFAULT_PAY_GROUP`].
    #[serde(default)]
    pub pay_group: Option<String>,
    /// The start date of the period (inclusive).
    pub start_date: NaiveDate,
    /// The end date of the period (inclusive).
    pub end_date: NaiveDate,
}

/// Filters for listing periods. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodFilter {
    /// Only periods in this status.
    #[serde(default)]
    pub status: Option<PeriodStatus>,
    /// Only periods in this pay group.
    #[serde(default)]
    pub pay_group: Option<String>,
}

impl PeriodFilter {
    /// Returns true if the period passes the filter.
    pub fn matches(&self, period: &PayrollPeriod) -> bool {
        self.status.is_none_or(|s| s == period.status)
            && self
                .pay_group
                .as_deref()
                .is_none_or(|g| g == period.pay_group)
    }
}
