//! SQLite-backed store.
//!
//! Money is stored as decimal strings and dates as ISO-8601 text, so values
//! round-trip exactly. Status changes are single conditional `UPDATE`s;
//! batch replacement runs in one transaction that first takes the write
//! lock by touching the guarded period row.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    CalculationBatch, EmployeePayrollInfo, NewPeriod, PayrollCalculation, PayrollPeriod,
    PeriodFilter, PeriodStatus, SkippedEmployee,
};

use super::{
    PayrollInfoSource, PeriodStore, batch_period_mismatch, overlap_conflict, status_conflict,
    validate_new_period, validate_payroll_info,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS payroll_periods (
        id          TEXT PRIMARY KEY NOT NULL,
        name        TEXT,
        pay_group   TEXT NOT NULL,
        start_date  TEXT NOT NULL,
        end_date    TEXT NOT NULL,
        status      TEXT NOT NULL,
        version     INTEGER NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS payroll_calculations (
        id                TEXT PRIMARY KEY NOT NULL,
        period_id         TEXT NOT NULL REFERENCES payroll_periods(id),
        employee_id       TEXT NOT NULL,
        gross_pay         TEXT NOT NULL,
        deductions        TEXT NOT NULL,
        total_deductions  TEXT NOT NULL,
        net_pay           TEXT NOT NULL,
        computed_at       TEXT NOT NULL,
        audit_trace       TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_payroll_calculations_period ON payroll_calculations(period_id)",
    r#"
    CREATE TABLE IF NOT EXISTS payroll_calculation_skips (
        period_id    TEXT NOT NULL REFERENCES payroll_periods(id),
        employee_id  TEXT NOT NULL,
        reason       TEXT NOT NULL,
        PRIMARY KEY (period_id, employee_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS employee_payroll_info (
        employee_id  TEXT PRIMARY KEY NOT NULL,
        record       TEXT NOT NULL
    )
    "#,
];

const PERIOD_COLUMNS: &str =
    "id, name, pay_group, start_date, end_date, status, version, created_at, updated_at";

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Whether retrying the same statement later can succeed.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // Extended result codes keep the primary code in the low byte.
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    }
}

fn store_error(err: sqlx::Error) -> EngineError {
    if is_transient(&err) {
        EngineError::StoreUnavailable {
            message: err.to_string(),
        }
    } else {
        EngineError::SystemicFailure {
            message: format!("database error: {err}"),
        }
    }
}

fn corrupt(what: &str, value: &str) -> EngineError {
    EngineError::SystemicFailure {
        message: format!("corrupt {what} in store: '{value}'"),
    }
}

fn parse_uuid(value: &str) -> EngineResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| corrupt("uuid", value))
}

fn parse_date(value: &str) -> EngineResult<NaiveDate> {
    NaiveDate::from_str(value).map_err(|_| corrupt("date", value))
}

fn parse_timestamp(value: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| corrupt("timestamp", value))
}

fn parse_decimal(value: &str) -> EngineResult<Decimal> {
    Decimal::from_str(value).map_err(|_| corrupt("amount", value))
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, value: &str) -> EngineResult<T> {
    serde_json::from_str(value).map_err(|_| corrupt(what, value))
}

fn to_json<T: serde::Serialize>(value: &T) -> EngineResult<String> {
    serde_json::to_string(value).map_err(|e| EngineError::SystemicFailure {
        message: format!("failed to encode record: {e}"),
    })
}

fn period_from_row(row: &SqliteRow) -> EngineResult<PayrollPeriod> {
    let get = |column: &str| row.try_get::<String, _>(column).map_err(store_error);

    let status = get("status")?;
    let version: i64 = row.try_get("version").map_err(store_error)?;

    Ok(PayrollPeriod {
        id: parse_uuid(&get("id")?)?,
        name: row.try_get("name").map_err(store_error)?,
        pay_group: get("pay_group")?,
        start_date: parse_date(&get("start_date")?)?,
        end_date: parse_date(&get("end_date")?)?,
        status: PeriodStatus::parse(&status).ok_or_else(|| corrupt("status", &status))?,
        version: u64::try_from(version).map_err(|_| corrupt("version", &version.to_string()))?,
        created_at: parse_timestamp(&get("created_at")?)?,
        updated_at: parse_timestamp(&get("updated_at")?)?,
    })
}

fn calculation_from_row(row: &SqliteRow) -> EngineResult<PayrollCalculation> {
    let get = |column: &str| row.try_get::<String, _>(column).map_err(store_error);

    Ok(PayrollCalculation {
        id: parse_uuid(&get("id")?)?,
        period_id: parse_uuid(&get("period_id")?)?,
        employee_id: get("employee_id")?,
        gross_pay: parse_decimal(&get("gross_pay")?)?,
        deductions: parse_json("deductions", &get("deductions")?)?,
        total_deductions: parse_decimal(&get("total_deductions")?)?,
        net_pay: parse_decimal(&get("net_pay")?)?,
        computed_at: parse_timestamp(&get("computed_at")?)?,
        audit_trace: parse_json("audit trace", &get("audit_trace")?)?,
    })
}

/// Store backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Connects to `database_url`, creating the file and schema if missing.
    ///
    /// `sqlite::memory:` uses a single long-lived connection, since every
    /// connection to an in-memory database sees its own empty database.
    pub async fn connect(database_url: &str) -> EngineResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(store_error)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = database_url.starts_with("sqlite::memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(store_error)?;

        let store = Self { pool };
        store.ensure_schema().await?;
        debug!(database_url, "SQLite store ready");
        Ok(store)
    }

    async fn ensure_schema(&self) -> EngineResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
        }
        Ok(())
    }

    async fn find_overlap(
        &self,
        pay_group: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Option<PayrollPeriod>> {
        let row = sqlx::query(&format!(
            "SELECT {PERIOD_COLUMNS} FROM payroll_periods
             WHERE pay_group = ? AND status != 'cancelled' AND start_date <= ? AND end_date >= ?
             ORDER BY start_date LIMIT 1"
        ))
        .bind(pay_group)
        .bind(end.to_string())
        .bind(start.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(period_from_row).transpose()
    }

    async fn guard_conflict(
        &self,
        id: Uuid,
        expected: PeriodStatus,
        expected_version: u64,
    ) -> EngineError {
        match self.get(id).await {
            Ok(current) => status_conflict(&current, expected, expected_version),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl PeriodStore for SqliteStore {
    async fn create(&self, input: NewPeriod) -> EngineResult<PayrollPeriod> {
        validate_new_period(&input)?;
        let period = PayrollPeriod::draft(input, Utc::now());

        // Single statement, so the overlap check and the insert are atomic.
        let inserted = sqlx::query(&format!(
            "INSERT INTO payroll_periods ({PERIOD_COLUMNS})
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE NOT EXISTS (
                 SELECT 1 FROM payroll_periods
                 WHERE pay_group = ? AND status != 'cancelled' AND start_date <= ? AND end_date >= ?
             )"
        ))
        .bind(period.id.to_string())
        .bind(period.name.clone())
        .bind(period.pay_group.clone())
        .bind(period.start_date.to_string())
        .bind(period.end_date.to_string())
        .bind(period.status.as_str())
        .bind(period.version as i64)
        .bind(period.created_at.to_rfc3339())
        .bind(period.updated_at.to_rfc3339())
        .bind(period.pay_group.clone())
        .bind(period.end_date.to_string())
        .bind(period.start_date.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if inserted.rows_affected() == 0 {
            let existing = self
                .find_overlap(&period.pay_group, period.start_date, period.end_date)
                .await?;
            return Err(match existing {
                Some(existing) => overlap_conflict(&existing),
                None => EngineError::Conflict {
                    message: "period overlaps an existing period".to_string(),
                },
            });
        }

        Ok(period)
    }

    async fn get(&self, id: Uuid) -> EngineResult<PayrollPeriod> {
        let row = sqlx::query(&format!(
            "SELECT {PERIOD_COLUMNS} FROM payroll_periods WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => period_from_row(&row),
            None => Err(EngineError::period_not_found(id)),
        }
    }

    async fn list(&self, filter: &PeriodFilter) -> EngineResult<Vec<PayrollPeriod>> {
        let rows = sqlx::query(&format!(
            "SELECT {PERIOD_COLUMNS} FROM payroll_periods
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR pay_group = ?2)
             ORDER BY start_date, id"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.pay_group.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(period_from_row).collect()
    }

    async fn set_status(
        &self,
        id: Uuid,
        expected: PeriodStatus,
        expected_version: u64,
        next: PeriodStatus,
    ) -> EngineResult<PayrollPeriod> {
        let row = sqlx::query(&format!(
            "UPDATE payroll_periods
             SET status = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND status = ? AND version = ?
             RETURNING {PERIOD_COLUMNS}"
        ))
        .bind(next.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(expected.as_str())
        .bind(expected_version as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => period_from_row(&row),
            None => Err(self.guard_conflict(id, expected, expected_version).await),
        }
    }

    async fn replace_calculations(
        &self,
        period_id: Uuid,
        expected_version: u64,
        batch: CalculationBatch,
    ) -> EngineResult<()> {
        if batch.period_id != period_id {
            return Err(batch_period_mismatch(period_id, &batch));
        }

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let period_key = period_id.to_string();

        // Touching the row takes the write lock and checks the guard at once.
        let guarded = sqlx::query(
            "UPDATE payroll_periods SET updated_at = updated_at
             WHERE id = ? AND status = 'calculating' AND version = ?",
        )
        .bind(&period_key)
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if guarded.rows_affected() == 0 {
            tx.rollback().await.map_err(store_error)?;
            return Err(self
                .guard_conflict(period_id, PeriodStatus::Calculating, expected_version)
                .await);
        }

        sqlx::query("DELETE FROM payroll_calculations WHERE period_id = ?")
            .bind(&period_key)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        sqlx::query("DELETE FROM payroll_calculation_skips WHERE period_id = ?")
            .bind(&period_key)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        for calc in &batch.calculations {
            sqlx::query(
                "INSERT INTO payroll_calculations
                 (id, period_id, employee_id, gross_pay, deductions, total_deductions, net_pay, computed_at, audit_trace)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(calc.id.to_string())
            .bind(&period_key)
            .bind(&calc.employee_id)
            .bind(calc.gross_pay.to_string())
            .bind(to_json(&calc.deductions)?)
            .bind(calc.total_deductions.to_string())
            .bind(calc.net_pay.to_string())
            .bind(calc.computed_at.to_rfc3339())
            .bind(to_json(&calc.audit_trace)?)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        for skipped in &batch.skipped {
            sqlx::query(
                "INSERT INTO payroll_calculation_skips (period_id, employee_id, reason) VALUES (?, ?, ?)",
            )
            .bind(&period_key)
            .bind(&skipped.employee_id)
            .bind(&skipped.reason)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn calculations(&self, period_id: Uuid) -> EngineResult<CalculationBatch> {
        self.get(period_id).await?;
        let period_key = period_id.to_string();

        let rows = sqlx::query(
            "SELECT id, period_id, employee_id, gross_pay, deductions, total_deductions, net_pay, computed_at, audit_trace
             FROM payroll_calculations WHERE period_id = ? ORDER BY employee_id",
        )
        .bind(&period_key)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let calculations = rows
            .iter()
            .map(calculation_from_row)
            .collect::<EngineResult<Vec<_>>>()?;

        let skipped = sqlx::query(
            "SELECT employee_id, reason FROM payroll_calculation_skips
             WHERE period_id = ? ORDER BY employee_id",
        )
        .bind(&period_key)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?
        .iter()
        .map(|row| -> EngineResult<SkippedEmployee> {
            Ok(SkippedEmployee {
                employee_id: row.try_get("employee_id").map_err(store_error)?,
                reason: row.try_get("reason").map_err(store_error)?,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

        Ok(CalculationBatch {
            period_id,
            calculations,
            skipped,
        })
    }

    async fn health_check(&self) -> EngineResult<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl PayrollInfoSource for SqliteStore {
    async fn snapshot(&self) -> EngineResult<Vec<EmployeePayrollInfo>> {
        let rows = sqlx::query("SELECT record FROM employee_payroll_info ORDER BY employee_id")
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter()
            .map(|row| {
                let record: String = row.try_get("record").map_err(store_error)?;
                parse_json("payroll info", &record)
            })
            .collect()
    }

    async fn get_info(&self, employee_id: &str) -> EngineResult<EmployeePayrollInfo> {
        let record: Option<String> =
            sqlx::query_scalar("SELECT record FROM employee_payroll_info WHERE employee_id = ?")
                .bind(employee_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        match record {
            Some(record) => parse_json("payroll info", &record),
            None => Err(EngineError::NotFound {
                entity: "Employee payroll info",
                id: employee_id.to_string(),
            }),
        }
    }

    async fn upsert(&self, info: EmployeePayrollInfo) -> EngineResult<()> {
        validate_payroll_info(&info)?;
        sqlx::query(
            "INSERT INTO employee_payroll_info (employee_id, record) VALUES (?, ?)
             ON CONFLICT(employee_id) DO UPDATE SET record = excluded.record",
        )
        .bind(&info.employee_id)
        .bind(to_json(&info)?)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}
