//! Background execution of a calculation run.
//!
//! The runner owns the [`RunHandle`] for its run. It snapshots payroll
//! info, runs the engine on the blocking pool, saves the batch under the
//! version guard and moves the period to Calculated. The run record is
//! finalised last, so a poller that sees a terminal run also sees the
//! period's final status.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::calculation::CalculationEngine;
use crate::config::RetryConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{PayrollPeriod, PeriodStatus, RunErrorKind, SkippedEmployee};
use crate::progress::RunHandle;
use crate::store::{PayrollInfoSource, PeriodStore};

use super::transitions::{PeriodAction, next_status};

const SNAPSHOT_PROGRESS: u8 = 10;
const ENGINE_PROGRESS_SPAN: usize = 80;
const SAVING_PROGRESS: u8 = 90;

/// Everything a spawned run needs.
pub(crate) struct CalculationJob {
    pub store: Arc<dyn PeriodStore>,
    pub payroll_info: Arc<dyn PayrollInfoSource>,
    pub engine: Arc<CalculationEngine>,
    /// The period as it was moved to Calculating.
    pub period: PayrollPeriod,
    /// Where the period goes back to if the run fails.
    pub prior_status: PeriodStatus,
}

enum RunEnd {
    Completed {
        calculated_count: usize,
        skipped: Vec<SkippedEmployee>,
    },
    /// The period left Calculating at our version; nothing was kept.
    Discarded { reason: String },
}

/// Maps engine progress onto the 10..90 band of the run.
fn engine_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return SAVING_PROGRESS;
    }
    let span = done.min(total) * ENGINE_PROGRESS_SPAN / total;
    SNAPSHOT_PROGRESS + span as u8
}

/// Runs an operation, retrying transient store failures with backoff.
///
/// Non-transient errors, `Conflict` included, are returned at once. When
/// the attempts run out the last error becomes a `SystemicFailure`.
pub(crate) async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    operation: &str,
    mut attempt_once: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut attempt = 1;
    loop {
        match attempt_once().await {
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.backoff_after(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                return Err(EngineError::SystemicFailure {
                    message: format!("{operation} failed after {attempt} attempt(s): {err}"),
                });
            }
            result => return result,
        }
    }
}

/// Drives one run to a terminal state.
pub(crate) async fn run_calculation(job: CalculationJob, handle: RunHandle) {
    let started = Instant::now();
    let run_id = handle.run_id();
    let period_id = job.period.id;

    handle.report_progress(0);
    info!(run_id = %run_id, period_id = %period_id, "Calculation run started");

    match execute(&job, &handle).await {
        Ok(RunEnd::Completed {
            calculated_count,
            skipped,
        }) => {
            info!(
                run_id = %run_id,
                period_id = %period_id,
                calculated_count,
                skipped_count = skipped.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Calculation run completed"
            );
            handle.complete(calculated_count, skipped);
        }
        Ok(RunEnd::Discarded { reason }) => {
            warn!(
                run_id = %run_id,
                period_id = %period_id,
                reason = %reason,
                "Calculation results discarded"
            );
            handle.fail(
                RunErrorKind::Discarded,
                "The period changed while calculating; results were discarded",
            );
        }
        Err(err) => {
            error!(
                run_id = %run_id,
                period_id = %period_id,
                error = %err,
                "Calculation run failed"
            );
            revert_period(&job).await;
            handle.fail(
                RunErrorKind::SystemicFailure,
                format!(
                    "Calculation failed; the period was returned to '{}'",
                    job.prior_status
                ),
            );
        }
    }
}

async fn execute(job: &CalculationJob, handle: &RunHandle) -> EngineResult<RunEnd> {
    let retry = job.engine.config().policy().retry.clone();
    let period_id = job.period.id;
    let version = job.period.version;

    let payroll_info = with_retry(&retry, "payroll info snapshot", || {
        job.payroll_info.snapshot()
    })
    .await?;
    handle.report_progress(SNAPSHOT_PROGRESS);

    let engine = Arc::clone(&job.engine);
    let period = job.period.clone();
    let sink = handle.sink();
    let outcome = tokio::task::spawn_blocking(move || {
        engine.calculate_with_progress(&period, &payroll_info, |done, total| {
            sink.report(engine_progress(done, total))
        })
    })
    .await
    .map_err(|e| EngineError::SystemicFailure {
        message: format!("calculation task did not finish: {e}"),
    })?;

    let calculated_count = outcome.results.len();
    let skipped = outcome.skipped.clone();
    let batch = outcome.into_batch(period_id, Utc::now());
    handle.report_progress(SAVING_PROGRESS);

    let saved = with_retry(&retry, "save calculations", || {
        job.store
            .replace_calculations(period_id, version, batch.clone())
    })
    .await;
    match saved {
        Ok(()) => {}
        Err(EngineError::Conflict { message }) => return Ok(RunEnd::Discarded { reason: message }),
        Err(err) => return Err(err),
    }

    let next = next_status(PeriodStatus::Calculating, PeriodAction::CompleteRun)?;
    let moved = with_retry(&retry, "complete period", || {
        job.store
            .set_status(period_id, PeriodStatus::Calculating, version, next)
    })
    .await;
    match moved {
        Ok(_) => Ok(RunEnd::Completed {
            calculated_count,
            skipped,
        }),
        Err(EngineError::Conflict { message }) => Ok(RunEnd::Discarded { reason: message }),
        Err(err) => Err(err),
    }
}

/// Puts the period back where it was before the run, unless something
/// else (a cancel) already moved it.
async fn revert_period(job: &CalculationJob) {
    let retry = job.engine.config().policy().retry.clone();
    let reverted = with_retry(&retry, "revert period", || {
        job.store.set_status(
            job.period.id,
            PeriodStatus::Calculating,
            job.period.version,
            job.prior_status,
        )
    })
    .await;

    match reverted {
        Ok(period) => info!(
            period_id = %period.id,
            status = %period.status,
            "Period reverted after failed run"
        ),
        Err(EngineError::Conflict { message }) => info!(
            period_id = %job.period.id,
            reason = %message,
            "Period already left Calculating; not reverted"
        ),
        Err(err) => error!(
            period_id = %job.period.id,
            error = %err,
            "Failed to revert period after failed run"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 2,
        }
    }

    fn unavailable() -> EngineError {
        EngineError::StoreUnavailable {
            message: "database is locked".to_string(),
        }
    }

    #[test]
    fn test_engine_progress_band() {
        assert_eq!(engine_progress(0, 10), 10);
        assert_eq!(engine_progress(5, 10), 50);
        assert_eq!(engine_progress(10, 10), 90);
        assert_eq!(engine_progress(0, 0), 90);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_retry(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(unavailable()) } else { Ok(n) } }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_as_systemic_failure() {
        let calls = AtomicU32::new(0);
        let result: EngineResult<()> = with_retry(&fast_retry(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        })
        .await;
        assert!(matches!(result, Err(EngineError::SystemicFailure { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_conflict_is_never_retried() {
        let calls = AtomicU32::new(0);
        let result: EngineResult<()> = with_retry(&fast_retry(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(EngineError::Conflict {
                    message: "stale".to_string(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
