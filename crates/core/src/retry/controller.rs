//! Retry and timeout control around a single step attempt.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::backoff::BackoffSchedule;
use crate::executor::handler::{StepContext, StepResult};
use crate::executor::registry::StepRegistry;
use crate::workflow::types::ExecutionStatus;

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The outcome is final for this step (success, suspicious, pending, ...).
    Complete,
    /// Retry after `delay`; `attempt` is the new retry count.
    RetryAfter {
        /// Retry count after this decision.
        attempt: u32,
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Failure with no retries left; apply `onErrorAction`.
    Exhausted,
}

/// Stateless retry/timeout controller.
pub struct RetryController;

impl RetryController {
    /// Decides what follows an attempt that ended in `status` after
    /// `retry_count` retries.
    #[must_use]
    pub fn decide(status: ExecutionStatus, retry_count: u32, schedule: &BackoffSchedule) -> RetryDecision {
        if !status.is_failure() {
            return RetryDecision::Complete;
        }
        if retry_count < schedule.max_retries {
            RetryDecision::RetryAfter {
                attempt: retry_count + 1,
                delay: schedule.delay(retry_count),
            }
        } else {
            RetryDecision::Exhausted
        }
    }

    /// Runs one attempt through the registry, bounded by `timeout`.
    ///
    /// Handler errors become `ERROR` results and an elapsed timeout becomes a
    /// `TIMEOUT` result; the measured wall time is stored on the result.
    pub async fn attempt(registry: &StepRegistry, ctx: &StepContext, timeout: Duration) -> StepResult {
        let started = Instant::now();
        let mut result = match tokio::time::timeout(timeout, registry.execute(ctx)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(
                    transaction_id = %ctx.transaction_id,
                    step_code = %ctx.step_code,
                    attempt = ctx.attempt,
                    error = %e,
                    "Step handler failed"
                );
                e.into_result()
            }
            Err(_) => {
                warn!(
                    transaction_id = %ctx.transaction_id,
                    step_code = %ctx.step_code,
                    attempt = ctx.attempt,
                    timeout_secs = timeout.as_secs(),
                    "Step attempt timed out"
                );
                StepResult::timeout(format!(
                    "Step {} exceeded {}s",
                    ctx.step_code,
                    timeout.as_secs()
                ))
            }
        };
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            transaction_id = %ctx.transaction_id,
            step_code = %ctx.step_code,
            status = %result.status,
            duration_ms = result.duration_ms,
            "Step attempt finished"
        );
        result
    }
}
