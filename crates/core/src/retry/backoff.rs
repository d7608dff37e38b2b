//! Exponential backoff schedule.

use std::time::Duration;

use crate::workflow::policy::RetryPolicy;
use crate::workflow::types::WorkflowStep;

/// Retry schedule for one step.
///
/// The delay before retry `n` (zero-based) is
/// `base_delay_secs × multiplier^n`, capped at `max_delay_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    /// Delay before the first retry.
    pub base_delay_secs: u64,
    /// Growth factor per retry (1 = linear).
    pub multiplier: u32,
    /// Upper bound for any single delay.
    pub max_delay_secs: u64,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl BackoffSchedule {
    /// Builds the schedule for a step.
    ///
    /// The step owns its retry budget and base delay, so `max_retries = 0`
    /// means no retries at all. The workflow policy supplies the multiplier
    /// and the cap.
    #[must_use]
    pub fn for_step(step: &WorkflowStep, policy: &RetryPolicy) -> Self {
        Self {
            base_delay_secs: step.retry_delay_seconds,
            multiplier: policy.multiplier.max(1),
            max_delay_secs: policy.max_delay_seconds,
            max_retries: step.max_retries,
        }
    }

    /// Delay in seconds before the zero-based retry `attempt`.
    #[must_use]
    pub fn delay_secs(&self, attempt: u32) -> u64 {
        let factor = u64::from(self.multiplier).saturating_pow(attempt);
        self.base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs)
    }

    /// Delay before the zero-based retry `attempt`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.delay_secs(attempt))
    }

    /// Every delay of the schedule, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay(attempt))
    }
}
