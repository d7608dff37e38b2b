//! Property-based tests for the retry schedule.

use proptest::prelude::*;

use super::backoff::BackoffSchedule;
use super::controller::{RetryController, RetryDecision};
use crate::workflow::types::ExecutionStatus;

fn schedule() -> impl Strategy<Value = BackoffSchedule> {
    (1u64..=600, 1u32..=4, 1u64..=7200, 0u32..=8).prop_map(|(base, multiplier, cap, retries)| {
        BackoffSchedule {
            base_delay_secs: base,
            multiplier,
            max_delay_secs: cap,
            max_retries: retries,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Property 1: Delays never decrease and never exceed the cap
    // ========================================================================

    #[test]
    fn prop_delays_monotonic_and_capped(schedule in schedule()) {
        let delays: Vec<u64> = schedule.delays().map(|d| d.as_secs()).collect();
        prop_assert_eq!(delays.len(), schedule.max_retries as usize);
        for pair in delays.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        for delay in &delays {
            prop_assert!(*delay <= schedule.max_delay_secs);
        }
    }

    // ========================================================================
    // Property 2: Exactly max_retries retries are granted, then exhaustion
    // ========================================================================

    #[test]
    fn prop_retry_budget_is_exact(schedule in schedule()) {
        let mut retries = 0u32;
        loop {
            match RetryController::decide(ExecutionStatus::Error, retries, &schedule) {
                RetryDecision::RetryAfter { attempt, delay } => {
                    prop_assert_eq!(attempt, retries + 1);
                    prop_assert_eq!(delay, schedule.delay(retries));
                    retries += 1;
                }
                RetryDecision::Exhausted => break,
                RetryDecision::Complete => prop_assert!(false, "failure treated as complete"),
            }
        }
        prop_assert_eq!(retries, schedule.max_retries);
    }

    // ========================================================================
    // Property 3: Non-failure outcomes never consume the retry budget
    // ========================================================================

    #[test]
    fn prop_non_failures_complete(
        schedule in schedule(),
        retries in 0u32..10,
        idx in 0usize..ExecutionStatus::ALL.len(),
    ) {
        let status = ExecutionStatus::ALL[idx];
        let decision = RetryController::decide(status, retries, &schedule);
        if status.is_failure() {
            prop_assert_ne!(decision, RetryDecision::Complete);
        } else {
            prop_assert_eq!(decision, RetryDecision::Complete);
        }
    }
}
