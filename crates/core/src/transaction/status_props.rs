//! Property-based tests for the transaction status machine.

use proptest::prelude::*;

use crate::transaction::types::TransactionStatus;

fn any_status() -> impl Strategy<Value = TransactionStatus> {
    proptest::sample::select(TransactionStatus::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Property 1: Terminal statuses never transition
    // ========================================================================

    #[test]
    fn prop_terminal_is_final(from in any_status(), to in any_status()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    // ========================================================================
    // Property 2: Side branches are reachable from any non-terminal status
    // ========================================================================

    #[test]
    fn prop_side_branches_reachable(from in any_status()) {
        prop_assume!(!from.is_terminal());
        for to in [
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
            TransactionStatus::Returned,
        ] {
            prop_assert!(from.can_transition_to(to));
        }
    }

    // ========================================================================
    // Property 3: Main-line moves never go backwards
    // ========================================================================

    #[test]
    fn prop_main_line_monotonic(from in any_status(), to in any_status()) {
        // `to` sits earlier on the main line than `from`
        if to.is_forward_of(from) && !from.is_waiting() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    // ========================================================================
    // Property 4: No self transitions
    // ========================================================================

    #[test]
    fn prop_no_self_transition(status in any_status()) {
        prop_assert!(!status.can_transition_to(status));
    }

    // ========================================================================
    // Property 5: as_str / parse round trip
    // ========================================================================

    #[test]
    fn prop_status_parse_round_trip(status in any_status()) {
        prop_assert_eq!(TransactionStatus::parse(status.as_str()), Some(status));
    }
}
