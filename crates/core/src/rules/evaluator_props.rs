//! Property-based tests for rule evaluation.

use chrono::Utc;
use proptest::prelude::*;
use railflow_shared::types::{Currency, Money};
use rust_decimal::Decimal;
use serde_json::json;

use crate::rules::evaluator::RuleEvaluator;
use crate::rules::evaluator::fixtures::{SeenValues, rule};
use crate::transaction::types::{Party, PaymentTransaction};
use crate::transaction::view::TransactionView;

fn cents(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

fn payment(amount: Decimal) -> PaymentTransaction {
    PaymentTransaction::new("REF", Money::new(amount, Currency::Usd), Party::default(), Party::default())
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Property 1: BETWEEN is inclusive and exact on decimals
    // ========================================================================

    #[test]
    fn prop_between_inclusive(min in 0i64..1_000_000, span in 0i64..1_000_000, amount in 0i64..3_000_000) {
        let (lo, hi) = (cents(min), cents(min + span));
        let rules = vec![rule(
            "LIMIT",
            1,
            json!({"field": "instructed_amount", "operator": "BETWEEN", "min": lo.to_string(), "max": hi.to_string()}),
            Some("AMOUNT_EXCEEDS_LIMIT"),
            true,
        )];
        let tx = payment(cents(amount));
        let report = block_on(RuleEvaluator::validate(
            &rules,
            &TransactionView::new(&tx),
            &SeenValues::default(),
            Utc::now(),
        ))
        .unwrap();
        prop_assert_eq!(report.passed(), lo <= cents(amount) && cents(amount) <= hi);
    }

    // ========================================================================
    // Property 2: Evaluation stops at the first blocking failure
    // ========================================================================

    #[test]
    fn prop_stops_at_first_blocking_failure(
        verdicts in prop::collection::vec((any::<bool>(), any::<bool>()), 1..10),
    ) {
        // (passes, blocking) per rule, priorities follow index order
        let rules: Vec<_> = verdicts
            .iter()
            .enumerate()
            .map(|(i, (passes, blocking))| {
                let expected = if *passes { "USD" } else { "EUR" };
                rule(
                    &format!("R{i:02}"),
                    i32::try_from(i).unwrap(),
                    json!({"field": "currency", "operator": "EQUALS", "value": expected}),
                    None,
                    *blocking,
                )
            })
            .collect();
        let tx = payment(cents(100));
        let report = block_on(RuleEvaluator::validate(
            &rules,
            &TransactionView::new(&tx),
            &SeenValues::default(),
            Utc::now(),
        ))
        .unwrap();

        let halt = verdicts.iter().position(|(passes, blocking)| !passes && *blocking);
        let expected_len = halt.map_or(verdicts.len(), |i| i + 1);
        prop_assert_eq!(report.outcomes.len(), expected_len);
        prop_assert_eq!(report.passed(), halt.is_none());
    }
}
