//! Property-based tests for transition resolution.

use proptest::prelude::*;
use railflow_shared::types::{Currency, Money};
use rust_decimal::Decimal;

use crate::transaction::types::{Party, PaymentTransaction};
use crate::transaction::view::TransactionView;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::graph::fixtures::{definition, edge, step};
use crate::workflow::resolver::TransitionResolver;
use crate::workflow::types::{ExecutionStatus, StepType};

const FALLBACK_PRIORITY: u32 = 1000;

fn payment(amount: i64) -> PaymentTransaction {
    PaymentTransaction::new(
        "REF",
        Money::new(Decimal::from(amount), Currency::Usd),
        Party::default(),
        Party::default(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Property 1: Resolution is deterministic and picks the first matching
    // edge in (priority, id) order
    // ========================================================================

    #[test]
    fn prop_resolution_deterministic(
        guards in prop::collection::vec((0u32..50, 0i64..1000), 1..8),
        amount in 0i64..1000,
    ) {
        let def = definition();
        let mut steps = Vec::new();
        let mut transitions = Vec::new();

        for (i, (priority, threshold)) in guards.iter().enumerate() {
            let sequence = u32::try_from(i).unwrap();
            let target = step(def.id, sequence, &format!("S{i}"), StepType::Enrichment);
            let mut guarded = edge(def.id, None, Some(target.id), ExecutionStatus::Pending, *priority);
            guarded.condition_expression = Some(format!("amount >= {threshold}"));
            steps.push(target);
            transitions.push(guarded);
        }
        transitions.push(edge(def.id, None, None, ExecutionStatus::Pending, FALLBACK_PRIORITY));

        // Reference answer computed directly from the rows.
        let expected = transitions
            .iter()
            .enumerate()
            .filter(|(i, _)| guards.get(*i).is_none_or(|(_, threshold)| amount >= *threshold))
            .map(|(_, t)| (t.priority, t.id, t.to_step_id))
            .min_by_key(|(priority, id, _)| (*priority, *id))
            .map(|(_, _, to)| to);

        let graph = WorkflowGraph::load(def, steps, transitions).unwrap();
        let tx = payment(amount);
        let view = TransactionView::new(&tx);

        let first = TransitionResolver::resolve(&graph, None, ExecutionStatus::Pending, &view).unwrap();
        let second = TransitionResolver::resolve(&graph, None, ExecutionStatus::Pending, &view).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(Some(first.next), expected);
    }

    // ========================================================================
    // Property 2: Without a fallback edge, no match is always an error
    // ========================================================================

    #[test]
    fn prop_no_match_is_error(threshold in 1i64..1000, amount in 0i64..1000) {
        let def = definition();
        let target = step(def.id, 1, "S", StepType::Enrichment);
        let mut guarded = edge(def.id, None, Some(target.id), ExecutionStatus::Pending, 1);
        guarded.condition_expression = Some(format!("amount >= {threshold}"));
        let graph = WorkflowGraph::load(def, vec![target], vec![guarded]).unwrap();
        let tx = payment(amount);

        let result = TransitionResolver::resolve(&graph, None, ExecutionStatus::Pending, &TransactionView::new(&tx));
        prop_assert_eq!(result.is_ok(), amount >= threshold);
    }
}
