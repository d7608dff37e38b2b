//! Intake routing and the less common human decisions.

mod common;

use rust_decimal_macros::dec;
use serde_json::json;

use common::{Harness, Script};
use railflow_core::audit::types::ProcessEventType;
use railflow_core::engine::{ConfigurationError, EngineError, Progress};
use railflow_core::executor::StepResult;
use railflow_core::hitl::types::{HitlAction, HitlDecision};
use railflow_core::ports::PaymentStore;
use railflow_core::transaction::types::TransactionStatus;
use railflow_core::workflow::types::StepType;

fn flagged() -> Harness {
    Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({"fraud_score": 88})),
    ))
}

// ============================================================================
// Intake
// ============================================================================

#[tokio::test]
async fn test_unroutable_payment_is_refused_at_intake() {
    let h = Harness::new();
    let mut tx = common::payment(dec!(100.00));
    tx.metadata = json!({"payment_type": "INSTANT", "urgency": "LOW"});

    let err = h.engine.submit(tx).await.unwrap_err();
    assert!(matches!(err, EngineError::Configuration(ConfigurationError::NoRoutingRule(_))));
    assert_eq!(h.store.transaction_count(), 0);
}

#[tokio::test]
async fn test_pre_bound_payment_skips_routing() {
    let h = Harness::new();
    let tx = common::payment(dec!(100.00)).on_workflow(h.seed.rail_id, Some(h.seed.product_id), h.seed.workflow_id);
    let tx = h.engine.submit(tx).await.unwrap();

    let events: Vec<ProcessEventType> = h
        .store
        .list_process_logs(tx.id)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.entry.event_type)
        .collect();
    assert_eq!(events, vec![ProcessEventType::TransactionReceived]);
    assert_eq!(tx.status, TransactionStatus::Initiated);
    assert_eq!(tx.version, 0);
}

#[tokio::test]
async fn test_submitting_a_finished_payment_is_refused() {
    let h = Harness::new();
    let mut tx = common::payment(dec!(100.00));
    tx.status = TransactionStatus::Completed;

    let err = h.engine.submit(tx).await.unwrap_err();
    assert!(matches!(err, EngineError::TerminalStateViolation { .. }));
}

// ============================================================================
// Decisions
// ============================================================================

#[tokio::test]
async fn test_skip_continues_with_the_next_step() {
    let h = flagged();
    let tx = h.submit(dec!(5000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    let progress = h
        .engine
        .resolve_intervention(intervention_id, HitlDecision::new(HitlAction::Skip, "analyst.kim"))
        .await
        .unwrap();
    assert!(matches!(progress, Progress::AwaitingCallback { .. }));
    assert_eq!(h.calls_of("FRAUD_CHECK"), 1);
    assert_eq!(h.calls_of("COMPLIANCE_CHECK"), 1);
}

#[tokio::test]
async fn test_restart_runs_the_workflow_from_the_top() {
    let h = flagged();
    let tx = h.submit(dec!(5000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };
    let started_at = h.store.get_transaction(tx.id).await.unwrap().unwrap().workflow_started_at;

    let progress = h
        .engine
        .resolve_intervention(intervention_id, HitlDecision::new(HitlAction::Restart, "analyst.kim"))
        .await
        .unwrap();
    assert!(matches!(progress, Progress::AwaitingCallback { .. }));
    assert_eq!(h.calls_of("FRAUD_CHECK"), 2);

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.workflow_started_at, started_at);
    assert_eq!(stored.context["fraud_score"], json!(12));

    let starts = h
        .store
        .list_process_logs(tx.id)
        .await
        .unwrap()
        .iter()
        .filter(|l| l.entry.event_type == ProcessEventType::WorkflowStarted)
        .count();
    assert_eq!(starts, 2);
}

#[tokio::test]
async fn test_manual_escalation_keeps_the_transaction_parked() {
    let h = flagged();
    let tx = h.submit(dec!(5000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    let decision = HitlDecision::new(HitlAction::Escalate, "analyst.kim").with_notes("Needs a second pair of eyes");
    let progress = h.engine.resolve_intervention(intervention_id, decision).await.unwrap();
    assert_eq!(progress, Progress::Suspended { intervention_id });

    let intervention = h.store.get_hitl_intervention(intervention_id).await.unwrap().unwrap();
    assert!(intervention.is_open());
    assert!(intervention.is_escalated);
    assert_eq!(intervention.queue_name, "SUPERVISOR");

    let queue = h.engine.open_interventions(Some("SUPERVISOR"), None).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert!(h.engine.open_interventions(Some("DEFAULT"), None).await.unwrap().is_empty());

    let trail = h.store.list_hitl_audit(intervention_id).await.unwrap();
    assert_eq!(trail[0].actor, "analyst.kim");
    assert_eq!(trail[0].notes.as_deref(), Some("Needs a second pair of eyes"));

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Suspicious);
}

#[tokio::test]
async fn test_decision_without_actor_is_rejected() {
    let h = flagged();
    let tx = h.submit(dec!(5000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    let err = h
        .engine
        .resolve_intervention(intervention_id, HitlDecision::new(HitlAction::Approve, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidDecision(_)));
    assert!(h.store.get_hitl_intervention(intervention_id).await.unwrap().unwrap().is_open());
}
