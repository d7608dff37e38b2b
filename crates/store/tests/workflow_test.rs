//! End-to-end scenarios for the FedNow outbound workflow.
//!
//! Every test drives the seeded `FN-OUTBOUND-CT` workflow through the
//! orchestrator against the in-memory store on a manual clock.

#![allow(clippy::too_many_lines)]

mod common;

use std::time::Duration;

use rust_decimal_macros::dec;

use common::{Harness, Script};
use railflow_core::audit::types::{ErrorCategory, ProcessEventType};
use railflow_core::engine::{Delivery, EngineError, HITL_REJECTED_CODE, Progress, WorkerPool};
use railflow_core::executor::StepResult;
use railflow_core::hitl::types::{HitlAction, HitlContext, HitlDecision, SYSTEM_ACTOR};
use railflow_core::ports::PaymentStore;
use railflow_core::transaction::types::{TransactionPatch, TransactionStatus};
use railflow_core::workflow::types::{ExecutionStatus, StepType};
use serde_json::json;

fn completed_steps(journey: &railflow_core::engine::Journey) -> Vec<String> {
    journey
        .process_logs
        .iter()
        .filter(|l| l.entry.event_type == ProcessEventType::StepCompleted)
        .filter_map(|l| l.entry.step_code.clone())
        .collect()
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_valid_payment_reaches_submission_and_waits_for_ack() {
    let h = Harness::new();
    let tx = h.submit(dec!(25000.00)).await;
    assert_eq!(tx.rail_id, Some(h.seed.rail_id));
    assert_eq!(tx.workflow_id, Some(h.seed.workflow_id));

    let progress = h.engine.advance(tx.id).await.unwrap();
    let ack = h.seed.step("ACKNOWLEDGE").unwrap();
    assert!(matches!(progress, Progress::AwaitingCallback { step_id, .. } if step_id == ack));

    let journey = h.engine.journey(tx.id).await.unwrap();
    assert_eq!(journey.transaction.status, TransactionStatus::SentToRail);
    assert_eq!(
        completed_steps(&journey),
        vec!["VALIDATE", "FRAUD_CHECK", "COMPLIANCE_CHECK", "TRANSFORM", "SUBMIT"]
    );
    assert_eq!(journey.transaction.context["message_id"], json!("FN20250303000001"));
    assert!(journey.transaction.transformed_message.is_some());
    assert!(journey.error_logs.is_empty());
    assert!(journey.interventions.is_empty());
}

#[tokio::test]
async fn test_callbacks_complete_the_workflow() {
    let h = Harness::new();
    let tx = h.submit(dec!(25000.00)).await;

    let Progress::AwaitingCallback { fence, .. } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected to wait for the acknowledgment");
    };
    let ack = StepResult::success(json!({"acknowledgment": "ACCP", "payment_status": "ACSC"}));
    let Delivery::Applied(Progress::AwaitingCallback { fence: notify_fence, .. }) =
        h.engine.deliver_outcome(tx.id, fence, ack).await.unwrap()
    else {
        panic!("expected to wait for the notification");
    };
    assert_ne!(fence, notify_fence);

    let done = h
        .engine
        .deliver_outcome(tx.id, notify_fence, StepResult::success(json!({"notifications": 3})))
        .await
        .unwrap();
    assert_eq!(done, Delivery::Applied(Progress::Completed));

    let journey = h.engine.journey(tx.id).await.unwrap();
    assert_eq!(journey.transaction.status, TransactionStatus::Completed);
    assert!(journey.transaction.completed_at.is_some());
    let last = journey.process_logs.last().unwrap();
    assert_eq!(last.entry.event_type, ProcessEventType::WorkflowCompleted);
}

#[tokio::test]
async fn test_event_sequences_are_gapless() {
    let h = Harness::new();
    let tx = h.submit(dec!(1200.50)).await;
    h.engine.advance(tx.id).await.unwrap();

    let logs = h.store.list_process_logs(tx.id).await.unwrap();
    let sequences: Vec<u64> = logs.iter().map(|l| l.event_sequence).collect();
    let expected: Vec<u64> = (1..=logs.len() as u64).collect();
    assert_eq!(sequences, expected);
    assert_eq!(logs[0].entry.event_type, ProcessEventType::TransactionReceived);
    assert_eq!(logs[1].entry.event_type, ProcessEventType::Routed);
}

// ============================================================================
// Rule violations and terminal states
// ============================================================================

#[tokio::test]
async fn test_amount_over_limit_fails_before_submission() {
    let h = Harness::new();
    let tx = h.submit_bound(dec!(600000.00)).await;

    let progress = h.engine.advance(tx.id).await.unwrap();
    assert_eq!(
        progress,
        Progress::Failed {
            error_code: "AMOUNT_EXCEEDS_LIMIT".into()
        }
    );
    assert_eq!(h.calls_of("SUBMIT"), 0);
    assert!(h.calls().is_empty());

    let journey = h.engine.journey(tx.id).await.unwrap();
    assert_eq!(journey.transaction.status, TransactionStatus::Failed);
    assert_eq!(journey.transaction.failure_code.as_deref(), Some("AMOUNT_EXCEEDS_LIMIT"));
    let error = &journey.error_logs[0];
    assert_eq!(error.error_code, "AMOUNT_EXCEEDS_LIMIT");
    assert_eq!(error.category, ErrorCategory::BusinessRuleViolation);
    assert!(error.process_log_id.is_some());
}

#[tokio::test]
async fn test_advancing_a_finished_transaction_is_refused() {
    let h = Harness::new();
    let tx = h.submit_bound(dec!(600000.00)).await;
    h.engine.advance(tx.id).await.unwrap();
    let logged = h.store.list_process_logs(tx.id).await.unwrap().len();

    let err = h.engine.advance(tx.id).await.unwrap_err();
    assert!(matches!(err, EngineError::TerminalStateViolation { status: TransactionStatus::Failed, .. }));

    // no step ran and nothing was appended to the process log
    assert_eq!(h.store.list_process_logs(tx.id).await.unwrap().len(), logged);
    let errors = h.store.list_error_logs(tx.id).await.unwrap();
    assert_eq!(errors.last().unwrap().category, ErrorCategory::TerminalStateViolation);
}

#[tokio::test]
async fn test_duplicate_end_to_end_id_is_rejected() {
    let h = Harness::new();
    let first = h.engine.submit(common::payment(dec!(100.00))).await.unwrap();
    assert!(matches!(h.engine.advance(first.id).await.unwrap(), Progress::AwaitingCallback { .. }));

    let mut second = common::payment(dec!(100.00));
    second.end_to_end_id = first.end_to_end_id.clone();
    let second = h.engine.submit(second).await.unwrap();
    assert_eq!(
        h.engine.advance(second.id).await.unwrap(),
        Progress::Failed {
            error_code: "DUPLICATE_TRANSACTION".into()
        }
    );
}

#[tokio::test]
async fn test_unavailable_rail_fails_the_run() {
    let h = Harness::new();
    let tx = h.submit(dec!(500.00)).await;
    h.store.set_rail_active(h.seed.rail_id, false).unwrap();

    let progress = h.engine.advance(tx.id).await.unwrap();
    assert_eq!(
        progress,
        Progress::Failed {
            error_code: "RAIL_UNAVAILABLE".into()
        }
    );
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test]
async fn test_submission_retries_with_backoff_then_fails() {
    let outage = || StepResult::failure("RAIL_UNREACHABLE", "FedNow gateway unreachable");
    let h = Harness::scripted(
        Script::default()
            .then(StepType::Submission, outage())
            .then(StepType::Submission, outage())
            .then(StepType::Submission, outage())
            .then(StepType::Submission, outage()),
    );
    let tx = h.submit(dec!(25000.00)).await;

    let mut pool = WorkerPool::new(h.engine.clone(), 2);
    pool.submit(tx.id).await.unwrap();
    let mut scheduled = Vec::new();
    let progress = loop {
        let (_, outcome) = pool.join_next().await.unwrap();
        match outcome.unwrap() {
            Progress::RetryScheduled { attempt, retry_at, .. } => {
                scheduled.push(attempt);
                pool.submit_at(tx.id, retry_at);
            }
            other => break other,
        }
    };
    assert_eq!(
        progress,
        Progress::Failed {
            error_code: "RAIL_UNREACHABLE".into()
        }
    );
    assert_eq!(scheduled, vec![1, 2, 3]);
    assert_eq!(h.calls_of("SUBMIT"), 4);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(60), Duration::from_secs(120), Duration::from_secs(240)]
    );

    let logs = h.store.list_process_logs(tx.id).await.unwrap();
    let retries: Vec<u32> = logs
        .iter()
        .filter(|l| l.entry.event_type == ProcessEventType::StepRetrying)
        .map(|l| l.entry.attempt)
        .collect();
    assert_eq!(retries, vec![1, 2, 3]);
    assert_eq!(h.calls_of("ACKNOWLEDGE"), 0);
}

#[tokio::test]
async fn test_retry_recovers_before_budget_is_spent() {
    let h = Harness::scripted(
        Script::default().then(StepType::Submission, StepResult::timeout("no answer in 30s")),
    );
    let tx = h.submit(dec!(25000.00)).await;

    let Progress::RetryScheduled { attempt, retry_at, .. } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a scheduled retry");
    };
    assert_eq!(attempt, 1);
    assert_eq!(retry_at, common::start_time() + chrono::Duration::seconds(60));
    assert!(h.clock.sleeps().is_empty());

    // not due yet: neither an advance nor the sweep runs the step again
    assert!(matches!(
        h.engine.advance(tx.id).await.unwrap(),
        Progress::RetryScheduled { attempt: 1, .. }
    ));
    assert_eq!(h.engine.sweep().await.unwrap().retries_resumed, 0);
    assert_eq!(h.calls_of("SUBMIT"), 1);

    h.clock.advance(chrono::Duration::seconds(60));
    assert_eq!(h.engine.sweep().await.unwrap().retries_resumed, 1);
    assert_eq!(h.calls_of("SUBMIT"), 2);

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.retry_count, 0);
    assert_eq!(stored.retry_at, None);
    assert_eq!(stored.status, TransactionStatus::SentToRail);
}

#[tokio::test]
async fn test_sweep_is_not_held_up_by_a_pending_retry() {
    let h = Harness::scripted(
        Script::default()
            .then(StepType::FraudCheck, StepResult::suspicious("HIGH_RISK", json!({})))
            .then(StepType::Submission, StepResult::failure("RAIL_UNREACHABLE", "FedNow gateway unreachable")),
    );
    let flagged = h.submit(dec!(25000.00)).await;
    assert!(matches!(
        h.engine.advance(flagged.id).await.unwrap(),
        Progress::Suspended { .. }
    ));

    h.clock.advance(chrono::Duration::seconds(30 * 60 + 30));
    let retrying = h.submit(dec!(25000.00)).await;
    let Progress::RetryScheduled { retry_at, .. } = h.engine.advance(retrying.id).await.unwrap() else {
        panic!("expected a scheduled retry");
    };

    h.clock.advance(chrono::Duration::seconds(30));
    let report = tokio::time::timeout(Duration::from_secs(2), h.engine.sweep())
        .await
        .expect("sweep stalled behind a retrying transaction")
        .unwrap();
    assert_eq!(report.escalated, 1);
    assert_eq!(report.retries_resumed, 0);
    assert_eq!(h.calls_of("SUBMIT"), 1);

    // the lock is free while the backoff runs
    let progress = tokio::time::timeout(Duration::from_secs(2), h.engine.advance(retrying.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        progress,
        Progress::RetryScheduled {
            step_id: h.seed.step("SUBMIT").unwrap(),
            attempt: 1,
            retry_at,
        }
    );

    h.clock.set(retry_at);
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.retries_resumed, 1);
    assert_eq!(h.calls_of("SUBMIT"), 2);
}

#[tokio::test]
async fn test_workflow_timeout_during_backoff_fails_the_run() {
    let h = Harness::scripted(
        Script::default().then(StepType::Submission, StepResult::failure("RAIL_UNREACHABLE", "gateway down")),
    );
    let tx = h.submit(dec!(25000.00)).await;
    assert!(matches!(
        h.engine.advance(tx.id).await.unwrap(),
        Progress::RetryScheduled { .. }
    ));

    h.clock.advance(chrono::Duration::minutes(61));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.workflow_timeouts, 1);
    assert_eq!(report.retries_resumed, 0);
    assert_eq!(h.calls_of("SUBMIT"), 1);

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
    assert_eq!(stored.failure_code.as_deref(), Some("WORKFLOW_TIMEOUT"));
    assert_eq!(stored.retry_at, None);
}

#[tokio::test]
async fn test_step_without_retries_goes_straight_to_its_error_action() {
    let h = Harness::new();
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::AwaitingCallback { fence, .. } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected to wait for the acknowledgment");
    };

    let delivery = h
        .engine
        .deliver_outcome(tx.id, fence, StepResult::error("ACK_GATEWAY_DOWN", "acknowledgment gateway down"))
        .await
        .unwrap();
    let Delivery::Applied(Progress::Suspended { intervention_id }) = delivery else {
        panic!("expected ACKNOWLEDGE to park on an intervention, got {delivery:?}");
    };

    let logs = h.store.list_process_logs(tx.id).await.unwrap();
    assert!(logs.iter().all(|l| l.entry.event_type != ProcessEventType::StepRetrying));
    assert!(h.clock.sleeps().is_empty());

    let intervention = h.store.get_hitl_intervention(intervention_id).await.unwrap().unwrap();
    assert_eq!(intervention.step_id, Some(h.seed.step("ACKNOWLEDGE").unwrap()));
    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.retry_count, 0);
}

// ============================================================================
// Human in the loop
// ============================================================================

#[tokio::test]
async fn test_suspicious_payment_parks_on_one_intervention() {
    let h = Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({"fraud_score": 91, "risk_level": "HIGH"})),
    ));
    let tx = h.submit(dec!(25000.00)).await;

    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };
    // advancing a parked transaction executes nothing
    assert_eq!(
        h.engine.advance(tx.id).await.unwrap(),
        Progress::Suspended { intervention_id }
    );
    assert_eq!(h.calls(), vec!["FRAUD_CHECK"]);

    let journey = h.engine.journey(tx.id).await.unwrap();
    assert_eq!(journey.transaction.status, TransactionStatus::Suspicious);
    assert!(journey.transaction.is_suspicious);
    assert!(journey.transaction.requires_hitl);
    assert_eq!(journey.interventions.len(), 1);
    let intervention = &journey.interventions[0];
    assert_eq!(intervention.context, HitlContext::Suspicious);
    assert_eq!(intervention.step_code.as_deref(), Some("FRAUD_CHECK"));
    assert_eq!(intervention.parked_status, TransactionStatus::Validated);

    let open = h.engine.open_interventions(None, None).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, intervention_id);
}

#[tokio::test]
async fn test_approval_resumes_after_the_flagged_step() {
    let h = Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({"fraud_score": 91})),
    ));
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    let decision = HitlDecision::new(HitlAction::Approve, "analyst.kim").with_notes("Known counterparty");
    let progress = h.engine.resolve_intervention(intervention_id, decision).await.unwrap();
    assert!(matches!(progress, Progress::AwaitingCallback { .. }));
    assert_eq!(h.calls_of("FRAUD_CHECK"), 1);
    assert_eq!(h.calls_of("SUBMIT"), 1);

    let journey = h.engine.journey(tx.id).await.unwrap();
    let intervention = &journey.interventions[0];
    assert!(intervention.is_resolved);
    assert_eq!(intervention.action_taken, Some(HitlAction::Approve));
    assert_eq!(intervention.resolved_by.as_deref(), Some("analyst.kim"));
    assert_eq!(journey.audit_trail.len(), 1);
    assert_eq!(journey.audit_trail[0].actor, "analyst.kim");

    let again = h
        .engine
        .resolve_intervention(intervention_id, HitlDecision::new(HitlAction::Approve, "analyst.kim"))
        .await
        .unwrap_err();
    assert!(matches!(again, EngineError::InterventionClosed(_)));
}

#[tokio::test]
async fn test_rejection_fails_the_transaction() {
    let h = Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({})),
    ));
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    let progress = h
        .engine
        .resolve_intervention(intervention_id, HitlDecision::new(HitlAction::Reject, "analyst.kim"))
        .await
        .unwrap();
    assert_eq!(
        progress,
        Progress::Failed {
            error_code: HITL_REJECTED_CODE.into()
        }
    );
    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
    assert_eq!(stored.current_step_status, Some(ExecutionStatus::HitlRejected));
    assert_eq!(h.calls_of("COMPLIANCE_CHECK"), 0);
}

#[tokio::test]
async fn test_cancel_and_force_complete_are_terminal() {
    for (action, expected, status) in [
        (HitlAction::Cancel, Progress::Cancelled, TransactionStatus::Cancelled),
        (HitlAction::ForceComplete, Progress::Completed, TransactionStatus::Completed),
    ] {
        let h = Harness::scripted(Script::default().then(
            StepType::FraudCheck,
            StepResult::suspicious("HIGH_RISK", json!({})),
        ));
        let tx = h.submit(dec!(25000.00)).await;
        let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
            panic!("expected a suspension");
        };
        let progress = h
            .engine
            .resolve_intervention(intervention_id, HitlDecision::new(action, "ops.lead"))
            .await
            .unwrap();
        assert_eq!(progress, expected);
        assert_eq!(h.store.get_transaction(tx.id).await.unwrap().unwrap().status, status);
        assert_eq!(h.calls_of("COMPLIANCE_CHECK"), 0);
    }
}

#[tokio::test]
async fn test_modify_patches_and_retries_the_step() {
    let h = Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({})),
    ));
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    let empty = HitlDecision::new(HitlAction::Modify, "analyst.kim");
    let err = h.engine.resolve_intervention(intervention_id, empty).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidDecision(_)));

    let patch = TransactionPatch {
        remittance_info: Some("Invoice 4471".into()),
        ..TransactionPatch::default()
    };
    let decision = HitlDecision::new(HitlAction::Modify, "analyst.kim").with_patch(patch);
    let progress = h.engine.resolve_intervention(intervention_id, decision).await.unwrap();
    assert!(matches!(progress, Progress::AwaitingCallback { .. }));
    assert_eq!(h.calls_of("FRAUD_CHECK"), 2);

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.remittance_info.as_deref(), Some("Invoice 4471"));
}

#[tokio::test]
async fn test_large_amount_needs_approval_at_checkpoint() {
    let h = Harness::new();
    let tx = h.submit(dec!(250000.00)).await;

    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected an approval request");
    };
    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::PendingApproval);

    let intervention = h.store.get_hitl_intervention(intervention_id).await.unwrap().unwrap();
    assert_eq!(intervention.context, HitlContext::AmountThreshold);
    assert_eq!(intervention.step_code.as_deref(), Some("FRAUD_CHECK"));

    let progress = h
        .engine
        .resolve_intervention(intervention_id, HitlDecision::new(HitlAction::Approve, "treasury.head"))
        .await
        .unwrap();
    assert!(matches!(progress, Progress::Suspended { .. }), "COMPLIANCE_CHECK is a checkpoint too");
    assert_eq!(h.calls_of("COMPLIANCE_CHECK"), 1);
}

#[tokio::test]
async fn test_escalation_happens_once_per_interval() {
    let h = Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({})),
    ));
    h.reconfigure(|definition| definition.hitl_config["pause_workflow_timeout"] = json!(true))
        .await;
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    h.clock.advance(chrono::Duration::minutes(10));
    assert_eq!(h.engine.sweep().await.unwrap().escalated, 0);

    h.clock.advance(chrono::Duration::minutes(21));
    assert_eq!(h.engine.sweep().await.unwrap().escalated, 1);
    assert_eq!(h.engine.sweep().await.unwrap().escalated, 0);

    h.clock.advance(chrono::Duration::minutes(29));
    assert_eq!(h.engine.sweep().await.unwrap().escalated, 0);
    h.clock.advance(chrono::Duration::minutes(2));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.escalated, 1);
    assert_eq!(report.workflow_timeouts, 0);

    let intervention = h.store.get_hitl_intervention(intervention_id).await.unwrap().unwrap();
    assert!(intervention.is_escalated);
    assert_eq!(intervention.escalation_level, 2);
    assert_eq!(intervention.queue_name, "SUPERVISOR");
    assert!(intervention.is_open());

    let trail = h.store.list_hitl_audit(intervention_id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert!(trail.iter().all(|a| a.actor == SYSTEM_ACTOR && a.action == HitlAction::Escalate));

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Suspicious);
}

#[tokio::test]
async fn test_workflow_timeout_closes_parked_interventions() {
    let h = Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({})),
    ));
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    h.clock.advance(chrono::Duration::minutes(31));
    assert_eq!(h.engine.sweep().await.unwrap().escalated, 1);

    h.clock.advance(chrono::Duration::minutes(29));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.workflow_timeouts, 1);

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
    assert_eq!(stored.failure_code.as_deref(), Some("WORKFLOW_TIMEOUT"));

    let intervention = h.store.get_hitl_intervention(intervention_id).await.unwrap().unwrap();
    assert!(!intervention.is_open());
    assert_eq!(intervention.action_taken, Some(HitlAction::Reject));
    assert_eq!(intervention.resolved_by.as_deref(), Some(SYSTEM_ACTOR));
    assert!(h.engine.open_interventions(None, None).await.unwrap().is_empty());

    let trail = h.store.list_hitl_audit(intervention_id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[1].action, HitlAction::Reject);
    assert_eq!(trail[1].actor, SYSTEM_ACTOR);

    // a late decision finds nothing to resolve
    let err = h
        .engine
        .resolve_intervention(intervention_id, HitlDecision::new(HitlAction::Approve, "analyst.kim"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InterventionClosed(_)));
}

#[tokio::test]
async fn test_paused_workflow_timeout_excludes_time_in_review() {
    let h = Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({})),
    ));
    h.reconfigure(|definition| definition.hitl_config["pause_workflow_timeout"] = json!(true))
        .await;
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };

    h.clock.advance(chrono::Duration::minutes(90));
    assert_eq!(h.engine.sweep().await.unwrap().workflow_timeouts, 0);

    let progress = h
        .engine
        .resolve_intervention(intervention_id, HitlDecision::new(HitlAction::Approve, "analyst.kim"))
        .await
        .unwrap();
    assert!(matches!(progress, Progress::AwaitingCallback { .. }));

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(
        stored.workflow_started_at,
        Some(common::start_time() + chrono::Duration::minutes(90))
    );
}

#[tokio::test]
async fn test_assigned_interventions_are_not_escalated() {
    let h = Harness::scripted(Script::default().then(
        StepType::FraudCheck,
        StepResult::suspicious("HIGH_RISK", json!({})),
    ));
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::Suspended { intervention_id } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected a suspension");
    };
    h.engine.assign_intervention(intervention_id, "analyst.kim").await.unwrap();

    h.clock.advance(chrono::Duration::minutes(50));
    assert_eq!(h.engine.sweep().await.unwrap().escalated, 0);

    let mine = h.engine.open_interventions(None, Some("analyst.kim")).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(h.engine.open_interventions(None, Some("someone.else")).await.unwrap().is_empty());
}

// ============================================================================
// Async outcomes and timeouts
// ============================================================================

#[tokio::test]
async fn test_duplicate_and_stale_outcomes_are_discarded() {
    let h = Harness::new();
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::AwaitingCallback { fence, .. } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected to wait for the acknowledgment");
    };

    let stale = h
        .engine
        .deliver_outcome(tx.id, fence + 100, StepResult::success(json!({})))
        .await
        .unwrap();
    assert_eq!(stale, Delivery::Discarded);

    let first = h
        .engine
        .deliver_outcome(tx.id, fence, StepResult::success(json!({"acknowledgment": "ACCP"})))
        .await
        .unwrap();
    assert!(matches!(first, Delivery::Applied(_)));
    let logged = h.store.list_process_logs(tx.id).await.unwrap().len();

    let duplicate = h
        .engine
        .deliver_outcome(tx.id, fence, StepResult::success(json!({"acknowledgment": "ACCP"})))
        .await
        .unwrap();
    assert_eq!(duplicate, Delivery::Discarded);
    assert_eq!(h.store.list_process_logs(tx.id).await.unwrap().len(), logged);
    assert_eq!(h.calls_of("ACKNOWLEDGE"), 1);
}

#[tokio::test]
async fn test_overdue_acknowledgment_times_out_into_review() {
    let h = Harness::new();
    let tx = h.submit(dec!(25000.00)).await;
    let Progress::AwaitingCallback { fence, .. } = h.engine.advance(tx.id).await.unwrap() else {
        panic!("expected to wait for the acknowledgment");
    };

    h.clock.advance(chrono::Duration::minutes(1));
    assert_eq!(h.engine.sweep().await.unwrap().step_timeouts, 0);
    h.clock.advance(chrono::Duration::minutes(2));
    assert_eq!(h.engine.sweep().await.unwrap().step_timeouts, 1);

    let journey = h.engine.journey(tx.id).await.unwrap();
    assert_eq!(journey.transaction.status, TransactionStatus::PendingReview);
    assert_eq!(journey.interventions.len(), 1);
    assert_eq!(journey.interventions[0].context, HitlContext::Timeout);
    assert!(
        journey
            .process_logs
            .iter()
            .any(|l| l.entry.event_type == ProcessEventType::StepTimedOut)
    );

    // the late acknowledgment lost the race
    let late = h
        .engine
        .deliver_outcome(tx.id, fence, StepResult::success(json!({})))
        .await
        .unwrap();
    assert_eq!(late, Delivery::Discarded);
}

#[tokio::test]
async fn test_workflow_timeout_fails_active_transactions() {
    let h = Harness::new();
    let tx = h.submit(dec!(25000.00)).await;
    h.engine.advance(tx.id).await.unwrap();

    h.clock.advance(chrono::Duration::minutes(61));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.workflow_timeouts, 1);

    let stored = h.store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
    assert_eq!(stored.failure_code.as_deref(), Some("WORKFLOW_TIMEOUT"));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_advances_execute_each_step_once() {
    let h = Harness::new();
    let tx = h.submit(dec!(25000.00)).await;

    let advances = (0..8).map(|_| {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.advance(tx.id).await })
    });
    let outcomes = futures::future::join_all(advances).await;

    let fences: Vec<u64> = outcomes
        .into_iter()
        .map(|joined| match joined.unwrap().unwrap() {
            Progress::AwaitingCallback { fence, .. } => fence,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert!(fences.windows(2).all(|w| w[0] == w[1]));
    for code in ["FRAUD_CHECK", "COMPLIANCE_CHECK", "TRANSFORM", "SUBMIT", "ACKNOWLEDGE"] {
        assert_eq!(h.calls_of(code), 1, "{code} ran more than once");
    }

    let logs = h.store.list_process_logs(tx.id).await.unwrap();
    assert!(logs.windows(2).all(|w| w[1].event_sequence == w[0].event_sequence + 1));
}

#[tokio::test]
async fn test_worker_pool_advances_many_transactions() {
    let h = Harness::new();
    let mut pool = WorkerPool::new(h.engine.clone(), 4);
    let mut ids = Vec::new();
    for _ in 0..10 {
        let tx = h.submit(dec!(750.00)).await;
        ids.push(tx.id);
        pool.submit(tx.id).await.unwrap();
    }

    let outcomes = pool.drain().await;
    assert_eq!(outcomes.len(), 10);
    assert_eq!(pool.in_flight(), 0);
    for (id, outcome) in outcomes {
        assert!(ids.contains(&id));
        assert!(matches!(outcome.unwrap(), Progress::AwaitingCallback { .. }));
    }
    assert_eq!(h.calls_of("SUBMIT"), 10);
}
