//! HITL Escalation Manager.
//!
//! Builds interventions, decides auto-escalation and records every action in
//! the audit trail. Persistence and transaction status changes stay with the
//! orchestrator.

use chrono::{DateTime, Duration, Utc};
use railflow_shared::types::{AuditTrailId, InterventionId};
use rust_decimal::Decimal;
use tracing::info;

use super::types::{HitlAction, HitlAuditTrail, HitlContext, HitlDecision, HitlIntervention};
use crate::engine::error::{EngineError, EngineResult};
use crate::transaction::types::{PaymentTransaction, TransactionStatus};
use crate::workflow::policy::HitlConfig;
use crate::workflow::types::{ExecutionStatus, WorkflowStep};

/// Where and why a step is parked.
#[derive(Debug, Clone)]
pub struct RaiseRequest<'a> {
    /// Step that raised the intervention.
    pub step: &'a WorkflowStep,
    /// Classification.
    pub context: HitlContext,
    /// Triggering label.
    pub label: String,
    /// Step outcome that triggered it.
    pub step_status: ExecutionStatus,
    /// Target queue.
    pub queue: String,
}

/// Stateless escalation manager.
pub struct EscalationManager;

impl EscalationManager {
    /// Queue for a new intervention: the step's queue, then the workflow's,
    /// then `default_queue`.
    #[must_use]
    pub fn queue_for(step: &WorkflowStep, hitl: &HitlConfig, default_queue: &str) -> String {
        step.hitl_queue
            .clone()
            .or_else(|| hitl.queue.clone())
            .unwrap_or_else(|| default_queue.to_string())
    }

    /// Queue receiving escalated interventions.
    #[must_use]
    pub fn escalation_queue(hitl: &HitlConfig, supervisory_queue: &str) -> String {
        hitl.escalation_queue
            .clone()
            .unwrap_or_else(|| supervisory_queue.to_string())
    }

    /// Priority of a new intervention (1 = most urgent).
    ///
    /// Amounts at or above the workflow threshold move one level up.
    #[must_use]
    pub fn priority(context: HitlContext, amount: Decimal, hitl: &HitlConfig) -> u8 {
        let base = context.base_priority();
        let over_threshold = hitl.amount_threshold.is_some_and(|threshold| amount >= threshold);
        if over_threshold && context != HitlContext::AmountThreshold {
            base.saturating_sub(1).max(1)
        } else {
            base
        }
    }

    /// Builds an open intervention for a parked step.
    #[must_use]
    pub fn raise(
        tx: &PaymentTransaction,
        request: RaiseRequest<'_>,
        hitl: &HitlConfig,
        now: DateTime<Utc>,
    ) -> HitlIntervention {
        let priority = Self::priority(request.context, tx.instructed.amount, hitl);
        let due_at = hitl
            .auto_escalate_after_minutes
            .and_then(|m| i64::try_from(m).ok())
            .and_then(Duration::try_minutes)
            .and_then(|after| now.checked_add_signed(after));
        info!(
            transaction_id = %tx.id,
            step_code = %request.step.step_code,
            context = %request.context,
            queue = %request.queue,
            priority,
            "Raising HITL intervention"
        );
        HitlIntervention {
            id: InterventionId::new(),
            transaction_id: tx.id,
            step_id: Some(request.step.id),
            step_code: Some(request.step.step_code.clone()),
            queue_name: request.queue,
            priority,
            context: request.context,
            trigger_reason: request.label,
            step_status: request.step_status,
            parked_status: tx.status,
            assigned_to: None,
            assigned_at: None,
            due_at,
            is_escalated: false,
            escalation_level: 0,
            last_escalated_at: None,
            action_taken: None,
            action_notes: None,
            is_resolved: false,
            resolved_at: None,
            resolved_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the sweep should escalate the intervention now.
    ///
    /// Only open, unassigned interventions escalate, and at most once per
    /// `auto_escalate_after_minutes` measured from the last escalation.
    #[must_use]
    pub fn escalation_due(intervention: &HitlIntervention, hitl: &HitlConfig, now: DateTime<Utc>) -> bool {
        if !intervention.is_open() || intervention.assigned_to.is_some() {
            return false;
        }
        let Some(interval) = hitl
            .auto_escalate_after_minutes
            .and_then(|m| i64::try_from(m).ok())
            .and_then(Duration::try_minutes)
        else {
            return false;
        };
        let since = intervention.last_escalated_at.unwrap_or(intervention.created_at);
        since.checked_add_signed(interval).is_some_and(|due| now >= due)
    }

    /// Escalates an open intervention and returns its audit entry.
    ///
    /// # Errors
    ///
    /// `InterventionClosed` if already resolved.
    pub fn escalate(
        intervention: &mut HitlIntervention,
        queue: &str,
        actor: &str,
        notes: Option<String>,
        transaction_status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<HitlAuditTrail> {
        if !intervention.is_open() {
            return Err(EngineError::InterventionClosed(intervention.id));
        }
        let previous_state = intervention.state(transaction_status);
        intervention.priority = intervention.priority.saturating_sub(1).max(1);
        intervention.is_escalated = true;
        intervention.escalation_level += 1;
        intervention.last_escalated_at = Some(now);
        intervention.queue_name = queue.to_string();
        intervention.updated_at = now;
        info!(
            intervention_id = %intervention.id,
            transaction_id = %intervention.transaction_id,
            escalation_level = intervention.escalation_level,
            queue = %queue,
            "Escalated HITL intervention"
        );
        Ok(Self::audit(
            intervention,
            HitlAction::Escalate,
            actor,
            notes,
            previous_state,
            intervention.state(transaction_status),
            now,
        ))
    }

    /// Assigns an open intervention.
    ///
    /// # Errors
    ///
    /// `InterventionClosed` if already resolved; `InvalidDecision` for an
    /// empty assignee.
    pub fn assign(intervention: &mut HitlIntervention, assignee: &str, now: DateTime<Utc>) -> EngineResult<()> {
        if !intervention.is_open() {
            return Err(EngineError::InterventionClosed(intervention.id));
        }
        if assignee.trim().is_empty() {
            return Err(EngineError::InvalidDecision("assignee must not be empty".into()));
        }
        intervention.assigned_to = Some(assignee.to_string());
        intervention.assigned_at = Some(now);
        intervention.updated_at = now;
        Ok(())
    }

    /// Checks a decision before anything is changed.
    ///
    /// # Errors
    ///
    /// `InterventionClosed`, or `InvalidDecision` for an empty actor, an
    /// escalation routed here, or a `MODIFY` without changes.
    pub fn check_decision(intervention: &HitlIntervention, decision: &HitlDecision) -> EngineResult<()> {
        if !intervention.is_open() {
            return Err(EngineError::InterventionClosed(intervention.id));
        }
        if decision.actor.trim().is_empty() {
            return Err(EngineError::InvalidDecision("actor must not be empty".into()));
        }
        if decision.action == HitlAction::Modify && decision.patch.as_ref().is_none_or(|p| p.is_empty()) {
            return Err(EngineError::InvalidDecision("MODIFY requires field changes".into()));
        }
        Ok(())
    }

    /// Closes an intervention with a decision and returns its audit entry.
    ///
    /// # Errors
    ///
    /// See [`check_decision`](Self::check_decision); `ESCALATE` is rejected
    /// because it does not close the intervention.
    pub fn resolve(
        intervention: &mut HitlIntervention,
        decision: &HitlDecision,
        before: TransactionStatus,
        after: TransactionStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<HitlAuditTrail> {
        Self::check_decision(intervention, decision)?;
        if !decision.action.resolves() {
            return Err(EngineError::InvalidDecision(format!("{} does not resolve", decision.action)));
        }
        let previous_state = intervention.state(before);
        intervention.is_resolved = true;
        intervention.action_taken = Some(decision.action);
        intervention.action_notes.clone_from(&decision.notes);
        intervention.resolved_at = Some(now);
        intervention.resolved_by = Some(decision.actor.clone());
        intervention.updated_at = now;
        info!(
            intervention_id = %intervention.id,
            transaction_id = %intervention.transaction_id,
            action = %decision.action,
            actor = %decision.actor,
            "Resolved HITL intervention"
        );
        Ok(Self::audit(
            intervention,
            decision.action,
            &decision.actor,
            decision.notes.clone(),
            previous_state,
            intervention.state(after),
            now,
        ))
    }

    fn audit(
        intervention: &HitlIntervention,
        action: HitlAction,
        actor: &str,
        notes: Option<String>,
        previous_state: serde_json::Value,
        new_state: serde_json::Value,
        now: DateTime<Utc>,
    ) -> HitlAuditTrail {
        HitlAuditTrail {
            id: AuditTrailId::new(),
            intervention_id: intervention.id,
            transaction_id: intervention.transaction_id,
            action,
            actor: actor.to_string(),
            previous_state,
            new_state,
            notes,
            created_at: now,
        }
    }
}
