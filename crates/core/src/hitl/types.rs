//! Human-in-the-loop work items and their audit trail.

use chrono::{DateTime, Utc};
use railflow_shared::types::{AuditTrailId, InterventionId, StepId, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::transaction::types::{TransactionPatch, TransactionStatus};
use crate::workflow::types::ExecutionStatus;

/// Actor recorded for engine-initiated HITL actions.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Why an intervention was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitlContext {
    /// Routine review of a successful step (explicit checkpoint).
    Success,
    /// Business failure.
    Failure,
    /// Generic suspicious flag.
    Suspicious,
    /// Handler or infrastructure error.
    Error,
    /// Step timed out.
    Timeout,
    /// Sanctions or compliance match.
    ComplianceReview,
    /// Amount at or above the workflow threshold.
    AmountThreshold,
    /// High fraud score.
    FraudAlert,
}

impl HitlContext {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Suspicious => "SUSPICIOUS",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ComplianceReview => "COMPLIANCE_REVIEW",
            Self::AmountThreshold => "AMOUNT_THRESHOLD",
            Self::FraudAlert => "FRAUD_ALERT",
        }
    }

    /// Classifies a triggering label, falling back on the step outcome.
    #[must_use]
    pub fn for_outcome(label: &str, status: ExecutionStatus) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "HIGH_RISK" | "FRAUD_ALERT" => Self::FraudAlert,
            "MATCH_FOUND" | "COMPLIANCE_REVIEW" => Self::ComplianceReview,
            "NEGATIVE_ACK" => Self::Failure,
            "AMOUNT_THRESHOLD" => Self::AmountThreshold,
            _ => match status {
                ExecutionStatus::Suspicious => Self::Suspicious,
                ExecutionStatus::Error => Self::Error,
                ExecutionStatus::Timeout => Self::Timeout,
                ExecutionStatus::Failure | ExecutionStatus::HitlRejected => Self::Failure,
                _ => Self::Success,
            },
        }
    }

    /// Queue priority before amount adjustments (1 = most urgent).
    #[must_use]
    pub fn base_priority(&self) -> u8 {
        match self {
            Self::ComplianceReview => 1,
            Self::FraudAlert => 2,
            Self::Suspicious | Self::AmountThreshold => 3,
            Self::Timeout | Self::Error | Self::Failure => 4,
            Self::Success => 5,
        }
    }

    /// Transaction status while the intervention is open.
    #[must_use]
    pub fn waiting_status(&self) -> TransactionStatus {
        match self {
            Self::Suspicious | Self::FraudAlert => TransactionStatus::Suspicious,
            Self::AmountThreshold => TransactionStatus::PendingApproval,
            _ => TransactionStatus::PendingReview,
        }
    }

    /// Returns true if the transaction should carry the suspicious flag.
    #[must_use]
    pub fn is_suspicious(&self) -> bool {
        matches!(self, Self::Suspicious | Self::FraudAlert | Self::ComplianceReview)
    }
}

impl fmt::Display for HitlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decision taken on an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitlAction {
    /// Resume with the step approved.
    Approve,
    /// Terminate as FAILED.
    Reject,
    /// Re-run the step with a fresh retry budget.
    Retry,
    /// Re-run the workflow from its start edge.
    Restart,
    /// Treat the step as skipped.
    Skip,
    /// Hand over to the supervisory queue; stays open.
    Escalate,
    /// Patch the transaction, then re-run the step.
    Modify,
    /// Terminate as CANCELLED.
    Cancel,
    /// Jump to COMPLETED.
    ForceComplete,
}

impl HitlAction {
    /// Every action.
    pub const ALL: [Self; 9] = [
        Self::Approve,
        Self::Reject,
        Self::Retry,
        Self::Restart,
        Self::Skip,
        Self::Escalate,
        Self::Modify,
        Self::Cancel,
        Self::ForceComplete,
    ];

    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::Retry => "RETRY",
            Self::Restart => "RESTART",
            Self::Skip => "SKIP",
            Self::Escalate => "ESCALATE",
            Self::Modify => "MODIFY",
            Self::Cancel => "CANCEL",
            Self::ForceComplete => "FORCE_COMPLETE",
        }
    }

    /// Parses an action.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str().eq_ignore_ascii_case(s))
    }

    /// Returns true if the action closes the intervention.
    #[must_use]
    pub fn resolves(&self) -> bool {
        !matches!(self, Self::Escalate)
    }

    /// Terminal status the action drives the transaction to, if any.
    #[must_use]
    pub fn terminal_status(&self) -> Option<TransactionStatus> {
        match self {
            Self::Reject => Some(TransactionStatus::Failed),
            Self::Cancel => Some(TransactionStatus::Cancelled),
            Self::ForceComplete => Some(TransactionStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for HitlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A human work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlIntervention {
    /// Unique identifier.
    pub id: InterventionId,
    /// Parked transaction.
    pub transaction_id: TransactionId,
    /// Step that raised it.
    pub step_id: Option<StepId>,
    /// Code of that step.
    pub step_code: Option<String>,
    /// Work queue.
    pub queue_name: String,
    /// 1 = most urgent.
    pub priority: u8,
    /// Classification.
    pub context: HitlContext,
    /// Label or reason that triggered it.
    pub trigger_reason: String,
    /// Step outcome that triggered it.
    pub step_status: ExecutionStatus,
    /// Transaction status before parking.
    pub parked_status: TransactionStatus,
    /// Assignee.
    pub assigned_to: Option<String>,
    /// When assigned.
    pub assigned_at: Option<DateTime<Utc>>,
    /// When auto-escalation kicks in.
    pub due_at: Option<DateTime<Utc>>,
    /// Escalated at least once.
    pub is_escalated: bool,
    /// Number of escalations.
    pub escalation_level: u32,
    /// Last escalation time.
    pub last_escalated_at: Option<DateTime<Utc>>,
    /// Resolving action.
    pub action_taken: Option<HitlAction>,
    /// Notes of the resolving actor.
    pub action_notes: Option<String>,
    /// Closed.
    pub is_resolved: bool,
    /// When closed.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who closed it.
    pub resolved_by: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl HitlIntervention {
    /// Returns true if still awaiting a decision.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.is_resolved
    }

    /// Audit snapshot of the mutable fields.
    #[must_use]
    pub fn state(&self, transaction_status: TransactionStatus) -> Value {
        serde_json::json!({
            "transaction_status": transaction_status,
            "queue_name": self.queue_name,
            "priority": self.priority,
            "assigned_to": self.assigned_to,
            "is_escalated": self.is_escalated,
            "escalation_level": self.escalation_level,
            "is_resolved": self.is_resolved,
            "action_taken": self.action_taken,
        })
    }
}

/// A decision submitted by an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlDecision {
    /// Action.
    pub action: HitlAction,
    /// Who decided.
    pub actor: String,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Field changes for `MODIFY`.
    pub patch: Option<TransactionPatch>,
}

impl HitlDecision {
    /// Decision without notes or patch.
    pub fn new(action: HitlAction, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            notes: None,
            patch: None,
        }
    }

    /// Attaches notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Attaches a patch.
    #[must_use]
    pub fn with_patch(mut self, patch: TransactionPatch) -> Self {
        self.patch = Some(patch);
        self
    }
}

/// Immutable record of one HITL action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlAuditTrail {
    /// Unique identifier.
    pub id: AuditTrailId,
    /// Intervention acted upon.
    pub intervention_id: InterventionId,
    /// Its transaction.
    pub transaction_id: TransactionId,
    /// Action.
    pub action: HitlAction,
    /// Actor (`SYSTEM` for sweeps).
    pub actor: String,
    /// State before.
    pub previous_state: Value,
    /// State after.
    pub new_state: Value,
    /// Notes.
    pub notes: Option<String>,
    /// When.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_compliance_outranks_suspicious() {
        let compliance = HitlContext::for_outcome("MATCH_FOUND", ExecutionStatus::Suspicious);
        let suspicious = HitlContext::for_outcome("SUSPICIOUS", ExecutionStatus::Suspicious);
        assert_eq!(compliance, HitlContext::ComplianceReview);
        assert_eq!(suspicious, HitlContext::Suspicious);
        assert!(compliance.base_priority() < suspicious.base_priority());
    }

    #[rstest]
    #[case("HIGH_RISK", ExecutionStatus::Suspicious, HitlContext::FraudAlert)]
    #[case("fraud_alert", ExecutionStatus::Success, HitlContext::FraudAlert)]
    #[case("COMPLIANCE_REVIEW", ExecutionStatus::Success, HitlContext::ComplianceReview)]
    #[case("NEGATIVE_ACK", ExecutionStatus::Failure, HitlContext::Failure)]
    #[case("AMOUNT_THRESHOLD", ExecutionStatus::Success, HitlContext::AmountThreshold)]
    #[case("ERROR", ExecutionStatus::Error, HitlContext::Error)]
    #[case("TIMEOUT", ExecutionStatus::Timeout, HitlContext::Timeout)]
    #[case("SUCCESS", ExecutionStatus::Success, HitlContext::Success)]
    fn test_label_classification(#[case] label: &str, #[case] status: ExecutionStatus, #[case] expected: HitlContext) {
        assert_eq!(HitlContext::for_outcome(label, status), expected);
    }

    #[test]
    fn test_waiting_statuses() {
        assert_eq!(HitlContext::FraudAlert.waiting_status(), TransactionStatus::Suspicious);
        assert_eq!(HitlContext::AmountThreshold.waiting_status(), TransactionStatus::PendingApproval);
        assert_eq!(HitlContext::Error.waiting_status(), TransactionStatus::PendingReview);
        for context in [HitlContext::Suspicious, HitlContext::AmountThreshold, HitlContext::Timeout] {
            assert!(context.waiting_status().is_waiting());
        }
    }

    #[test]
    fn test_action_parse_and_effects() {
        assert_eq!(HitlAction::parse("force_complete"), Some(HitlAction::ForceComplete));
        assert_eq!(HitlAction::parse("LOOK"), None);
        assert!(!HitlAction::Escalate.resolves());
        assert_eq!(HitlAction::Reject.terminal_status(), Some(TransactionStatus::Failed));
        assert_eq!(HitlAction::Approve.terminal_status(), None);
    }
}
