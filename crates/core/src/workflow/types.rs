//! Workflow definition types.
//!
//! A workflow definition is stored configuration: steps, transitions and
//! three JSON policy documents. These types mirror the stored rows; the
//! interpreter works on the validated [`WorkflowGraph`](super::graph::WorkflowGraph)
//! built from them.

use chrono::{DateTime, Utc};
use railflow_shared::types::{ProductId, RailId, StepId, TransitionId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::types::{PaymentDirection, TransactionStatus};

/// The fixed vocabulary of step types a workflow may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    /// Rule-based validation of the payment request.
    Validation,
    /// Message transformation (e.g. to ISO 20022).
    Transformation,
    /// Data enrichment from reference sources.
    Enrichment,
    /// Rail/product routing.
    Routing,
    /// Sanctions / AML screening.
    ComplianceCheck,
    /// Fraud scoring.
    FraudCheck,
    /// Authorization of the debit.
    Authorization,
    /// Submission to the rail.
    Submission,
    /// Processing of the rail acknowledgment.
    Acknowledgment,
    /// Settlement confirmation.
    Settlement,
    /// Party notification.
    Notification,
    /// Reconciliation against rail reports.
    Reconciliation,
    /// Pure human checkpoint with no handler.
    HitlCheckpoint,
}

impl StepType {
    /// Every step type, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::Validation,
        Self::Transformation,
        Self::Enrichment,
        Self::Routing,
        Self::ComplianceCheck,
        Self::FraudCheck,
        Self::Authorization,
        Self::Submission,
        Self::Acknowledgment,
        Self::Settlement,
        Self::Notification,
        Self::Reconciliation,
        Self::HitlCheckpoint,
    ];

    /// Returns the string representation of the step type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Transformation => "TRANSFORMATION",
            Self::Enrichment => "ENRICHMENT",
            Self::Routing => "ROUTING",
            Self::ComplianceCheck => "COMPLIANCE_CHECK",
            Self::FraudCheck => "FRAUD_CHECK",
            Self::Authorization => "AUTHORIZATION",
            Self::Submission => "SUBMISSION",
            Self::Acknowledgment => "ACKNOWLEDGMENT",
            Self::Settlement => "SETTLEMENT",
            Self::Notification => "NOTIFICATION",
            Self::Reconciliation => "RECONCILIATION",
            Self::HitlCheckpoint => "HITL_CHECKPOINT",
        }
    }

    /// Parses a step type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str().eq_ignore_ascii_case(s))
    }

    /// Transaction status implied by a successful step of this type.
    #[must_use]
    pub fn status_on_success(&self) -> Option<TransactionStatus> {
        match self {
            Self::Validation => Some(TransactionStatus::Validated),
            Self::Authorization => Some(TransactionStatus::Approved),
            Self::Transformation
            | Self::Enrichment
            | Self::Routing
            | Self::FraudCheck
            | Self::ComplianceCheck => Some(TransactionStatus::Processing),
            Self::Submission => Some(TransactionStatus::SentToRail),
            Self::Acknowledgment => Some(TransactionStatus::Acknowledged),
            Self::Settlement => Some(TransactionStatus::Settled),
            Self::Notification | Self::Reconciliation | Self::HitlCheckpoint => None,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happens once a step has exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnErrorAction {
    /// Abort the transaction.
    Fail,
    /// Retry; once exhausted this behaves like `Fail`.
    Retry,
    /// Escalate to a human.
    Hitl,
    /// Mark the step skipped and continue as on success.
    Skip,
}

impl OnErrorAction {
    /// Returns the string representation of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "FAIL",
            Self::Retry => "RETRY",
            Self::Hitl => "HITL",
            Self::Skip => "SKIP",
        }
    }

    /// Parses an action from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FAIL" => Some(Self::Fail),
            "RETRY" => Some(Self::Retry),
            "HITL" => Some(Self::Hitl),
            "SKIP" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for OnErrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution state of a step attempt, also used as the transition trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Not started. The start edge of a workflow uses this trigger.
    Pending,
    /// Handler invoked, outcome outstanding.
    InProgress,
    /// Step succeeded.
    Success,
    /// Handler reported a business failure.
    Failure,
    /// Handler or infrastructure error.
    Error,
    /// Handler flagged the payment as suspicious.
    Suspicious,
    /// Step skipped.
    Skipped,
    /// Step or acknowledgment timed out.
    Timeout,
    /// Waiting for a human decision.
    WaitingHitl,
    /// Human approved the step.
    HitlApproved,
    /// Human rejected the step.
    HitlRejected,
    /// Waiting for a retry.
    Retrying,
}

impl ExecutionStatus {
    /// Every execution status, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::Pending,
        Self::InProgress,
        Self::Success,
        Self::Failure,
        Self::Error,
        Self::Suspicious,
        Self::Skipped,
        Self::Timeout,
        Self::WaitingHitl,
        Self::HitlApproved,
        Self::HitlRejected,
        Self::Retrying,
    ];

    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Error => "ERROR",
            Self::Suspicious => "SUSPICIOUS",
            Self::Skipped => "SKIPPED",
            Self::Timeout => "TIMEOUT",
            Self::WaitingHitl => "WAITING_HITL",
            Self::HitlApproved => "HITL_APPROVED",
            Self::HitlRejected => "HITL_REJECTED",
            Self::Retrying => "RETRYING",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str().eq_ignore_ascii_case(s))
    }

    /// Outcomes that consume the retry budget.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::Error | Self::Timeout)
    }

    /// States in which the step still has to be (re)executed.
    #[must_use]
    pub fn needs_execution(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::Retrying)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, versioned workflow scoped to a (rail, product, direction) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier of this version.
    pub id: WorkflowId,
    /// Workflow code, shared across versions.
    pub workflow_code: String,
    /// Display name.
    pub workflow_name: String,
    /// Version number.
    pub version: u32,
    /// Rail this workflow runs for.
    pub rail_id: RailId,
    /// Product, if the workflow is product specific.
    pub product_id: Option<ProductId>,
    /// Payment direction.
    pub direction: PaymentDirection,
    /// Default workflow for its (rail, product, direction).
    pub is_default: bool,
    /// Inactive workflows cannot be loaded.
    pub is_active: bool,
    /// Raw `retryPolicy` document.
    pub retry_policy: serde_json::Value,
    /// Raw `timeoutConfig` document.
    pub timeout_config: serde_json::Value,
    /// Raw `hitlConfig` document.
    pub hitl_config: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique identifier.
    pub id: StepId,
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// Informational ordering; traversal follows transitions.
    pub step_sequence: u32,
    /// Step code, unique within the workflow.
    pub step_code: String,
    /// Display name.
    pub step_name: String,
    /// Handler dispatch key.
    pub step_type: StepType,
    /// Mandatory steps may not be skipped by condition.
    pub is_mandatory: bool,
    /// Async steps may answer `PENDING` and complete by callback.
    pub is_async: bool,
    /// Checkpoint steps honour the workflow `require_approval_for` list.
    pub is_hitl_checkpoint: bool,
    /// Optional guard, see `skip_on_condition`.
    pub condition_expression: Option<String>,
    /// Skip the step when `condition_expression` holds.
    pub skip_on_condition: bool,
    /// Action once retries are exhausted.
    pub on_error_action: OnErrorAction,
    /// Retry budget.
    pub max_retries: u32,
    /// Base retry delay.
    pub retry_delay_seconds: u64,
    /// Handler-specific configuration (`timeout_seconds`/`timeout_minutes`
    /// override the workflow step timeout).
    pub step_config: serde_json::Value,
    /// Handler input: `{ name: "payload.x" | "result.y" }`.
    pub input_mapping: serde_json::Value,
    /// Recorded output: `{ name: "result.y" }`.
    pub output_mapping: serde_json::Value,
    /// Outcome labels that raise a human intervention.
    pub hitl_triggers: Vec<String>,
    /// Queue for interventions raised at this step.
    pub hitl_queue: Option<String>,
    /// Inactive steps cannot be entered.
    pub is_active: bool,
}

impl WorkflowStep {
    /// Returns true if `label` is one of this step's HITL triggers.
    #[must_use]
    pub fn triggers_hitl(&self, label: &str) -> bool {
        self.hitl_triggers.iter().any(|t| t.eq_ignore_ascii_case(label))
    }

    /// Step timeout override from `step_config`, in seconds.
    #[must_use]
    pub fn timeout_override_secs(&self) -> Option<u64> {
        let config = &self.step_config;
        config
            .get("timeout_seconds")
            .and_then(serde_json::Value::as_u64)
            .or_else(|| {
                config
                    .get("timeout_minutes")
                    .and_then(serde_json::Value::as_u64)
                    .map(|m| m.saturating_mul(60))
            })
    }
}

/// A directed edge between steps (`None` ends mean start/end).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStepTransition {
    /// Unique identifier.
    pub id: TransitionId,
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// Source step; `None` for the start edge.
    pub from_step_id: Option<StepId>,
    /// Target step; `None` ends the workflow.
    pub to_step_id: Option<StepId>,
    /// Outcome that selects this edge.
    pub trigger: ExecutionStatus,
    /// Tie-breaker, ascending.
    pub priority: u32,
    /// Optional guard over the execution context.
    pub condition_expression: Option<String>,
    /// Inactive edges are ignored.
    pub is_active: bool,
}
