//! Payment transaction domain types.
//!
//! This module defines the unit of work driven by the engine and the
//! status lifecycle it moves through.

use chrono::{DateTime, Utc};
use railflow_shared::types::{Money, ProductId, RailId, StepId, TransactionId, WorkflowId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::workflow::types::ExecutionStatus;

/// Transaction status in the payment lifecycle.
///
/// The main line is
/// INITIATED → VALIDATED → (PENDING_APPROVAL ↔ APPROVED/REJECTED) → PROCESSING
/// → SENT_TO_RAIL → ACKNOWLEDGED → SETTLED → COMPLETED, with side branches to
/// FAILED, CANCELLED, RETURNED, SUSPICIOUS, ON_HOLD and PENDING_REVIEW from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Received, no step executed yet.
    Initiated,
    /// Passed validation.
    Validated,
    /// Waiting for a human approval decision.
    PendingApproval,
    /// Approved by a human or an authorization step.
    Approved,
    /// Rejected by an approver.
    Rejected,
    /// Being transformed/screened for submission.
    Processing,
    /// Submitted to the payment rail.
    SentToRail,
    /// Rail acknowledged receipt.
    Acknowledged,
    /// Funds settled.
    Settled,
    /// Workflow finished successfully (terminal).
    Completed,
    /// Workflow aborted (terminal).
    Failed,
    /// Cancelled by an operator (terminal).
    Cancelled,
    /// Returned by the receiving side (terminal).
    Returned,
    /// Flagged as suspicious, parked for review.
    Suspicious,
    /// Held by an operator.
    OnHold,
    /// Parked for human review.
    PendingReview,
}

impl TransactionStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 16] = [
        Self::Initiated,
        Self::Validated,
        Self::PendingApproval,
        Self::Approved,
        Self::Rejected,
        Self::Processing,
        Self::SentToRail,
        Self::Acknowledged,
        Self::Settled,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Returned,
        Self::Suspicious,
        Self::OnHold,
        Self::PendingReview,
    ];

    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Validated => "VALIDATED",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Processing => "PROCESSING",
            Self::SentToRail => "SENT_TO_RAIL",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::Settled => "SETTLED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Returned => "RETURNED",
            Self::Suspicious => "SUSPICIOUS",
            Self::OnHold => "ON_HOLD",
            Self::PendingReview => "PENDING_REVIEW",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }

    /// Returns true if no further step execution may happen.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Returned
        )
    }

    /// Returns true if the transaction is parked waiting for a human.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::PendingApproval | Self::Suspicious | Self::OnHold | Self::PendingReview
        )
    }

    /// Position on the main line, `None` for side branches.
    fn main_line_rank(self) -> Option<u8> {
        match self {
            Self::Initiated => Some(0),
            Self::Validated => Some(1),
            Self::Approved => Some(2),
            Self::Processing => Some(3),
            Self::SentToRail => Some(4),
            Self::Acknowledged => Some(5),
            Self::Settled => Some(6),
            Self::Completed => Some(7),
            _ => None,
        }
    }

    /// Returns true if `self` → `to` is an allowed status change.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() || self == to {
            return false;
        }
        match to {
            Self::Failed | Self::Cancelled | Self::Returned | Self::Suspicious | Self::OnHold
            | Self::PendingReview => true,
            Self::PendingApproval => !matches!(self, Self::Rejected),
            Self::Rejected => self.is_waiting(),
            _ => match (self.main_line_rank(), to.main_line_rank()) {
                // resuming from a parked state may land anywhere on the main line
                _ if self.is_waiting() => to.main_line_rank().is_some(),
                (Some(from), Some(target)) => target > from,
                _ => false,
            },
        }
    }

    /// Returns true if `to` lies further down the main line than `self`.
    #[must_use]
    pub fn is_forward_of(self, to: Self) -> bool {
        matches!(
            (self.main_line_rank(), to.main_line_rank()),
            (Some(from), Some(target)) if target > from
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a payment relative to the institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentDirection {
    /// Funds received from another institution.
    Inbound,
    /// Funds sent to another institution.
    Outbound,
    /// Book transfer within the institution.
    Internal,
}

impl PaymentDirection {
    /// Returns the string representation of the direction.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for PaymentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A debtor or creditor of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Legal or display name.
    pub name: String,
    /// Account number at the agent.
    pub account: String,
    /// ABA routing number (or other clearing member id) of the agent.
    pub routing_number: Option<String>,
    /// ISO 3166 alpha-3 country code.
    pub country: Option<String>,
}

/// An asynchronous step waiting for an external callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitingStep {
    /// The step whose outcome is outstanding.
    pub step_id: StepId,
    /// Event sequence of the attempt's IN_PROGRESS entry. Only an outcome
    /// carrying this token is accepted.
    pub fence: u64,
    /// When the supervisory timer turns the wait into a TIMEOUT.
    pub deadline: DateTime<Utc>,
}

/// The unit of work driven through a workflow.
///
/// Mutated only by the orchestrator. `version` is bumped by the store on
/// every write and checked on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// Business reference supplied by the originator.
    pub transaction_ref: String,
    /// End-to-end identification carried across the rail.
    pub end_to_end_id: Option<String>,
    /// Instruction identification.
    pub instruction_id: Option<String>,
    /// Unique end-to-end transaction reference.
    pub uetr: Option<String>,
    /// Rail the payment is routed to.
    pub rail_id: Option<RailId>,
    /// Product on the rail.
    pub product_id: Option<ProductId>,
    /// Bound workflow definition version.
    pub workflow_id: Option<WorkflowId>,
    /// Payment direction.
    pub direction: PaymentDirection,
    /// Current status.
    pub status: TransactionStatus,
    /// Status immediately before `status`.
    pub previous_status: Option<TransactionStatus>,
    /// Step pointer; `None` before the start transition.
    pub current_step_id: Option<StepId>,
    /// Execution state of the current step.
    pub current_step_status: Option<ExecutionStatus>,
    /// Retries consumed by the current step.
    pub retry_count: u32,
    /// Earliest time the current step may be attempted again after a
    /// failed attempt.
    pub retry_at: Option<DateTime<Utc>>,
    /// Set when any step flagged the payment as suspicious.
    pub is_suspicious: bool,
    /// Set when a human intervention was raised.
    pub requires_hitl: bool,
    /// Instructed amount and currency.
    pub instructed: Money,
    /// Settlement amount when it differs from the instructed amount.
    pub settlement: Option<Money>,
    /// FX rate applied between instructed and settlement amounts.
    pub exchange_rate: Option<Decimal>,
    /// Charges applied to the payment.
    pub charges_amount: Decimal,
    /// ISO 20022 charge bearer code.
    pub charge_bearer: String,
    /// ISO 20022 purpose code.
    pub purpose_code: Option<String>,
    /// Unstructured remittance information.
    pub remittance_info: Option<String>,
    /// Paying party.
    pub debtor: Party,
    /// Receiving party.
    pub creditor: Party,
    /// Message as received.
    pub original_message: serde_json::Value,
    /// Message after the transformation step.
    pub transformed_message: Option<serde_json::Value>,
    /// Latest rail response.
    pub response_message: Option<serde_json::Value>,
    /// Accumulated step outputs (the `result` document).
    pub context: serde_json::Value,
    /// Outstanding asynchronous step, if any.
    pub awaiting: Option<AwaitingStep>,
    /// Code of the error that terminated the transaction.
    pub failure_code: Option<String>,
    /// When the start transition was taken.
    pub workflow_started_at: Option<DateTime<Utc>>,
    /// When a terminal status was reached.
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form metadata, visible to rules as `metadata.<key>`.
    pub metadata: serde_json::Value,
    /// Optimistic concurrency version.
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Creates a new INITIATED outbound transaction.
    #[must_use]
    pub fn new(transaction_ref: impl Into<String>, instructed: Money, debtor: Party, creditor: Party) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            transaction_ref: transaction_ref.into(),
            end_to_end_id: None,
            instruction_id: None,
            uetr: None,
            rail_id: None,
            product_id: None,
            workflow_id: None,
            direction: PaymentDirection::Outbound,
            status: TransactionStatus::Initiated,
            previous_status: None,
            current_step_id: None,
            current_step_status: None,
            retry_count: 0,
            retry_at: None,
            is_suspicious: false,
            requires_hitl: false,
            instructed,
            settlement: None,
            exchange_rate: None,
            charges_amount: Decimal::ZERO,
            charge_bearer: "SLEV".to_string(),
            purpose_code: None,
            remittance_info: None,
            debtor,
            creditor,
            original_message: serde_json::Value::Null,
            transformed_message: None,
            response_message: None,
            context: serde_json::Value::Object(serde_json::Map::new()),
            awaiting: None,
            failure_code: None,
            workflow_started_at: None,
            completed_at: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the end-to-end identification.
    #[must_use]
    pub fn with_end_to_end_id(mut self, end_to_end_id: impl Into<String>) -> Self {
        self.end_to_end_id = Some(end_to_end_id.into());
        self
    }

    /// Binds the transaction to a rail, product and workflow.
    #[must_use]
    pub fn on_workflow(mut self, rail_id: RailId, product_id: Option<ProductId>, workflow_id: WorkflowId) -> Self {
        self.rail_id = Some(rail_id);
        self.product_id = product_id;
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Idempotency key handed to step handlers.
    ///
    /// Stable across retries and timeout races of the same step.
    #[must_use]
    pub fn idempotency_key(&self, step_code: &str) -> String {
        let reference = self.end_to_end_id.as_deref().unwrap_or(&self.transaction_ref);
        format!("{reference}:{step_code}")
    }
}

/// Field changes applied by a MODIFY resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPatch {
    /// New instructed amount (currency unchanged).
    pub instructed_amount: Option<Decimal>,
    /// Replacement creditor.
    pub creditor: Option<Party>,
    /// Replacement debtor.
    pub debtor: Option<Party>,
    /// Replacement remittance information.
    pub remittance_info: Option<String>,
    /// Replacement purpose code.
    pub purpose_code: Option<String>,
}

impl TransactionPatch {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructed_amount.is_none()
            && self.creditor.is_none()
            && self.debtor.is_none()
            && self.remittance_info.is_none()
            && self.purpose_code.is_none()
    }

    /// Applies the patch to a transaction.
    pub fn apply(&self, tx: &mut PaymentTransaction) {
        if let Some(amount) = self.instructed_amount {
            tx.instructed.amount = amount;
        }
        if let Some(creditor) = &self.creditor {
            tx.creditor = creditor.clone();
        }
        if let Some(debtor) = &self.debtor {
            tx.debtor = debtor.clone();
        }
        if let Some(info) = &self.remittance_info {
            tx.remittance_info = Some(info.clone());
        }
        if let Some(code) = &self.purpose_code {
            tx.purpose_code = Some(code.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railflow_shared::types::Currency;
    use rust_decimal_macros::dec;

    fn sample() -> PaymentTransaction {
        PaymentTransaction::new(
            "REF-1",
            Money::new(dec!(25000.00), Currency::Usd),
            Party::default(),
            Party::default(),
        )
    }

    #[test]
    fn test_status_round_trip() {
        for status in TransactionStatus::ALL {
            assert_eq!(TransactionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            TransactionStatus::parse("sent_to_rail"),
            Some(TransactionStatus::SentToRail)
        );
        assert_eq!(TransactionStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = TransactionStatus::ALL
            .into_iter()
            .filter(TransactionStatus::is_terminal)
            .collect();
        assert_eq!(
            terminal,
            vec![
                TransactionStatus::Completed,
                TransactionStatus::Failed,
                TransactionStatus::Cancelled,
                TransactionStatus::Returned
            ]
        );
    }

    #[test]
    fn test_main_line_moves_forward_only() {
        assert!(TransactionStatus::Initiated.can_transition_to(TransactionStatus::Validated));
        assert!(TransactionStatus::Validated.can_transition_to(TransactionStatus::SentToRail));
        assert!(!TransactionStatus::SentToRail.can_transition_to(TransactionStatus::Validated));
        assert!(!TransactionStatus::Processing.can_transition_to(TransactionStatus::Rejected));
    }

    #[test]
    fn test_side_branches_from_non_terminal() {
        assert!(TransactionStatus::Processing.can_transition_to(TransactionStatus::PendingReview));
        assert!(TransactionStatus::Initiated.can_transition_to(TransactionStatus::Failed));
        assert!(TransactionStatus::Acknowledged.can_transition_to(TransactionStatus::Returned));
    }

    #[test]
    fn test_waiting_states_resume_to_main_line() {
        assert!(TransactionStatus::PendingReview.can_transition_to(TransactionStatus::Validated));
        assert!(TransactionStatus::Suspicious.can_transition_to(TransactionStatus::Completed));
        assert!(TransactionStatus::PendingApproval.can_transition_to(TransactionStatus::Approved));
        assert!(TransactionStatus::PendingApproval.can_transition_to(TransactionStatus::Rejected));
    }

    #[test]
    fn test_terminal_rejects_everything() {
        for status in TransactionStatus::ALL {
            assert!(!TransactionStatus::Completed.can_transition_to(status));
            assert!(!TransactionStatus::Failed.can_transition_to(status));
        }
    }

    #[test]
    fn test_idempotency_key_prefers_end_to_end_id() {
        let tx = sample();
        assert_eq!(tx.idempotency_key("SUBMIT"), "REF-1:SUBMIT");
        let tx = tx.with_end_to_end_id("E2E-9");
        assert_eq!(tx.idempotency_key("SUBMIT"), "E2E-9:SUBMIT");
    }

    #[test]
    fn test_patch_apply() {
        let mut tx = sample();
        let patch = TransactionPatch {
            instructed_amount: Some(dec!(100.00)),
            remittance_info: Some("INV-7".to_string()),
            ..TransactionPatch::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut tx);
        assert_eq!(tx.instructed.amount, dec!(100.00));
        assert_eq!(tx.remittance_info.as_deref(), Some("INV-7"));
        assert!(TransactionPatch::default().is_empty());
    }
}
