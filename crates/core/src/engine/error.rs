//! Engine error types.
//!
//! Every error maps to one [`ErrorCategory`] of the engine's taxonomy and
//! carries a stable code recorded in the error log.

use railflow_shared::error::AppError;
use railflow_shared::types::{InterventionId, StepId, TransactionId, TransitionId, WorkflowId};
use thiserror::Error;

use crate::audit::types::{ErrorCategory, ErrorSeverity};
use crate::transaction::types::{PaymentDirection, TransactionStatus};
use crate::workflow::types::{ExecutionStatus, StepType};

/// Defects in stored configuration. Always fatal, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A policy document failed its schema.
    #[error("Invalid {document}: {reason}")]
    InvalidPolicy {
        /// `retryPolicy`, `timeoutConfig` or `hitlConfig`.
        document: &'static str,
        /// Parser or range-check message.
        reason: String,
    },

    /// The workflow is marked inactive.
    #[error("Workflow {0} is inactive")]
    WorkflowInactive(WorkflowId),

    /// A transition references a step outside the workflow.
    #[error("Transition {transition} references unknown step {step}")]
    UnknownStep {
        /// Offending edge.
        transition: TransitionId,
        /// Missing step.
        step: StepId,
    },

    /// The workflow has no active PENDING edge from the start.
    #[error("Workflow {0} has no start transition")]
    MissingStartTransition(WorkflowId),

    /// Two unconditional edges share source, trigger and priority.
    #[error("Ambiguous transitions from {from:?} on {trigger} at priority {priority}")]
    AmbiguousTransition {
        /// Source step (`None` for start).
        from: Option<StepId>,
        /// Shared trigger.
        trigger: ExecutionStatus,
        /// Shared priority.
        priority: u32,
    },

    /// A condition expression failed to parse.
    #[error("Invalid condition {expression:?}: {reason}")]
    InvalidCondition {
        /// Source text.
        expression: String,
        /// Parser message.
        reason: String,
    },

    /// No active edge matched the outcome.
    #[error("No transition from {from:?} on {trigger} in workflow {workflow_id}")]
    NoMatchingTransition {
        /// Workflow being run.
        workflow_id: WorkflowId,
        /// Source step (`None` for start).
        from: Option<StepId>,
        /// Outcome used as trigger.
        trigger: ExecutionStatus,
    },

    /// The transaction points at a step the workflow does not contain.
    #[error("Step {0} is not part of the workflow")]
    StepNotInWorkflow(StepId),

    /// No handler is registered for a step type.
    #[error("No handler registered for step type {0}")]
    MissingHandler(StepType),

    /// A rule expression uses an operator the evaluator does not know.
    #[error("Rule {rule_code} uses unknown operator {operator:?}")]
    UnknownOperator {
        /// Offending rule.
        rule_code: String,
        /// Operator as stored.
        operator: String,
    },

    /// A rule expression is structurally invalid.
    #[error("Rule {rule_code} is malformed: {reason}")]
    MalformedRule {
        /// Offending rule.
        rule_code: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No default workflow exists for a routed transaction.
    #[error("No default workflow for {rail_code} {direction}")]
    NoDefaultWorkflow {
        /// Rail the transaction was routed to.
        rail_code: String,
        /// Payment direction.
        direction: PaymentDirection,
    },

    /// More than one default workflow exists for the same scope.
    #[error("Multiple default workflows for {rail_code} {direction}")]
    DuplicateDefaultWorkflow {
        /// Rail code.
        rail_code: String,
        /// Payment direction.
        direction: PaymentDirection,
    },

    /// No routing rule selects a rail for the transaction.
    #[error("No routing rule matches transaction {0}")]
    NoRoutingRule(String),

    /// The transaction was never bound to a rail and workflow.
    #[error("Transaction {0} is not bound to a workflow")]
    UnboundTransaction(TransactionId),
}

impl ConfigurationError {
    /// Returns the stable error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPolicy { .. } => "INVALID_WORKFLOW_POLICY",
            Self::WorkflowInactive(_) => "WORKFLOW_INACTIVE",
            Self::UnknownStep { .. } | Self::StepNotInWorkflow(_) => "UNKNOWN_WORKFLOW_STEP",
            Self::MissingStartTransition(_) => "MISSING_START_TRANSITION",
            Self::AmbiguousTransition { .. } => "AMBIGUOUS_TRANSITION",
            Self::InvalidCondition { .. } => "INVALID_CONDITION",
            Self::NoMatchingTransition { .. } => "NO_MATCHING_TRANSITION",
            Self::MissingHandler(_) => "MISSING_STEP_HANDLER",
            Self::UnknownOperator { .. } => "UNKNOWN_RULE_OPERATOR",
            Self::MalformedRule { .. } => "MALFORMED_RULE",
            Self::NoDefaultWorkflow { .. } => "NO_DEFAULT_WORKFLOW",
            Self::DuplicateDefaultWorkflow { .. } => "DUPLICATE_DEFAULT_WORKFLOW",
            Self::NoRoutingRule(_) => "NO_ROUTING_RULE",
            Self::UnboundTransaction(_) => "TRANSACTION_NOT_BOUND",
        }
    }
}

/// Errors raised by the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration defect.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Handler failure or timeout that escaped the retry controller.
    #[error("Step {step_code} failed: {message}")]
    TransientExecution {
        /// Step that failed.
        step_code: String,
        /// Failure detail.
        message: String,
    },

    /// A blocking rule rejected the transaction.
    #[error("Business rule violation {code}: {message}")]
    BusinessRuleViolation {
        /// Rule error code (e.g. `AMOUNT_EXCEEDS_LIMIT`).
        code: String,
        /// Rule error message.
        message: String,
    },

    /// Attempted to advance a transaction in a terminal status.
    #[error("Transaction {transaction_id} is {status} and cannot advance")]
    TerminalStateViolation {
        /// Offending transaction.
        transaction_id: TransactionId,
        /// Its terminal status.
        status: TransactionStatus,
    },

    /// Status change not allowed by the state machine.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: TransactionStatus,
        /// Attempted status.
        to: TransactionStatus,
    },

    /// Optimistic version or compare-and-swap conflict.
    #[error("Concurrent modification: {0}")]
    Concurrency(String),

    /// Transaction not found.
    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),

    /// Workflow not found.
    #[error("Workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    /// Intervention not found.
    #[error("Intervention {0} not found")]
    InterventionNotFound(InterventionId),

    /// Intervention already resolved.
    #[error("Intervention {0} is already closed")]
    InterventionClosed(InterventionId),

    /// The transaction is not parked for a human decision.
    #[error("Transaction {transaction_id} is not waiting for a decision (status {status})")]
    NotWaiting {
        /// Transaction.
        transaction_id: TransactionId,
        /// Its current status.
        status: TransactionStatus,
    },

    /// A HITL decision is incomplete or inconsistent.
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    /// Durable store failure.
    #[error(transparent)]
    Store(#[from] AppError),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Taxonomy category recorded in the error log.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::TransientExecution { .. } => ErrorCategory::TransientExecution,
            Self::BusinessRuleViolation { .. } => ErrorCategory::BusinessRuleViolation,
            Self::TerminalStateViolation { .. } | Self::InvalidStatusTransition { .. } => {
                ErrorCategory::TerminalStateViolation
            }
            Self::Concurrency(_) | Self::Store(AppError::Conflict(_)) => ErrorCategory::Concurrency,
            Self::TransactionNotFound(_)
            | Self::WorkflowNotFound(_)
            | Self::InterventionNotFound(_) => ErrorCategory::NotFound,
            Self::InterventionClosed(_) | Self::NotWaiting { .. } | Self::InvalidDecision(_) => {
                ErrorCategory::HumanEscalation
            }
            Self::Store(_) => ErrorCategory::Store,
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn error_code(&self) -> String {
        match self {
            Self::Configuration(e) => e.error_code().to_string(),
            Self::TransientExecution { .. } => "STEP_EXECUTION_FAILED".to_string(),
            Self::BusinessRuleViolation { code, .. } => code.clone(),
            Self::TerminalStateViolation { .. } => "TERMINAL_STATE_VIOLATION".to_string(),
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION".to_string(),
            Self::Concurrency(_) => "CONCURRENT_MODIFICATION".to_string(),
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND".to_string(),
            Self::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND".to_string(),
            Self::InterventionNotFound(_) => "INTERVENTION_NOT_FOUND".to_string(),
            Self::InterventionClosed(_) => "INTERVENTION_CLOSED".to_string(),
            Self::NotWaiting { .. } => "TRANSACTION_NOT_WAITING".to_string(),
            Self::InvalidDecision(_) => "INVALID_HITL_DECISION".to_string(),
            Self::Store(e) => e.error_code().to_string(),
        }
    }

    /// Severity recorded in the error log.
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::Fatal,
            ErrorCategory::TerminalStateViolation | ErrorCategory::Store => ErrorSeverity::Critical,
            ErrorCategory::Concurrency | ErrorCategory::HumanEscalation => ErrorSeverity::Warning,
            ErrorCategory::TransientExecution
            | ErrorCategory::BusinessRuleViolation
            | ErrorCategory::WorkflowTimeout
            | ErrorCategory::NotFound => ErrorSeverity::Error,
        }
    }

    /// Returns true if the caller may retry the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientExecution { .. } | Self::Concurrency(_) => true,
            Self::Store(e) => e.is_retryable() || matches!(e, AppError::Conflict(_)),
            _ => false,
        }
    }
}
