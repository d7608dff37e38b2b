//! Process and error log records.
//!
//! Process logs are the append-only audit trail of a transaction: every
//! step start and outcome, retry, status change and HITL event. The store
//! assigns `event_sequence`, strictly increasing per transaction.

use chrono::{DateTime, Utc};
use railflow_shared::types::{
    ErrorLogId, EventId, InterventionId, ProcessLogId, StepId, TransactionId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::transaction::types::TransactionStatus;
use crate::workflow::types::ExecutionStatus;

/// Kind of process event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessEventType {
    /// Transaction accepted by the engine.
    TransactionReceived,
    /// Transaction routed to a rail/product.
    Routed,
    /// Start transition taken.
    WorkflowStarted,
    /// Step attempt started (IN_PROGRESS). Its sequence is the fencing token.
    StepStarted,
    /// Step attempt finished with an outcome.
    StepCompleted,
    /// Step skipped by condition, decision or `onErrorAction`.
    StepSkipped,
    /// Retry scheduled.
    StepRetrying,
    /// Async step is waiting for its callback.
    StepAwaiting,
    /// Step attempt timed out.
    StepTimedOut,
    /// Transaction status changed.
    StatusChanged,
    /// Human intervention raised.
    HitlRaised,
    /// Intervention assigned.
    HitlAssigned,
    /// Intervention escalated.
    HitlEscalated,
    /// Intervention resolved.
    HitlResolved,
    /// Workflow finished successfully.
    WorkflowCompleted,
    /// Workflow aborted.
    WorkflowFailed,
    /// Workflow cancelled.
    WorkflowCancelled,
}

impl ProcessEventType {
    /// Returns the string representation of the event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionReceived => "TRANSACTION_RECEIVED",
            Self::Routed => "ROUTED",
            Self::WorkflowStarted => "WORKFLOW_STARTED",
            Self::StepStarted => "STEP_STARTED",
            Self::StepCompleted => "STEP_COMPLETED",
            Self::StepSkipped => "STEP_SKIPPED",
            Self::StepRetrying => "STEP_RETRYING",
            Self::StepAwaiting => "STEP_AWAITING",
            Self::StepTimedOut => "STEP_TIMED_OUT",
            Self::StatusChanged => "STATUS_CHANGED",
            Self::HitlRaised => "HITL_RAISED",
            Self::HitlAssigned => "HITL_ASSIGNED",
            Self::HitlEscalated => "HITL_ESCALATED",
            Self::HitlResolved => "HITL_RESOLVED",
            Self::WorkflowCompleted => "WORKFLOW_COMPLETED",
            Self::WorkflowFailed => "WORKFLOW_FAILED",
            Self::WorkflowCancelled => "WORKFLOW_CANCELLED",
        }
    }

    /// Returns true for events that mark a step execution.
    #[must_use]
    pub fn is_step_execution(&self) -> bool {
        matches!(self, Self::StepStarted)
    }
}

impl fmt::Display for ProcessEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A process log entry before the store assigns its identity and sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProcessLog {
    /// Transaction.
    pub transaction_id: TransactionId,
    /// Event kind.
    pub event_type: ProcessEventType,
    /// Step involved.
    pub step_id: Option<StepId>,
    /// Step code involved.
    pub step_code: Option<String>,
    /// Step execution status.
    pub execution_status: Option<ExecutionStatus>,
    /// Transaction status before the event.
    pub status_before: Option<TransactionStatus>,
    /// Transaction status after the event.
    pub status_after: Option<TransactionStatus>,
    /// Attempt number for step events.
    pub attempt: u32,
    /// Short description.
    pub message: Option<String>,
    /// Structured detail (recorded outputs, rule outcomes, ...).
    pub details: Value,
    /// Handler wall time.
    pub duration_ms: Option<u64>,
}

impl NewProcessLog {
    /// Starts an entry for a transaction.
    #[must_use]
    pub fn new(transaction_id: TransactionId, event_type: ProcessEventType) -> Self {
        Self {
            transaction_id,
            event_type,
            step_id: None,
            step_code: None,
            execution_status: None,
            status_before: None,
            status_after: None,
            attempt: 0,
            message: None,
            details: Value::Null,
            duration_ms: None,
        }
    }

    /// Sets the step.
    #[must_use]
    pub fn step(mut self, step_id: StepId, step_code: impl Into<String>) -> Self {
        self.step_id = Some(step_id);
        self.step_code = Some(step_code.into());
        self
    }

    /// Sets the execution status.
    #[must_use]
    pub fn execution(mut self, status: ExecutionStatus) -> Self {
        self.execution_status = Some(status);
        self
    }

    /// Sets the status change.
    #[must_use]
    pub fn status_change(mut self, before: TransactionStatus, after: TransactionStatus) -> Self {
        self.status_before = Some(before);
        self.status_after = Some(after);
        self
    }

    /// Sets the attempt number.
    #[must_use]
    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the details.
    #[must_use]
    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// An immutable, sequenced process log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessLog {
    /// Unique identifier.
    pub id: ProcessLogId,
    /// Event identifier handed to handlers for idempotency.
    pub event_id: EventId,
    /// Strictly increasing per transaction, starting at 1.
    pub event_sequence: u64,
    /// Entry content.
    #[serde(flatten)]
    pub entry: NewProcessLog,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Informational.
    Info,
    /// Recovered or expected condition.
    Warning,
    /// Failed operation.
    Error,
    /// Invariant breach or store failure.
    Critical,
    /// Configuration defect.
    Fatal,
}

impl ErrorSeverity {
    /// Returns the string representation of the severity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Fatal => "FATAL",
        }
    }

    /// CRITICAL and FATAL errors always need a human.
    #[must_use]
    pub fn requires_hitl(&self) -> bool {
        matches!(self, Self::Critical | Self::Fatal)
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Missing/ambiguous transition, unknown operator, bad policy.
    Configuration,
    /// Handler failure or step timeout.
    TransientExecution,
    /// Blocking validation or compliance failure.
    BusinessRuleViolation,
    /// Suspension for, or misuse of, a human decision.
    HumanEscalation,
    /// Attempt to advance a terminal transaction.
    TerminalStateViolation,
    /// Whole-workflow timeout.
    WorkflowTimeout,
    /// Version or status conflict.
    Concurrency,
    /// Referenced entity missing.
    NotFound,
    /// Durable store failure.
    Store,
}

impl ErrorCategory {
    /// Returns the string representation of the category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::TransientExecution => "TRANSIENT_EXECUTION",
            Self::BusinessRuleViolation => "BUSINESS_RULE_VIOLATION",
            Self::HumanEscalation => "HUMAN_ESCALATION",
            Self::TerminalStateViolation => "TERMINAL_STATE_VIOLATION",
            Self::WorkflowTimeout => "WORKFLOW_TIMEOUT",
            Self::Concurrency => "CONCURRENCY",
            Self::NotFound => "NOT_FOUND",
            Self::Store => "STORE",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error recorded against a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentErrorLog {
    /// Unique identifier.
    pub id: ErrorLogId,
    /// Transaction.
    pub transaction_id: TransactionId,
    /// Process log entry the error belongs to.
    pub process_log_id: Option<ProcessLogId>,
    /// Intervention raised for the error.
    pub intervention_id: Option<InterventionId>,
    /// Step involved.
    pub step_id: Option<StepId>,
    /// Stable code.
    pub error_code: String,
    /// Detail.
    pub error_message: String,
    /// Taxonomy category.
    pub category: ErrorCategory,
    /// Severity.
    pub severity: ErrorSeverity,
    /// Whether a human has to look at it.
    pub requires_hitl: bool,
    /// Record time.
    pub created_at: DateTime<Utc>,
}

impl PaymentErrorLog {
    /// Creates an error record; CRITICAL/FATAL severities require HITL.
    #[must_use]
    pub fn new(
        transaction_id: TransactionId,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        category: ErrorCategory,
        severity: ErrorSeverity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ErrorLogId::new(),
            transaction_id,
            process_log_id: None,
            intervention_id: None,
            step_id: None,
            error_code: error_code.into(),
            error_message: error_message.into(),
            category,
            severity,
            requires_hitl: severity.requires_hitl(),
            created_at,
        }
    }

    /// Links the error to a process log entry.
    #[must_use]
    pub fn with_process_log(mut self, id: ProcessLogId) -> Self {
        self.process_log_id = Some(id);
        self
    }

    /// Links the error to an intervention; linked errors require HITL.
    #[must_use]
    pub fn with_intervention(mut self, id: InterventionId) -> Self {
        self.intervention_id = Some(id);
        self.requires_hitl = true;
        self
    }

    /// Sets the step.
    #[must_use]
    pub fn with_step(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }
}
