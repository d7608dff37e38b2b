//! Step handler capability.
//!
//! Each step type is served by one handler. Handlers are external
//! collaborators (rule engine, fraud scorer, sanctions screener, message
//! transformer, rail gateway, notifier) and must be idempotent on
//! [`StepContext::idempotency_key`]: the same step may be invoked again
//! after a retry or a timeout race.

use async_trait::async_trait;
use railflow_shared::error::AppError;
use railflow_shared::types::{EventId, StepId, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::engine::error::ConfigurationError;
use crate::transaction::types::PaymentTransaction;
use crate::transaction::view::TransactionView;
use crate::workflow::types::{ExecutionStatus, StepType};

/// Everything a handler receives for one attempt.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Transaction being processed.
    pub transaction_id: TransactionId,
    /// Unique id of this attempt.
    pub event_id: EventId,
    /// Stable across attempts of the same step.
    pub idempotency_key: String,
    /// Step being executed.
    pub step_id: StepId,
    /// Step code.
    pub step_code: String,
    /// Step type.
    pub step_type: StepType,
    /// Zero-based attempt number.
    pub attempt: u32,
    /// Projected `inputMapping`.
    pub input: Value,
    /// The step's `stepConfig`.
    pub config: Value,
    /// Read-only snapshot of the transaction.
    pub transaction: PaymentTransaction,
    /// Code of the bound rail.
    pub rail_code: Option<String>,
    /// Code of the bound product.
    pub product_code: Option<String>,
}

impl StepContext {
    /// Field view over the transaction snapshot.
    #[must_use]
    pub fn view(&self) -> TransactionView<'_> {
        TransactionView::new(&self.transaction)
            .with_codes(self.rail_code.as_deref(), self.product_code.as_deref())
    }
}

/// How a failed attempt is to be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Retried per step policy.
    Transient,
    /// Blocking business rule; terminates the transaction.
    Violation,
    /// The step's own configuration is broken.
    Misconfiguration,
}

/// Failure detail attached to a non-successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Stable code.
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Treatment.
    pub kind: FailureKind,
}

/// Non-fatal finding reported alongside an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWarning {
    /// Stable code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

/// Outcome of one step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Outcome, used as the transition trigger.
    pub status: ExecutionStatus,
    /// Finer outcome label (e.g. `HIGH_RISK`, `MATCH_FOUND`, `NEGATIVE_ACK`).
    pub signal: Option<String>,
    /// Handler output merged into the run's `result` document on success.
    pub output: Value,
    /// Failure detail.
    pub failure: Option<StepFailure>,
    /// Handler wall time.
    pub duration_ms: u64,
    /// Recorded in the error log with WARNING severity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<StepWarning>,
}

impl StepResult {
    fn with_status(status: ExecutionStatus) -> Self {
        Self {
            status,
            signal: None,
            output: Value::Null,
            failure: None,
            duration_ms: 0,
            warnings: Vec::new(),
        }
    }

    /// Successful attempt with output.
    #[must_use]
    pub fn success(output: Value) -> Self {
        Self {
            output,
            ..Self::with_status(ExecutionStatus::Success)
        }
    }

    /// Business failure reported by the handler (retryable).
    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failed(ExecutionStatus::Failure, code, message, FailureKind::Transient)
    }

    /// Handler or infrastructure error (retryable).
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failed(ExecutionStatus::Error, code, message, FailureKind::Transient)
    }

    /// The attempt ran out of time.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::failed(ExecutionStatus::Timeout, "STEP_TIMEOUT", message, FailureKind::Transient)
    }

    /// A blocking business rule rejected the payment.
    #[must_use]
    pub fn violation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failed(ExecutionStatus::Failure, code, message, FailureKind::Violation)
    }

    /// The step could not run because its configuration is broken.
    #[must_use]
    pub fn misconfigured(defect: &ConfigurationError) -> Self {
        Self::failed(
            ExecutionStatus::Error,
            defect.error_code(),
            defect.to_string(),
            FailureKind::Misconfiguration,
        )
    }

    /// The payment looks suspicious.
    #[must_use]
    pub fn suspicious(signal: impl Into<String>, output: Value) -> Self {
        Self {
            signal: Some(signal.into()),
            output,
            ..Self::with_status(ExecutionStatus::Suspicious)
        }
    }

    /// An async step accepted the request; the outcome arrives by callback.
    #[must_use]
    pub fn pending() -> Self {
        Self::with_status(ExecutionStatus::Pending)
    }

    fn failed(status: ExecutionStatus, code: impl Into<String>, message: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            failure: Some(StepFailure {
                code: code.into(),
                message: message.into(),
                kind,
            }),
            ..Self::with_status(status)
        }
    }

    /// Attaches an outcome label.
    #[must_use]
    pub fn with_signal(mut self, signal: impl Into<String>) -> Self {
        self.signal = Some(signal.into());
        self
    }

    /// Attaches output.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    /// Adds a non-fatal finding.
    #[must_use]
    pub fn with_warning(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.warnings.push(StepWarning {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    /// Labels this result can match against HITL triggers.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.status.as_str()).chain(self.signal.as_deref())
    }

    /// Returns the failure kind, if the result carries one.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

/// Errors a handler may raise instead of returning a verdict.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Temporary failure of the handler or its upstream.
    #[error("Transient handler failure: {0}")]
    Transient(String),

    /// The handler's collaborator rejected the request outright.
    #[error("Rejected {code}: {message}")]
    Rejected {
        /// Stable code.
        code: String,
        /// Detail.
        message: String,
    },

    /// Store failure while the handler was running.
    #[error(transparent)]
    Store(#[from] AppError),
}

impl HandlerError {
    /// Converts the error into an `ERROR` step result.
    #[must_use]
    pub fn into_result(self) -> StepResult {
        match self {
            Self::Transient(message) => StepResult::error("HANDLER_ERROR", message),
            Self::Rejected { code, message } => StepResult::error(code, message),
            Self::Store(e) => StepResult::error(e.error_code(), e.to_string()),
        }
    }
}

/// One handler per step type.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step type served.
    fn step_type(&self) -> StepType;

    /// Executes one attempt.
    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, HandlerError>;
}
