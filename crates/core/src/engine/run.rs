//! The drive loop and its building blocks.
//!
//! Every function here runs with the transaction lock held and keeps the
//! in-memory transaction at the stored version.

use std::sync::Arc;

use railflow_shared::AppError;
use railflow_shared::types::{InterventionId, ProcessLogId, StepId};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::error::{ConfigurationError, EngineError, EngineResult};
use super::orchestrator::{Orchestrator, Progress};
use super::snapshot::RunSnapshot;
use crate::audit::types::{
    ErrorCategory, ErrorSeverity, NewProcessLog, PaymentErrorLog, PaymentProcessLog, ProcessEventType,
};
use crate::executor::handler::{FailureKind, StepContext, StepFailure, StepResult};
use crate::executor::mapping::{merge_output, project_input, record_output};
use crate::hitl::manager::{EscalationManager, RaiseRequest};
use crate::hitl::types::HitlContext;
use crate::retry::backoff::BackoffSchedule;
use crate::retry::controller::{RetryController, RetryDecision};
use crate::transaction::types::{AwaitingStep, PaymentTransaction, TransactionStatus};
use crate::workflow::policy::HitlConfig;
use crate::workflow::resolver::TransitionResolver;
use crate::workflow::types::{ExecutionStatus, OnErrorAction, StepType, WorkflowStep};

/// Error code of a run abandoned by the workflow-level timeout.
pub const WORKFLOW_TIMEOUT_CODE: &str = "WORKFLOW_TIMEOUT";
/// Error code of a human rejection.
pub const HITL_REJECTED_CODE: &str = "HITL_REJECTED";

/// Whether the drive loop keeps going.
pub(super) enum Flow {
    Continue,
    Halt(Progress),
}

/// Everything recorded when a run fails.
#[derive(Debug, Clone)]
pub(super) struct FailureCause {
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub step_id: Option<StepId>,
    pub process_log_id: Option<ProcessLogId>,
}

impl FailureCause {
    pub fn from_error(error: &EngineError, step_id: Option<StepId>) -> Self {
        Self {
            code: error.error_code(),
            message: error.to_string(),
            category: error.category(),
            severity: error.severity(),
            step_id,
            process_log_id: None,
        }
    }

    fn from_step(
        step: &WorkflowStep,
        failure: &StepFailure,
        category: ErrorCategory,
        severity: ErrorSeverity,
        process_log_id: ProcessLogId,
    ) -> Self {
        Self {
            code: failure.code.clone(),
            message: failure.message.clone(),
            category,
            severity,
            step_id: Some(step.id),
            process_log_id: Some(process_log_id),
        }
    }

    pub fn workflow_timeout(tx: &PaymentTransaction) -> Self {
        Self {
            code: WORKFLOW_TIMEOUT_CODE.to_string(),
            message: format!("Workflow for {} exceeded its time limit", tx.transaction_ref),
            category: ErrorCategory::WorkflowTimeout,
            severity: ErrorSeverity::Error,
            step_id: tx.current_step_id,
            process_log_id: None,
        }
    }

    pub fn rejected(actor: &str, step_id: Option<StepId>) -> Self {
        Self {
            code: HITL_REJECTED_CODE.to_string(),
            message: format!("Rejected by {actor}"),
            category: ErrorCategory::HumanEscalation,
            severity: ErrorSeverity::Warning,
            step_id,
            process_log_id: None,
        }
    }
}

fn concurrency(e: AppError) -> EngineError {
    match e {
        AppError::Conflict(message) => EngineError::Concurrency(message),
        other => EngineError::Store(other),
    }
}

/// First result label that must be reviewed by a human.
fn hitl_label(step: &WorkflowStep, result: &StepResult, hitl: &HitlConfig) -> Option<String> {
    result
        .labels()
        .find(|label| step.triggers_hitl(label) || (step.is_hitl_checkpoint && hitl.requires_approval_for(label)))
        .map(str::to_string)
}

impl Orchestrator {
    /// Runs the workflow until it completes, fails or has to wait.
    pub(super) async fn drive(&self, tx: &mut PaymentTransaction, snapshot: &RunSnapshot) -> EngineResult<Progress> {
        loop {
            let now = self.clock.now();
            if snapshot.workflow_deadline(tx).is_some_and(|deadline| now >= deadline) {
                warn!(transaction_id = %tx.id, "Workflow timed out");
                let cause = FailureCause::workflow_timeout(tx);
                return self.fail(tx, cause).await;
            }
            if let (Some(retry_at), Some(step_id)) = (tx.retry_at, tx.current_step_id)
                && now < retry_at
            {
                return Ok(Progress::RetryScheduled {
                    step_id,
                    attempt: tx.retry_count,
                    retry_at,
                });
            }
            tx.retry_at = None;

            let flow = match tx.current_step_id {
                None => self.start(tx, snapshot).await?,
                Some(step_id) => match tx.current_step_status {
                    Some(status) if !status.needs_execution() => self.follow(tx, snapshot, step_id, status).await?,
                    _ => self.attempt_step(tx, snapshot, step_id).await?,
                },
            };
            if let Flow::Halt(progress) = flow {
                return Ok(progress);
            }
        }
    }

    /// Turns run-ending errors into a FAILED transaction.
    pub(super) async fn settle(
        &self,
        tx: &mut PaymentTransaction,
        outcome: EngineResult<Progress>,
    ) -> EngineResult<Progress> {
        match outcome {
            Err(e @ (EngineError::Configuration(_) | EngineError::BusinessRuleViolation { .. }))
                if !tx.status.is_terminal() =>
            {
                if matches!(e, EngineError::Configuration(_)) {
                    error!(transaction_id = %tx.id, error_code = %e.error_code(), error = %e, "Configuration defect");
                } else {
                    warn!(transaction_id = %tx.id, error_code = %e.error_code(), "Transaction rejected");
                }
                self.fail(tx, FailureCause::from_error(&e, tx.current_step_id)).await
            }
            other => other,
        }
    }

    async fn start(&self, tx: &mut PaymentTransaction, snapshot: &RunSnapshot) -> EngineResult<Flow> {
        let resolved = TransitionResolver::resolve(&snapshot.graph, None, ExecutionStatus::Pending, &snapshot.view(tx))?;
        let definition = snapshot.graph.definition();
        tx.workflow_started_at.get_or_insert(self.clock.now());
        self.log(
            NewProcessLog::new(tx.id, ProcessEventType::WorkflowStarted)
                .message(format!("{} v{}", definition.workflow_code, definition.version))
                .details(json!({
                    "workflow_id": definition.id,
                    "transition_id": resolved.transition_id,
                })),
        )
        .await?;
        info!(
            transaction_id = %tx.id,
            workflow_code = %definition.workflow_code,
            "Workflow started"
        );
        self.take_transition(tx, resolved.next, ExecutionStatus::Pending).await
    }

    async fn follow(
        &self,
        tx: &mut PaymentTransaction,
        snapshot: &RunSnapshot,
        step_id: StepId,
        status: ExecutionStatus,
    ) -> EngineResult<Flow> {
        let trigger = match status {
            ExecutionStatus::Skipped => ExecutionStatus::Success,
            other => other,
        };
        let resolved = {
            let view = snapshot.view(tx);
            let graph = &snapshot.graph;
            match TransitionResolver::try_resolve(graph, Some(step_id), trigger, &view) {
                Some(resolved) => resolved,
                // approval without dedicated edges continues like a success
                None if trigger == ExecutionStatus::HitlApproved => {
                    TransitionResolver::resolve(graph, Some(step_id), ExecutionStatus::Success, &view)?
                }
                None => TransitionResolver::resolve(graph, Some(step_id), trigger, &view)?,
            }
        };
        self.take_transition(tx, resolved.next, status).await
    }

    async fn take_transition(
        &self,
        tx: &mut PaymentTransaction,
        next: Option<StepId>,
        last: ExecutionStatus,
    ) -> EngineResult<Flow> {
        if let Some(step_id) = next {
            tx.current_step_id = Some(step_id);
            tx.current_step_status = Some(ExecutionStatus::Pending);
            tx.retry_count = 0;
            tx.retry_at = None;
            self.persist(tx).await?;
            return Ok(Flow::Continue);
        }

        let progress = match last {
            ExecutionStatus::Success
            | ExecutionStatus::Skipped
            | ExecutionStatus::HitlApproved
            | ExecutionStatus::Pending => {
                self.terminate(tx, TransactionStatus::Completed, ProcessEventType::WorkflowCompleted, "Workflow completed")
                    .await?;
                Progress::Completed
            }
            other => {
                let cause = FailureCause {
                    code: tx.failure_code.clone().unwrap_or_else(|| "WORKFLOW_FAILED".to_string()),
                    message: format!("Workflow ended on {other}"),
                    category: ErrorCategory::TransientExecution,
                    severity: ErrorSeverity::Error,
                    step_id: tx.current_step_id,
                    process_log_id: None,
                };
                self.fail(tx, cause).await?
            }
        };
        Ok(Flow::Halt(progress))
    }

    async fn attempt_step(&self, tx: &mut PaymentTransaction, snapshot: &RunSnapshot, step_id: StepId) -> EngineResult<Flow> {
        let graph = Arc::clone(&snapshot.graph);
        let node = graph.node(step_id).ok_or(ConfigurationError::StepNotInWorkflow(step_id))?;
        let step = &node.step;

        if let Some(condition) = node.condition.as_ref().filter(|_| step.skip_on_condition)
            && condition.evaluate(&snapshot.view(tx))
        {
            self.log(
                NewProcessLog::new(tx.id, ProcessEventType::StepSkipped)
                    .step(step.id, &step.step_code)
                    .execution(ExecutionStatus::Skipped)
                    .message(format!("Condition `{}` holds", condition.source())),
            )
            .await?;
            tx.current_step_status = Some(ExecutionStatus::Skipped);
            self.persist(tx).await?;
            return Ok(Flow::Continue);
        }

        if step.step_type == StepType::HitlCheckpoint {
            let context = if graph.hitl_config().exceeds_threshold(tx.instructed.amount) {
                HitlContext::AmountThreshold
            } else {
                HitlContext::Success
            };
            let label = context.as_str().to_string();
            return self
                .suspend(tx, snapshot, step, context, label, ExecutionStatus::Success)
                .await
                .map(|intervention_id| Flow::Halt(Progress::Suspended { intervention_id }));
        }

        let started = self
            .log(
                NewProcessLog::new(tx.id, ProcessEventType::StepStarted)
                    .step(step.id, &step.step_code)
                    .execution(ExecutionStatus::InProgress)
                    .attempt(tx.retry_count),
            )
            .await?;
        tx.current_step_status = Some(ExecutionStatus::InProgress);
        self.persist(tx).await?;

        let ctx = {
            let view = snapshot.view(tx);
            StepContext {
                transaction_id: tx.id,
                event_id: started.event_id,
                idempotency_key: tx.idempotency_key(&step.step_code),
                step_id: step.id,
                step_code: step.step_code.clone(),
                step_type: step.step_type,
                attempt: tx.retry_count,
                input: project_input(&step.input_mapping, &view),
                config: step.step_config.clone(),
                transaction: tx.clone(),
                rail_code: Some(snapshot.rail.rail_code.clone()),
                product_code: snapshot.product.as_ref().map(|p| p.product_code.clone()),
            }
        };
        let timeout = snapshot.step_timeout(step);
        let mut result = RetryController::attempt(&self.registry, &ctx, timeout).await;

        if result.status == ExecutionStatus::Pending {
            if step.is_async {
                let now = self.clock.now();
                let deadline = chrono::Duration::from_std(timeout)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
                let fence = started.event_sequence;
                tx.awaiting = Some(AwaitingStep { step_id, fence, deadline });
                self.log(
                    NewProcessLog::new(tx.id, ProcessEventType::StepAwaiting)
                        .step(step.id, &step.step_code)
                        .execution(ExecutionStatus::InProgress)
                        .attempt(tx.retry_count)
                        .details(json!({ "fence": fence, "deadline": deadline })),
                )
                .await?;
                self.persist(tx).await?;
                info!(
                    transaction_id = %tx.id,
                    step_code = %step.step_code,
                    event_sequence = fence,
                    "Awaiting step outcome"
                );
                return Ok(Flow::Halt(Progress::AwaitingCallback { step_id, fence }));
            }
            result = StepResult::error(
                "UNEXPECTED_PENDING",
                format!("Synchronous step {} answered PENDING", step.step_code),
            );
        }

        self.conclude(tx, snapshot, step_id, result).await
    }

    /// Records a step outcome and decides what follows it.
    pub(super) async fn conclude(
        &self,
        tx: &mut PaymentTransaction,
        snapshot: &RunSnapshot,
        step_id: StepId,
        result: StepResult,
    ) -> EngineResult<Flow> {
        let graph = Arc::clone(&snapshot.graph);
        let step = graph.step(step_id).ok_or(ConfigurationError::StepNotInWorkflow(step_id))?;

        let completed = self
            .log(
                NewProcessLog::new(tx.id, ProcessEventType::StepCompleted)
                    .step(step.id, &step.step_code)
                    .execution(result.status)
                    .attempt(tx.retry_count)
                    .duration_ms(result.duration_ms)
                    .details(json!({
                        "output": record_output(&step.output_mapping, &result.output),
                        "signal": result.signal,
                        "failure": result.failure,
                    })),
            )
            .await?;
        for warning in &result.warnings {
            let cause = FailureCause {
                code: warning.code.clone(),
                message: warning.message.clone(),
                category: ErrorCategory::BusinessRuleViolation,
                severity: ErrorSeverity::Warning,
                step_id: Some(step.id),
                process_log_id: Some(completed.id),
            };
            self.record_error(tx, &cause, None).await?;
        }
        if result.status == ExecutionStatus::Suspicious {
            tx.is_suspicious = true;
        }

        if let Some(failure) = &result.failure {
            match failure.kind {
                FailureKind::Violation => {
                    let cause = FailureCause::from_step(
                        step,
                        failure,
                        ErrorCategory::BusinessRuleViolation,
                        ErrorSeverity::Error,
                        completed.id,
                    );
                    return self.fail(tx, cause).await.map(Flow::Halt);
                }
                FailureKind::Misconfiguration => {
                    error!(
                        transaction_id = %tx.id,
                        step_code = %step.step_code,
                        error_code = %failure.code,
                        "Step is misconfigured"
                    );
                    let cause = FailureCause::from_step(
                        step,
                        failure,
                        ErrorCategory::Configuration,
                        ErrorSeverity::Fatal,
                        completed.id,
                    );
                    return self.fail(tx, cause).await.map(Flow::Halt);
                }
                FailureKind::Transient => {}
            }
        }

        if let Some(label) = hitl_label(step, &result, graph.hitl_config()) {
            let context = HitlContext::for_outcome(&label, result.status);
            let intervention_id = self.suspend(tx, snapshot, step, context, label, result.status).await?;
            return Ok(Flow::Halt(Progress::Suspended { intervention_id }));
        }

        if result.status.is_failure() {
            let schedule = BackoffSchedule::for_step(step, graph.retry_policy());
            match RetryController::decide(result.status, tx.retry_count, &schedule) {
                RetryDecision::RetryAfter { attempt, delay } => {
                    let now = self.clock.now();
                    let retry_at = chrono::Duration::from_std(delay)
                        .ok()
                        .and_then(|d| now.checked_add_signed(d))
                        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
                    self.log(
                        NewProcessLog::new(tx.id, ProcessEventType::StepRetrying)
                            .step(step.id, &step.step_code)
                            .execution(ExecutionStatus::Retrying)
                            .attempt(attempt)
                            .details(json!({
                                "delay_secs": delay.as_secs(),
                                "retry_at": retry_at,
                                "failure": result.failure,
                            })),
                    )
                    .await?;
                    tx.retry_count = attempt;
                    tx.current_step_status = Some(ExecutionStatus::Retrying);
                    // the lock is released while the backoff runs
                    tx.retry_at = (retry_at > now).then_some(retry_at);
                    self.persist(tx).await?;
                    warn!(
                        transaction_id = %tx.id,
                        step_code = %step.step_code,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "Retry scheduled"
                    );
                    if tx.retry_at.is_none() {
                        return Ok(Flow::Continue);
                    }
                    return Ok(Flow::Halt(Progress::RetryScheduled {
                        step_id: step.id,
                        attempt,
                        retry_at,
                    }));
                }
                RetryDecision::Exhausted => return self.exhausted(tx, snapshot, step, &result, completed.id).await,
                RetryDecision::Complete => {}
            }
        }

        tx.current_step_status = Some(result.status);
        if result.status == ExecutionStatus::Success {
            merge_output(&mut tx.context, &step.step_code, &result.output);
            match step.step_type {
                StepType::Transformation => tx.transformed_message = Some(result.output.clone()),
                StepType::Submission | StepType::Acknowledgment => tx.response_message = Some(result.output.clone()),
                _ => {}
            }
            if let Some(target) = step.step_type.status_on_success()
                && tx.status.is_forward_of(target)
            {
                self.change_status(tx, target, format!("{} succeeded", step.step_code)).await?;
            }
            if step.is_hitl_checkpoint && graph.hitl_config().exceeds_threshold(tx.instructed.amount) {
                let context = HitlContext::AmountThreshold;
                let label = context.as_str().to_string();
                let intervention_id = self.suspend(tx, snapshot, step, context, label, result.status).await?;
                return Ok(Flow::Halt(Progress::Suspended { intervention_id }));
            }
        }
        self.persist(tx).await?;
        Ok(Flow::Continue)
    }

    /// Applies `onErrorAction` once the retry budget is spent.
    async fn exhausted(
        &self,
        tx: &mut PaymentTransaction,
        snapshot: &RunSnapshot,
        step: &WorkflowStep,
        result: &StepResult,
        process_log_id: ProcessLogId,
    ) -> EngineResult<Flow> {
        let failure = result.failure.clone().unwrap_or_else(|| StepFailure {
            code: "STEP_FAILED".to_string(),
            message: format!("Step {} ended {}", step.step_code, result.status),
            kind: FailureKind::Transient,
        });
        warn!(
            transaction_id = %tx.id,
            step_code = %step.step_code,
            on_error = %step.on_error_action,
            error_code = %failure.code,
            "Retries exhausted"
        );
        let cause = FailureCause::from_step(
            step,
            &failure,
            ErrorCategory::TransientExecution,
            ErrorSeverity::Error,
            process_log_id,
        );

        match step.on_error_action {
            OnErrorAction::Fail | OnErrorAction::Retry => self.fail(tx, cause).await.map(Flow::Halt),
            OnErrorAction::Hitl => {
                let label = result.status.as_str().to_string();
                let context = HitlContext::for_outcome(&label, result.status);
                let intervention_id = self.suspend(tx, snapshot, step, context, label, result.status).await?;
                self.record_error(tx, &cause, Some(intervention_id)).await?;
                Ok(Flow::Halt(Progress::Suspended { intervention_id }))
            }
            OnErrorAction::Skip => {
                self.log(
                    NewProcessLog::new(tx.id, ProcessEventType::StepSkipped)
                        .step(step.id, &step.step_code)
                        .execution(ExecutionStatus::Skipped)
                        .attempt(tx.retry_count)
                        .message("Retries exhausted"),
                )
                .await?;
                let cause = FailureCause {
                    severity: ErrorSeverity::Warning,
                    ..cause
                };
                self.record_error(tx, &cause, None).await?;
                tx.current_step_status = Some(ExecutionStatus::Skipped);
                self.persist(tx).await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Parks the transaction on a new intervention.
    async fn suspend(
        &self,
        tx: &mut PaymentTransaction,
        snapshot: &RunSnapshot,
        step: &WorkflowStep,
        context: HitlContext,
        label: String,
        step_status: ExecutionStatus,
    ) -> EngineResult<InterventionId> {
        let request = RaiseRequest {
            step,
            context,
            label,
            step_status,
            queue: snapshot.hitl_queue(step),
        };
        let intervention = EscalationManager::raise(tx, request, snapshot.graph.hitl_config(), self.clock.now());
        self.ports.store.upsert_hitl_intervention(&intervention).await?;

        tx.current_step_status = Some(ExecutionStatus::WaitingHitl);
        tx.requires_hitl = true;
        if context.is_suspicious() {
            tx.is_suspicious = true;
        }
        self.log(
            NewProcessLog::new(tx.id, ProcessEventType::HitlRaised)
                .step(step.id, &step.step_code)
                .execution(ExecutionStatus::WaitingHitl)
                .attempt(tx.retry_count)
                .message(format!("{} on {}", intervention.trigger_reason, step.step_code))
                .details(json!({
                    "intervention_id": intervention.id,
                    "queue": intervention.queue_name,
                    "priority": intervention.priority,
                    "context": intervention.context,
                })),
        )
        .await?;
        self.persist(tx).await?;
        self.change_status(tx, context.waiting_status(), format!("Awaiting {context} review"))
            .await?;
        Ok(intervention.id)
    }

    /// Fails the transaction and records the cause in the error log.
    pub(super) async fn fail(&self, tx: &mut PaymentTransaction, cause: FailureCause) -> EngineResult<Progress> {
        tx.failure_code = Some(cause.code.clone());
        if cause.severity.requires_hitl() {
            tx.requires_hitl = true;
        }
        let entry = self
            .terminate(tx, TransactionStatus::Failed, ProcessEventType::WorkflowFailed, &cause.message)
            .await?;
        let cause = FailureCause {
            process_log_id: cause.process_log_id.or(Some(entry.id)),
            ..cause
        };
        self.record_error(tx, &cause, None).await?;
        warn!(
            transaction_id = %tx.id,
            error_code = %cause.code,
            category = %cause.category,
            "Transaction failed"
        );
        Ok(Progress::Failed { error_code: cause.code })
    }

    pub(super) async fn record_error(
        &self,
        tx: &PaymentTransaction,
        cause: &FailureCause,
        intervention_id: Option<InterventionId>,
    ) -> EngineResult<()> {
        let mut record = PaymentErrorLog::new(
            tx.id,
            &cause.code,
            &cause.message,
            cause.category,
            cause.severity,
            self.clock.now(),
        );
        if let Some(id) = cause.process_log_id {
            record = record.with_process_log(id);
        }
        if let Some(id) = cause.step_id {
            record = record.with_step(id);
        }
        if let Some(id) = intervention_id {
            record = record.with_intervention(id);
        }
        self.ports.store.append_error_log(record).await?;
        Ok(())
    }

    /// Moves the transaction to a terminal status.
    ///
    /// The closing log entry is written before the status swap, so nothing
    /// is ever appended after the transaction becomes terminal.
    pub(super) async fn terminate(
        &self,
        tx: &mut PaymentTransaction,
        to: TransactionStatus,
        event_type: ProcessEventType,
        message: &str,
    ) -> EngineResult<PaymentProcessLog> {
        let from = tx.status;
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidStatusTransition { from, to });
        }
        tx.completed_at = Some(self.clock.now());
        tx.awaiting = None;
        tx.retry_at = None;
        self.persist(tx).await?;

        let entry = self
            .log(
                NewProcessLog::new(tx.id, event_type)
                    .status_change(from, to)
                    .message(message),
            )
            .await?;
        tx.version = self
            .ports
            .store
            .compare_and_swap_status(tx.id, from, to)
            .await
            .map_err(concurrency)?;
        tx.previous_status = Some(from);
        tx.status = to;
        info!(
            transaction_id = %tx.id,
            from = %from,
            to = %to,
            event_sequence = entry.event_sequence,
            "Transaction finished"
        );
        Ok(entry)
    }

    /// Non-terminal status change.
    pub(super) async fn change_status(
        &self,
        tx: &mut PaymentTransaction,
        to: TransactionStatus,
        reason: String,
    ) -> EngineResult<()> {
        let from = tx.status;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidStatusTransition { from, to });
        }
        tx.version = self
            .ports
            .store
            .compare_and_swap_status(tx.id, from, to)
            .await
            .map_err(concurrency)?;
        tx.previous_status = Some(from);
        tx.status = to;
        let entry = self
            .log(
                NewProcessLog::new(tx.id, ProcessEventType::StatusChanged)
                    .status_change(from, to)
                    .message(reason),
            )
            .await?;
        info!(
            transaction_id = %tx.id,
            from = %from,
            to = %to,
            event_sequence = entry.event_sequence,
            "Status changed"
        );
        Ok(())
    }

    /// Saves every non-status field under the optimistic version check.
    pub(super) async fn persist(&self, tx: &mut PaymentTransaction) -> EngineResult<()> {
        tx.updated_at = self.clock.now();
        tx.version = self.ports.store.save_transaction(tx).await.map_err(concurrency)?;
        Ok(())
    }

    pub(super) async fn log(&self, entry: NewProcessLog) -> EngineResult<PaymentProcessLog> {
        let logged = self.ports.store.append_process_log(entry).await?;
        debug!(
            transaction_id = %logged.entry.transaction_id,
            event_type = %logged.entry.event_type,
            event_sequence = logged.event_sequence,
            "Process log appended"
        );
        Ok(logged)
    }
}
