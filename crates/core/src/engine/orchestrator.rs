//! Workflow Orchestrator.
//!
//! Drives payment transactions through their workflow graphs. Every entry
//! point serializes on the transaction lock; parked transactions (HITL,
//! awaiting a callback) hold no lock at all.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use railflow_shared::EngineConfig;
use railflow_shared::types::{InterventionId, StepId, TransactionId};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::error::{ConfigurationError, EngineError, EngineResult};
use super::locks::TransactionLocks;
use super::run::{FailureCause, Flow};
use super::snapshot::{RunSnapshot, workflow_deadline};
use crate::audit::types::{NewProcessLog, PaymentErrorLog, PaymentProcessLog, ProcessEventType};
use crate::clock::Clock;
use crate::executor::handler::StepResult;
use crate::executor::registry::StepRegistry;
use crate::executor::validation::RuleValidationHandler;
use crate::hitl::manager::EscalationManager;
use crate::hitl::types::{HitlAction, HitlAuditTrail, HitlDecision, HitlIntervention, SYSTEM_ACTOR};
use crate::ports::Collaborators;
use crate::rules::routing::RoutingEngine;
use crate::transaction::types::{PaymentTransaction, TransactionStatus};
use crate::transaction::view::TransactionView;
use crate::workflow::cache::GraphCache;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::types::{ExecutionStatus, StepType};

/// Error code when the bound rail is missing or inactive.
pub const RAIL_UNAVAILABLE_CODE: &str = "RAIL_UNAVAILABLE";
/// Error code when the rail does not settle the payment currency.
pub const CURRENCY_NOT_SUPPORTED_CODE: &str = "CURRENCY_NOT_SUPPORTED";

/// Where an advancement left the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Progress {
    /// Terminal COMPLETED.
    Completed,
    /// Terminal FAILED.
    Failed {
        /// Recorded error code.
        error_code: String,
    },
    /// Terminal CANCELLED.
    Cancelled,
    /// Parked on an open intervention.
    Suspended {
        /// The intervention to resolve.
        intervention_id: InterventionId,
    },
    /// Parked in a waiting status without an intervention (e.g. ON_HOLD).
    Held {
        /// Current status.
        status: TransactionStatus,
    },
    /// A failed attempt will be retried once `retry_at` has passed, by a
    /// later [`Orchestrator::advance`] or by the sweep.
    RetryScheduled {
        /// Step to retry.
        step_id: StepId,
        /// Retries consumed so far.
        attempt: u32,
        /// Earliest time of the next attempt.
        retry_at: DateTime<Utc>,
    },
    /// An async step is waiting for [`Orchestrator::deliver_outcome`].
    AwaitingCallback {
        /// Step in flight.
        step_id: StepId,
        /// Token the outcome must carry.
        fence: u64,
    },
}

impl Progress {
    /// Returns true for terminal outcomes.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Cancelled)
    }
}

/// Result of delivering an async step outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The outcome was applied and the run continued.
    Applied(Progress),
    /// Stale or duplicate token; nothing changed.
    Discarded,
}

/// Counters of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Interventions escalated.
    pub escalated: usize,
    /// Async steps timed out.
    pub step_timeouts: usize,
    /// Retries whose backoff had elapsed and were attempted.
    pub retries_resumed: usize,
    /// Transactions failed by the workflow timeout.
    pub workflow_timeouts: usize,
}

/// Full audit view of a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Journey {
    /// Current state.
    pub transaction: PaymentTransaction,
    /// Process log by sequence.
    pub process_logs: Vec<PaymentProcessLog>,
    /// Error log.
    pub error_logs: Vec<PaymentErrorLog>,
    /// Interventions, oldest first.
    pub interventions: Vec<HitlIntervention>,
    /// HITL audit entries of all interventions.
    pub audit_trail: Vec<HitlAuditTrail>,
}

enum Expiry {
    Step,
    Workflow,
    Retry,
}

/// Payment workflow engine.
pub struct Orchestrator {
    pub(super) config: Arc<EngineConfig>,
    pub(super) ports: Collaborators,
    pub(super) registry: StepRegistry,
    pub(super) graphs: GraphCache,
    pub(super) locks: TransactionLocks,
    pub(super) clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Creates an engine.
    ///
    /// A rule-backed VALIDATION handler is registered unless `registry`
    /// already serves that step type.
    pub fn new(config: EngineConfig, ports: Collaborators, mut registry: StepRegistry, clock: Arc<dyn Clock>) -> Self {
        if !registry.contains(StepType::Validation) {
            registry.register(Arc::new(RuleValidationHandler::new(
                Arc::clone(&ports.rules),
                Arc::clone(&ports.recent_values),
                Arc::clone(&clock),
            )));
        }
        let graphs = GraphCache::with_config(config.graph_cache_capacity, config.graph_cache_ttl_secs);
        Self {
            config: Arc::new(config),
            ports,
            registry,
            graphs,
            locks: TransactionLocks::new(),
            clock,
        }
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handler registry.
    #[must_use]
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Loaded workflow graphs.
    #[must_use]
    pub fn graphs(&self) -> &GraphCache {
        &self.graphs
    }

    /// Accepts a new transaction.
    ///
    /// Unrouted transactions are routed by the routing rules; unbound ones
    /// get the default workflow of their (rail, product, direction).
    ///
    /// # Errors
    ///
    /// Configuration errors when no route or default workflow exists; store
    /// errors from the insert.
    pub async fn submit(&self, mut tx: PaymentTransaction) -> EngineResult<PaymentTransaction> {
        if tx.status.is_terminal() {
            return Err(EngineError::TerminalStateViolation {
                transaction_id: tx.id,
                status: tx.status,
            });
        }
        let now = self.clock.now();

        let mut routed = None;
        if tx.rail_id.is_none() {
            let rules = self.ports.rules.list_routing_rules().await?;
            let mut available = HashMap::new();
            for rail_id in rules
                .iter()
                .flat_map(|rule| std::iter::once(rule.target_rail_id).chain(rule.fallback_rail_id))
            {
                if !available.contains_key(&rail_id) {
                    let accepts = self
                        .ports
                        .master_data
                        .get_rail(rail_id)
                        .await?
                        .is_some_and(|rail| rail.accepts(tx.instructed.currency));
                    available.insert(rail_id, accepts);
                }
            }
            let decision = RoutingEngine::route(&rules, &TransactionView::new(&tx), now, |id| {
                available.get(&id).copied().unwrap_or(false)
            })
            .ok_or_else(|| ConfigurationError::NoRoutingRule(tx.transaction_ref.clone()))?;
            tx.rail_id = Some(decision.rail_id);
            tx.product_id = decision.product_id;
            routed = Some(decision);
        }

        if tx.workflow_id.is_none() {
            let rail_id = tx.rail_id.ok_or(ConfigurationError::UnboundTransaction(tx.id))?;
            let Some(definition) = self
                .ports
                .workflows
                .find_default_workflow(rail_id, tx.product_id, tx.direction)
                .await?
            else {
                let rail_code = self
                    .ports
                    .master_data
                    .get_rail(rail_id)
                    .await?
                    .map_or_else(|| rail_id.to_string(), |rail| rail.rail_code);
                return Err(ConfigurationError::NoDefaultWorkflow {
                    rail_code,
                    direction: tx.direction,
                }
                .into());
            };
            if tx.product_id.is_none() {
                tx.product_id = definition.product_id;
            }
            tx.workflow_id = Some(definition.id);
        }

        tx.version = 0;
        tx.created_at = now;
        tx.updated_at = now;
        self.ports.store.insert_transaction(&tx).await?;
        self.log(
            NewProcessLog::new(tx.id, ProcessEventType::TransactionReceived)
                .message(tx.transaction_ref.clone())
                .details(json!({
                    "amount": tx.instructed.amount.to_string(),
                    "currency": tx.instructed.currency,
                    "direction": tx.direction,
                })),
        )
        .await?;
        if let Some(decision) = routed {
            self.log(
                NewProcessLog::new(tx.id, ProcessEventType::Routed).details(json!({
                    "rule_id": decision.rule_id,
                    "rail_id": decision.rail_id,
                    "product_id": decision.product_id,
                    "used_fallback": decision.used_fallback,
                })),
            )
            .await?;
        }
        info!(
            transaction_id = %tx.id,
            transaction_ref = %tx.transaction_ref,
            workflow_id = ?tx.workflow_id,
            "Transaction received"
        );
        Ok(tx)
    }

    /// Advances a transaction as far as it can go.
    ///
    /// # Errors
    ///
    /// `TerminalStateViolation` for a finished transaction; store and
    /// concurrency errors. Configuration defects and rail rejections fail
    /// the transaction and are reported as [`Progress::Failed`].
    pub async fn advance(&self, id: TransactionId) -> EngineResult<Progress> {
        let _guard = self.locks.acquire(id).await;
        let mut tx = self.load(id).await?;

        if tx.status.is_terminal() {
            let violation = EngineError::TerminalStateViolation {
                transaction_id: id,
                status: tx.status,
            };
            warn!(transaction_id = %id, status = %tx.status, "Refusing to advance a finished transaction");
            self.record_error(&tx, &FailureCause::from_error(&violation, tx.current_step_id), None)
                .await?;
            return Err(violation);
        }
        if tx.status.is_waiting() {
            return self.parked(&tx).await;
        }
        if let Some(awaiting) = &tx.awaiting {
            return Ok(Progress::AwaitingCallback {
                step_id: awaiting.step_id,
                fence: awaiting.fence,
            });
        }

        let outcome = match self.snapshot(&tx).await {
            Ok(snapshot) => self.drive(&mut tx, &snapshot).await,
            Err(e) => Err(e),
        };
        self.settle(&mut tx, outcome).await
    }

    /// Delivers the outcome of an async step.
    ///
    /// Only the outcome carrying the current fencing token is applied;
    /// stale, duplicate or late outcomes are discarded without side effects.
    ///
    /// # Errors
    ///
    /// Store and concurrency errors.
    pub async fn deliver_outcome(&self, id: TransactionId, fence: u64, result: StepResult) -> EngineResult<Delivery> {
        let _guard = self.locks.acquire(id).await;
        let mut tx = self.load(id).await?;

        let Some(awaiting) = tx.awaiting.clone().filter(|a| a.fence == fence) else {
            warn!(
                transaction_id = %id,
                fence,
                expected = ?tx.awaiting.as_ref().map(|a| a.fence),
                "Discarding stale step outcome"
            );
            return Ok(Delivery::Discarded);
        };
        if result.status == ExecutionStatus::Pending {
            debug!(transaction_id = %id, fence, "Ignoring interim PENDING outcome");
            return Ok(Delivery::Discarded);
        }
        tx.awaiting = None;

        let outcome = match self.snapshot(&tx).await {
            Ok(snapshot) => self.resume_after(&mut tx, &snapshot, awaiting.step_id, result).await,
            Err(e) => Err(e),
        };
        self.settle(&mut tx, outcome).await.map(Delivery::Applied)
    }

    /// Applies a human decision to an open intervention.
    ///
    /// Resuming actions continue the run immediately.
    ///
    /// # Errors
    ///
    /// `InterventionNotFound`, `InterventionClosed`, `InvalidDecision`,
    /// `NotWaiting`, `TerminalStateViolation`, store errors.
    pub async fn resolve_intervention(&self, id: InterventionId, decision: HitlDecision) -> EngineResult<Progress> {
        let transaction_id = self.intervention(id).await?.transaction_id;
        let _guard = self.locks.acquire(transaction_id).await;
        let mut intervention = self.intervention(id).await?;
        EscalationManager::check_decision(&intervention, &decision)?;

        let mut tx = self.load(transaction_id).await?;
        if tx.status.is_terminal() {
            return Err(EngineError::TerminalStateViolation {
                transaction_id,
                status: tx.status,
            });
        }
        if !tx.status.is_waiting() {
            return Err(EngineError::NotWaiting {
                transaction_id,
                status: tx.status,
            });
        }

        let before = tx.status;
        let now = self.clock.now();

        if decision.action == HitlAction::Escalate {
            let graph = self.graph_for(&tx).await?;
            let queue = EscalationManager::escalation_queue(graph.hitl_config(), &self.config.supervisory_queue);
            let audit =
                EscalationManager::escalate(&mut intervention, &queue, &decision.actor, decision.notes.clone(), before, now)?;
            self.record_escalation(&intervention, audit).await?;
            return Ok(Progress::Suspended { intervention_id: id });
        }

        let after = decision
            .action
            .terminal_status()
            .unwrap_or_else(|| Self::resume_status(&intervention, decision.action));
        let audit = EscalationManager::resolve(&mut intervention, &decision, before, after, now)?;
        self.ports.store.upsert_hitl_intervention(&intervention).await?;
        self.ports.store.append_hitl_audit(audit).await?;
        self.log(
            NewProcessLog::new(tx.id, ProcessEventType::HitlResolved)
                .message(format!("{} by {}", decision.action, decision.actor))
                .details(json!({
                    "intervention_id": id,
                    "action": decision.action,
                    "actor": decision.actor,
                    "notes": decision.notes,
                })),
        )
        .await?;

        let graph = self.graph_for(&tx).await?;
        if graph.hitl_config().pause_workflow_timeout
            && let Some(started) = tx.workflow_started_at
        {
            // time spent parked does not count against the workflow budget
            let parked_for = now.signed_duration_since(intervention.created_at);
            tx.workflow_started_at = started.checked_add_signed(parked_for).or(Some(started));
        }

        let reason = format!("{} by {}", decision.action, decision.actor);
        match decision.action {
            HitlAction::Reject => {
                tx.current_step_status = Some(ExecutionStatus::HitlRejected);
                return self
                    .fail(&mut tx, FailureCause::rejected(&decision.actor, intervention.step_id))
                    .await;
            }
            HitlAction::Cancel => {
                self.terminate(&mut tx, TransactionStatus::Cancelled, ProcessEventType::WorkflowCancelled, &reason)
                    .await?;
                return Ok(Progress::Cancelled);
            }
            HitlAction::ForceComplete => {
                self.terminate(&mut tx, TransactionStatus::Completed, ProcessEventType::WorkflowCompleted, &reason)
                    .await?;
                return Ok(Progress::Completed);
            }
            HitlAction::Escalate => return Ok(Progress::Suspended { intervention_id: id }),
            HitlAction::Approve => tx.current_step_status = Some(ExecutionStatus::HitlApproved),
            HitlAction::Skip => tx.current_step_status = Some(ExecutionStatus::Skipped),
            HitlAction::Retry => {
                tx.current_step_status = Some(ExecutionStatus::Retrying);
                tx.retry_count = 0;
            }
            HitlAction::Modify => {
                if let Some(patch) = &decision.patch {
                    patch.apply(&mut tx);
                }
                tx.current_step_status = Some(ExecutionStatus::Retrying);
                tx.retry_count = 0;
            }
            HitlAction::Restart => {
                tx.current_step_id = None;
                tx.current_step_status = None;
                tx.retry_count = 0;
                tx.context = json!({});
            }
        }
        tx.retry_at = None;
        self.persist(&mut tx).await?;
        self.change_status(&mut tx, after, reason).await?;

        let outcome = match self.snapshot(&tx).await {
            Ok(snapshot) => self.drive(&mut tx, &snapshot).await,
            Err(e) => Err(e),
        };
        self.settle(&mut tx, outcome).await
    }

    /// Assigns an open intervention to an actor.
    ///
    /// # Errors
    ///
    /// `InterventionNotFound`, `InterventionClosed`, `InvalidDecision`.
    pub async fn assign_intervention(&self, id: InterventionId, assignee: &str) -> EngineResult<HitlIntervention> {
        let transaction_id = self.intervention(id).await?.transaction_id;
        let _guard = self.locks.acquire(transaction_id).await;
        let mut intervention = self.intervention(id).await?;
        EscalationManager::assign(&mut intervention, assignee, self.clock.now())?;
        self.ports.store.upsert_hitl_intervention(&intervention).await?;
        self.log(
            NewProcessLog::new(transaction_id, ProcessEventType::HitlAssigned)
                .message(assignee.to_string())
                .details(json!({ "intervention_id": id })),
        )
        .await?;
        info!(intervention_id = %id, assignee, "Assigned HITL intervention");
        Ok(intervention)
    }

    /// Open interventions, most urgent first, optionally filtered by queue
    /// and assignee.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn open_interventions(
        &self,
        queue: Option<&str>,
        assignee: Option<&str>,
    ) -> EngineResult<Vec<HitlIntervention>> {
        let mut open: Vec<_> = self
            .ports
            .store
            .list_open_interventions()
            .await?
            .into_iter()
            .filter(|i| queue.is_none_or(|q| i.queue_name == q))
            .filter(|i| assignee.is_none_or(|a| i.assigned_to.as_deref() == Some(a)))
            .collect();
        open.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(open)
    }

    /// Periodic sweep: escalates overdue interventions, times out overdue
    /// async steps, attempts retries whose backoff has elapsed and fails
    /// transactions past their workflow timeout.
    ///
    /// Per-transaction failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Store errors while listing work.
    pub async fn sweep(&self) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();

        for open in self.ports.store.list_open_interventions().await? {
            if open.assigned_to.is_some() {
                continue;
            }
            match self.escalate_if_due(open.id).await {
                Ok(true) => report.escalated += 1,
                Ok(false) => {}
                Err(e) => warn!(intervention_id = %open.id, error = %e, "Escalation check failed"),
            }
        }

        for candidate in self.ports.store.list_active_transactions().await? {
            match self.expire_if_due(candidate.id).await {
                Ok(Some(Expiry::Step)) => report.step_timeouts += 1,
                Ok(Some(Expiry::Workflow)) => report.workflow_timeouts += 1,
                Ok(Some(Expiry::Retry)) => report.retries_resumed += 1,
                Ok(None) => {}
                Err(e) => warn!(transaction_id = %candidate.id, error = %e, "Timeout check failed"),
            }
        }

        self.locks.release_idle();
        self.graphs.run_pending_tasks().await;
        info!(
            escalated = report.escalated,
            step_timeouts = report.step_timeouts,
            retries_resumed = report.retries_resumed,
            workflow_timeouts = report.workflow_timeouts,
            "Sweep finished"
        );
        Ok(report)
    }

    /// Everything recorded about a transaction.
    ///
    /// # Errors
    ///
    /// `TransactionNotFound`, store errors.
    pub async fn journey(&self, id: TransactionId) -> EngineResult<Journey> {
        let transaction = self.load(id).await?;
        let store = &self.ports.store;
        let interventions = store.list_interventions(id).await?;
        let mut audit_trail = Vec::new();
        for intervention in &interventions {
            audit_trail.extend(store.list_hitl_audit(intervention.id).await?);
        }
        Ok(Journey {
            transaction,
            process_logs: store.list_process_logs(id).await?,
            error_logs: store.list_error_logs(id).await?,
            interventions,
            audit_trail,
        })
    }

    async fn escalate_if_due(&self, id: InterventionId) -> EngineResult<bool> {
        let transaction_id = self.intervention(id).await?.transaction_id;
        let _guard = self.locks.acquire(transaction_id).await;
        let mut intervention = self.intervention(id).await?;
        let tx = self.load(transaction_id).await?;
        let graph = self.graph_for(&tx).await?;
        let now = self.clock.now();
        if !EscalationManager::escalation_due(&intervention, graph.hitl_config(), now) {
            return Ok(false);
        }
        let queue = EscalationManager::escalation_queue(graph.hitl_config(), &self.config.supervisory_queue);
        let audit = EscalationManager::escalate(&mut intervention, &queue, SYSTEM_ACTOR, None, tx.status, now)?;
        self.record_escalation(&intervention, audit).await?;
        Ok(true)
    }

    async fn expire_if_due(&self, id: TransactionId) -> EngineResult<Option<Expiry>> {
        let _guard = self.locks.acquire(id).await;
        let mut tx = self.load(id).await?;
        if tx.status.is_terminal() {
            return Ok(None);
        }
        let now = self.clock.now();

        if tx.status.is_waiting() {
            let graph = self.graph_for(&tx).await?;
            let hitl = graph.hitl_config();
            let overdue = workflow_deadline(&graph, &tx).is_some_and(|deadline| now >= deadline);
            if !overdue || hitl.pause_workflow_timeout {
                return Ok(None);
            }
            warn!(transaction_id = %id, status = %tx.status, "Workflow timed out while parked");
            self.close_interventions(&tx, "Workflow timed out").await?;
            let cause = FailureCause::workflow_timeout(&tx);
            self.fail(&mut tx, cause).await?;
            return Ok(Some(Expiry::Workflow));
        }

        let snapshot = self.snapshot(&tx).await?;
        if snapshot.workflow_deadline(&tx).is_some_and(|deadline| now >= deadline) {
            warn!(transaction_id = %id, "Workflow timed out");
            let cause = FailureCause::workflow_timeout(&tx);
            self.fail(&mut tx, cause).await?;
            return Ok(Some(Expiry::Workflow));
        }

        if tx.retry_at.is_some_and(|at| now >= at) {
            debug!(transaction_id = %id, attempt = tx.retry_count, "Backoff elapsed");
            let outcome = self.drive(&mut tx, &snapshot).await;
            self.settle(&mut tx, outcome).await?;
            return Ok(Some(Expiry::Retry));
        }

        let Some(awaiting) = tx.awaiting.clone().filter(|a| now >= a.deadline) else {
            return Ok(None);
        };
        tx.awaiting = None;
        let step_code = snapshot
            .graph
            .step(awaiting.step_id)
            .map(|s| s.step_code.clone())
            .unwrap_or_default();
        self.log(
            NewProcessLog::new(id, ProcessEventType::StepTimedOut)
                .step(awaiting.step_id, &step_code)
                .execution(ExecutionStatus::Timeout)
                .attempt(tx.retry_count)
                .details(json!({ "fence": awaiting.fence, "deadline": awaiting.deadline })),
        )
        .await?;
        warn!(transaction_id = %id, step_code = %step_code, fence = awaiting.fence, "Async step timed out");

        let result = StepResult::timeout(format!("No outcome for {step_code} by {}", awaiting.deadline));
        let outcome = self.resume_after(&mut tx, &snapshot, awaiting.step_id, result).await;
        self.settle(&mut tx, outcome).await?;
        Ok(Some(Expiry::Step))
    }

    /// Concludes an awaited step, then keeps driving.
    async fn resume_after(
        &self,
        tx: &mut PaymentTransaction,
        snapshot: &RunSnapshot,
        step_id: StepId,
        result: StepResult,
    ) -> EngineResult<Progress> {
        match self.conclude(tx, snapshot, step_id, result).await? {
            Flow::Continue => self.drive(tx, snapshot).await,
            Flow::Halt(progress) => Ok(progress),
        }
    }

    /// Closes every open intervention of a transaction on behalf of the
    /// system, ahead of a forced failure.
    async fn close_interventions(&self, tx: &PaymentTransaction, reason: &str) -> EngineResult<()> {
        let now = self.clock.now();
        let decision = HitlDecision::new(HitlAction::Reject, SYSTEM_ACTOR).with_notes(reason);
        let open = self.ports.store.list_interventions(tx.id).await?;
        for mut intervention in open.into_iter().filter(HitlIntervention::is_open) {
            let audit = EscalationManager::resolve(&mut intervention, &decision, tx.status, TransactionStatus::Failed, now)?;
            self.ports.store.upsert_hitl_intervention(&intervention).await?;
            self.ports.store.append_hitl_audit(audit).await?;
            self.log(
                NewProcessLog::new(tx.id, ProcessEventType::HitlResolved)
                    .message(format!("{} by {SYSTEM_ACTOR}", decision.action))
                    .details(json!({
                        "intervention_id": intervention.id,
                        "action": decision.action,
                        "actor": SYSTEM_ACTOR,
                        "notes": reason,
                    })),
            )
            .await?;
        }
        Ok(())
    }

    /// Sleeps on the engine clock until `at`. Holds no lock.
    pub async fn wait_until(&self, at: DateTime<Utc>) {
        if let Ok(delay) = (at - self.clock.now()).to_std() {
            self.clock.sleep(delay).await;
        }
    }

    async fn record_escalation(&self, intervention: &HitlIntervention, audit: HitlAuditTrail) -> EngineResult<()> {
        let actor = audit.actor.clone();
        self.ports.store.upsert_hitl_intervention(intervention).await?;
        self.ports.store.append_hitl_audit(audit).await?;
        self.log(
            NewProcessLog::new(intervention.transaction_id, ProcessEventType::HitlEscalated)
                .message(format!(
                    "Escalated to {} (level {})",
                    intervention.queue_name, intervention.escalation_level
                ))
                .details(json!({
                    "intervention_id": intervention.id,
                    "priority": intervention.priority,
                    "actor": actor,
                })),
        )
        .await?;
        Ok(())
    }

    /// Status to return to when a parked step resumes.
    fn resume_status(intervention: &HitlIntervention, action: HitlAction) -> TransactionStatus {
        let parked = intervention.parked_status;
        let awaiting_approval = intervention.context.waiting_status() == TransactionStatus::PendingApproval;
        if action == HitlAction::Approve && awaiting_approval && parked.is_forward_of(TransactionStatus::Approved) {
            TransactionStatus::Approved
        } else {
            parked
        }
    }

    async fn parked(&self, tx: &PaymentTransaction) -> EngineResult<Progress> {
        let open = self
            .ports
            .store
            .list_interventions(tx.id)
            .await?
            .into_iter()
            .find(HitlIntervention::is_open);
        Ok(match open {
            Some(intervention) => Progress::Suspended {
                intervention_id: intervention.id,
            },
            None => Progress::Held { status: tx.status },
        })
    }

    pub(super) async fn snapshot(&self, tx: &PaymentTransaction) -> EngineResult<RunSnapshot> {
        let graph = self.graph_for(tx).await?;
        let rail_id = tx.rail_id.ok_or(ConfigurationError::UnboundTransaction(tx.id))?;
        let master_data = &self.ports.master_data;

        let rail = master_data
            .get_rail(rail_id)
            .await?
            .filter(|rail| rail.is_active)
            .ok_or_else(|| EngineError::BusinessRuleViolation {
                code: RAIL_UNAVAILABLE_CODE.to_string(),
                message: format!("Rail {rail_id} is not available"),
            })?;
        let currency = tx.instructed.currency;
        let currency_active = master_data
            .get_currency(currency)
            .await?
            .is_some_and(|info| info.is_active);
        if !currency_active || !rail.supports(currency) {
            return Err(EngineError::BusinessRuleViolation {
                code: CURRENCY_NOT_SUPPORTED_CODE.to_string(),
                message: format!("{} does not settle {currency}", rail.rail_code),
            });
        }
        let product = match tx.product_id {
            Some(product_id) => master_data.get_product(product_id).await?,
            None => None,
        };

        Ok(RunSnapshot {
            config: Arc::clone(&self.config),
            graph,
            rail,
            product,
            taken_at: self.clock.now(),
        })
    }

    async fn graph_for(&self, tx: &PaymentTransaction) -> EngineResult<Arc<WorkflowGraph>> {
        let workflow_id = tx.workflow_id.ok_or(ConfigurationError::UnboundTransaction(tx.id))?;
        self.graphs.get_or_load(self.ports.workflows.as_ref(), workflow_id).await
    }

    async fn load(&self, id: TransactionId) -> EngineResult<PaymentTransaction> {
        self.ports
            .store
            .get_transaction(id)
            .await?
            .ok_or(EngineError::TransactionNotFound(id))
    }

    async fn intervention(&self, id: InterventionId) -> EngineResult<HitlIntervention> {
        self.ports
            .store
            .get_hitl_intervention(id)
            .await?
            .ok_or(EngineError::InterventionNotFound(id))
    }
}
