//! In-memory implementation of every engine collaborator.
//!
//! Each table is a `DashMap`. Operations that must be atomic (sequence
//! assignment, versioned saves, status swaps) run under the shard lock of
//! the row they touch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use railflow_shared::error::{AppError, AppResult};
use railflow_shared::types::{
    Currency, EventId, InterventionId, ProcessLogId, ProductId, RailId, RuleId, TransactionId, WorkflowId,
};
use tracing::debug;

use railflow_core::audit::types::{NewProcessLog, PaymentErrorLog, PaymentProcessLog};
use railflow_core::hitl::types::{HitlAuditTrail, HitlIntervention};
use railflow_core::ports::{MasterData, PaymentStore, RuleSource, WorkflowSource};
use railflow_core::reference::types::{CurrencyInfo, PaymentProduct, PaymentRail};
use railflow_core::rules::evaluator::RecentValueLookup;
use railflow_core::rules::types::{RoutingRule, ValidationRule};
use railflow_core::transaction::types::{PaymentDirection, PaymentTransaction, TransactionStatus};
use railflow_core::transaction::view::TransactionView;
use railflow_core::workflow::types::{WorkflowDefinition, WorkflowStep, WorkflowStepTransition};

/// A workflow version with its steps and transitions.
#[derive(Debug, Clone)]
struct StoredWorkflow {
    definition: WorkflowDefinition,
    steps: Vec<WorkflowStep>,
    transitions: Vec<WorkflowStepTransition>,
}

/// Process-local store backing the engine.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rails: DashMap<RailId, PaymentRail>,
    products: DashMap<ProductId, PaymentProduct>,
    currencies: DashMap<Currency, CurrencyInfo>,
    validation_rules: DashMap<RuleId, ValidationRule>,
    routing_rules: DashMap<RuleId, RoutingRule>,
    workflows: DashMap<WorkflowId, StoredWorkflow>,
    transactions: DashMap<TransactionId, PaymentTransaction>,
    process_logs: DashMap<TransactionId, Vec<PaymentProcessLog>>,
    error_logs: DashMap<TransactionId, Vec<PaymentErrorLog>>,
    interventions: DashMap<InterventionId, HitlIntervention>,
    hitl_audit: DashMap<InterventionId, Vec<HitlAuditTrail>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a rail.
    pub fn put_rail(&self, rail: PaymentRail) {
        self.rails.insert(rail.id, rail);
    }

    /// Activates or deactivates a rail.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown rail.
    pub fn set_rail_active(&self, id: RailId, active: bool) -> AppResult<()> {
        let mut rail = self
            .rails
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("rail {id}")))?;
        rail.is_active = active;
        Ok(())
    }

    /// Adds or replaces a product.
    pub fn put_product(&self, product: PaymentProduct) {
        self.products.insert(product.id, product);
    }

    /// Adds or replaces a currency.
    pub fn put_currency(&self, currency: CurrencyInfo) {
        self.currencies.insert(currency.code, currency);
    }

    /// Adds or replaces a validation rule.
    pub fn put_validation_rule(&self, rule: ValidationRule) {
        self.validation_rules.insert(rule.id, rule);
    }

    /// Adds or replaces a routing rule.
    pub fn put_routing_rule(&self, rule: RoutingRule) {
        self.routing_rules.insert(rule.id, rule);
    }

    /// Adds or replaces a workflow version.
    ///
    /// # Errors
    ///
    /// `Conflict` when another active default already covers the same
    /// (rail, product, direction); `Validation` when a step or transition
    /// belongs to another workflow.
    pub fn put_workflow(
        &self,
        definition: WorkflowDefinition,
        steps: Vec<WorkflowStep>,
        transitions: Vec<WorkflowStepTransition>,
    ) -> AppResult<()> {
        let id = definition.id;
        if steps.iter().any(|s| s.workflow_id != id) || transitions.iter().any(|t| t.workflow_id != id) {
            return Err(AppError::Validation(format!(
                "workflow {} has rows of another workflow",
                definition.workflow_code
            )));
        }
        if definition.is_default && definition.is_active {
            let clash = self.workflows.iter().find(|other| {
                let other = &other.definition;
                other.id != id
                    && other.is_default
                    && other.is_active
                    && other.rail_id == definition.rail_id
                    && other.product_id == definition.product_id
                    && other.direction == definition.direction
            });
            if let Some(clash) = clash {
                return Err(AppError::Conflict(format!(
                    "{} is already the default workflow for its rail, product and direction",
                    clash.definition.workflow_code
                )));
            }
        }
        debug!(
            workflow_code = %definition.workflow_code,
            version = definition.version,
            steps = steps.len(),
            transitions = transitions.len(),
            "Stored workflow"
        );
        self.workflows.insert(
            id,
            StoredWorkflow {
                definition,
                steps,
                transitions,
            },
        );
        Ok(())
    }

    /// Number of stored transactions.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn conflict(id: TransactionId, what: &str) -> AppError {
        AppError::Conflict(format!("transaction {id}: {what}"))
    }
}

#[async_trait]
impl MasterData for InMemoryStore {
    async fn get_rail(&self, id: RailId) -> AppResult<Option<PaymentRail>> {
        Ok(self.rails.get(&id).map(|r| r.value().clone()))
    }

    async fn get_product(&self, id: ProductId) -> AppResult<Option<PaymentProduct>> {
        Ok(self.products.get(&id).map(|p| p.value().clone()))
    }

    async fn get_currency(&self, code: Currency) -> AppResult<Option<CurrencyInfo>> {
        Ok(self.currencies.get(&code).map(|c| c.value().clone()))
    }
}

#[async_trait]
impl RuleSource for InMemoryStore {
    async fn list_validation_rules(
        &self,
        rail_id: Option<RailId>,
        product_id: Option<ProductId>,
    ) -> AppResult<Vec<ValidationRule>> {
        let mut rules: Vec<_> = self
            .validation_rules
            .iter()
            .filter(|rule| rule.applies_to(rail_id, product_id))
            .map(|rule| rule.value().clone())
            .collect();
        rules.sort_by(|a, b| a.rule_priority.cmp(&b.rule_priority).then_with(|| a.rule_code.cmp(&b.rule_code)));
        Ok(rules)
    }

    async fn list_routing_rules(&self) -> AppResult<Vec<RoutingRule>> {
        let mut rules: Vec<_> = self.routing_rules.iter().map(|rule| rule.value().clone()).collect();
        rules.sort_by(|a, b| a.rule_priority.cmp(&b.rule_priority).then_with(|| a.rule_code.cmp(&b.rule_code)));
        Ok(rules)
    }
}

#[async_trait]
impl WorkflowSource for InMemoryStore {
    async fn get_workflow_definition(&self, id: WorkflowId) -> AppResult<Option<WorkflowDefinition>> {
        Ok(self.workflows.get(&id).map(|w| w.definition.clone()))
    }

    async fn list_steps(&self, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowStep>> {
        let mut steps = self
            .workflows
            .get(&workflow_id)
            .map(|w| w.steps.clone())
            .unwrap_or_default();
        steps.sort_by_key(|s| s.step_sequence);
        Ok(steps)
    }

    async fn list_transitions(&self, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowStepTransition>> {
        Ok(self
            .workflows
            .get(&workflow_id)
            .map(|w| w.transitions.clone())
            .unwrap_or_default())
    }

    async fn find_default_workflow(
        &self,
        rail_id: RailId,
        product_id: Option<ProductId>,
        direction: PaymentDirection,
    ) -> AppResult<Option<WorkflowDefinition>> {
        let defaults: Vec<_> = self
            .workflows
            .iter()
            .map(|w| w.definition.clone())
            .filter(|d| d.is_default && d.is_active && d.rail_id == rail_id && d.direction == direction)
            .collect();
        let specific = product_id.and_then(|p| defaults.iter().find(|d| d.product_id == Some(p)));
        Ok(specific
            .or_else(|| defaults.iter().find(|d| d.product_id.is_none()))
            .cloned())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_transaction(&self, tx: &PaymentTransaction) -> AppResult<()> {
        match self.transactions.entry(tx.id) {
            Entry::Occupied(_) => Err(Self::conflict(tx.id, "already exists")),
            Entry::Vacant(slot) => {
                slot.insert(tx.clone());
                Ok(())
            }
        }
    }

    async fn get_transaction(&self, id: TransactionId) -> AppResult<Option<PaymentTransaction>> {
        Ok(self.transactions.get(&id).map(|t| t.value().clone()))
    }

    async fn save_transaction(&self, tx: &PaymentTransaction) -> AppResult<u64> {
        let mut stored = self
            .transactions
            .get_mut(&tx.id)
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", tx.id)))?;
        if stored.version != tx.version {
            return Err(Self::conflict(
                tx.id,
                &format!("stale version {} (stored {})", tx.version, stored.version),
            ));
        }
        if stored.status.is_terminal() {
            return Err(Self::conflict(tx.id, "transaction is final"));
        }
        let status = stored.status;
        let previous_status = stored.previous_status;
        let version = stored.version + 1;
        *stored = PaymentTransaction {
            status,
            previous_status,
            version,
            ..tx.clone()
        };
        Ok(version)
    }

    async fn compare_and_swap_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
    ) -> AppResult<u64> {
        let mut stored = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("transaction {id}")))?;
        if stored.status != expected {
            return Err(Self::conflict(
                id,
                &format!("status is {}, expected {expected}", stored.status),
            ));
        }
        stored.previous_status = Some(expected);
        stored.status = new;
        stored.version += 1;
        Ok(stored.version)
    }

    async fn list_active_transactions(&self) -> AppResult<Vec<PaymentTransaction>> {
        let mut active: Vec<_> = self
            .transactions
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.value().clone())
            .collect();
        active.sort_by_key(|t| t.created_at);
        Ok(active)
    }

    async fn append_process_log(&self, entry: NewProcessLog) -> AppResult<PaymentProcessLog> {
        let transaction_id = entry.transaction_id;
        let status = self
            .transactions
            .get(&transaction_id)
            .map(|t| t.status)
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;
        if status.is_terminal() {
            return Err(Self::conflict(transaction_id, "process log is closed"));
        }

        let mut log = self.process_logs.entry(transaction_id).or_default();
        let event_sequence = log.last().map_or(1, |last| last.event_sequence + 1);
        let logged = PaymentProcessLog {
            id: ProcessLogId::new(),
            event_id: EventId::new(),
            event_sequence,
            entry,
            created_at: Utc::now(),
        };
        log.push(logged.clone());
        Ok(logged)
    }

    async fn list_process_logs(&self, transaction_id: TransactionId) -> AppResult<Vec<PaymentProcessLog>> {
        Ok(self
            .process_logs
            .get(&transaction_id)
            .map(|log| log.value().clone())
            .unwrap_or_default())
    }

    async fn append_error_log(&self, entry: PaymentErrorLog) -> AppResult<()> {
        self.error_logs.entry(entry.transaction_id).or_default().push(entry);
        Ok(())
    }

    async fn list_error_logs(&self, transaction_id: TransactionId) -> AppResult<Vec<PaymentErrorLog>> {
        Ok(self
            .error_logs
            .get(&transaction_id)
            .map(|log| log.value().clone())
            .unwrap_or_default())
    }

    async fn upsert_hitl_intervention(&self, intervention: &HitlIntervention) -> AppResult<()> {
        self.interventions.insert(intervention.id, intervention.clone());
        Ok(())
    }

    async fn get_hitl_intervention(&self, id: InterventionId) -> AppResult<Option<HitlIntervention>> {
        Ok(self.interventions.get(&id).map(|i| i.value().clone()))
    }

    async fn list_open_interventions(&self) -> AppResult<Vec<HitlIntervention>> {
        let mut open: Vec<_> = self
            .interventions
            .iter()
            .filter(|i| i.is_open())
            .map(|i| i.value().clone())
            .collect();
        open.sort_by_key(|i| i.created_at);
        Ok(open)
    }

    async fn list_interventions(&self, transaction_id: TransactionId) -> AppResult<Vec<HitlIntervention>> {
        let mut interventions: Vec<_> = self
            .interventions
            .iter()
            .filter(|i| i.transaction_id == transaction_id)
            .map(|i| i.value().clone())
            .collect();
        interventions.sort_by_key(|i| i.created_at);
        Ok(interventions)
    }

    async fn append_hitl_audit(&self, entry: HitlAuditTrail) -> AppResult<()> {
        if !self.interventions.contains_key(&entry.intervention_id) {
            return Err(AppError::NotFound(format!("intervention {}", entry.intervention_id)));
        }
        self.hitl_audit.entry(entry.intervention_id).or_default().push(entry);
        Ok(())
    }

    async fn list_hitl_audit(&self, intervention_id: InterventionId) -> AppResult<Vec<HitlAuditTrail>> {
        Ok(self
            .hitl_audit
            .get(&intervention_id)
            .map(|trail| trail.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RecentValueLookup for InMemoryStore {
    async fn seen_since(
        &self,
        field: &str,
        value: &str,
        since: DateTime<Utc>,
        exclude: TransactionId,
    ) -> AppResult<bool> {
        Ok(self.transactions.iter().any(|tx| {
            tx.id != exclude
                && tx.created_at >= since
                && TransactionView::new(tx.value())
                    .field(field)
                    .is_some_and(|actual| actual.to_string() == value)
        }))
    }
}
