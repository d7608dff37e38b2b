//! Collaborator contracts consumed by the engine.
//!
//! Concrete storage is out of scope for this crate; `railflow-store`
//! provides an in-memory implementation of every trait here.

use async_trait::async_trait;
use railflow_shared::error::AppResult;
use railflow_shared::types::{
    Currency, InterventionId, ProductId, RailId, TransactionId, WorkflowId,
};
use std::sync::Arc;

use crate::audit::types::{NewProcessLog, PaymentErrorLog, PaymentProcessLog};
use crate::hitl::types::{HitlAuditTrail, HitlIntervention};
use crate::reference::types::{CurrencyInfo, PaymentProduct, PaymentRail};
use crate::rules::evaluator::RecentValueLookup;
use crate::rules::types::{RoutingRule, ValidationRule};
use crate::transaction::types::{PaymentDirection, PaymentTransaction, TransactionStatus};
use crate::workflow::types::{WorkflowDefinition, WorkflowStep, WorkflowStepTransition};

/// Read-only master data.
#[async_trait]
pub trait MasterData: Send + Sync {
    /// Looks up a rail.
    async fn get_rail(&self, id: RailId) -> AppResult<Option<PaymentRail>>;

    /// Looks up a product.
    async fn get_product(&self, id: ProductId) -> AppResult<Option<PaymentProduct>>;

    /// Looks up a currency.
    async fn get_currency(&self, code: Currency) -> AppResult<Option<CurrencyInfo>>;
}

/// Validation and routing rules.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Rules scoped to the rail/product (plus unscoped rules), by priority.
    async fn list_validation_rules(
        &self,
        rail_id: Option<RailId>,
        product_id: Option<ProductId>,
    ) -> AppResult<Vec<ValidationRule>>;

    /// All routing rules, by priority.
    async fn list_routing_rules(&self) -> AppResult<Vec<RoutingRule>>;
}

/// Workflow definitions.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Looks up a workflow version.
    async fn get_workflow_definition(&self, id: WorkflowId) -> AppResult<Option<WorkflowDefinition>>;

    /// Steps of a workflow version.
    async fn list_steps(&self, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowStep>>;

    /// Transitions of a workflow version.
    async fn list_transitions(&self, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowStepTransition>>;

    /// The default workflow for a (rail, product, direction) triple.
    ///
    /// A product-specific default wins over a rail-wide one.
    async fn find_default_workflow(
        &self,
        rail_id: RailId,
        product_id: Option<ProductId>,
        direction: PaymentDirection,
    ) -> AppResult<Option<WorkflowDefinition>>;
}

/// Durable transaction, log and intervention store.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a new transaction (version 0).
    async fn insert_transaction(&self, tx: &PaymentTransaction) -> AppResult<()>;

    /// Loads a transaction.
    async fn get_transaction(&self, id: TransactionId) -> AppResult<Option<PaymentTransaction>>;

    /// Saves a transaction if its `version` matches the stored one.
    ///
    /// The stored status fields are never overwritten here; status changes
    /// go through [`compare_and_swap_status`](Self::compare_and_swap_status).
    /// Returns the new version; `Conflict` on a stale version.
    async fn save_transaction(&self, tx: &PaymentTransaction) -> AppResult<u64>;

    /// Atomically moves `expected` → `new`, recording `expected` as the
    /// previous status. Returns the new version; `Conflict` if the stored
    /// status is not `expected`.
    async fn compare_and_swap_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
    ) -> AppResult<u64>;

    /// Non-terminal transactions (for sweeps).
    async fn list_active_transactions(&self) -> AppResult<Vec<PaymentTransaction>>;

    /// Appends a process log entry, assigning the next `event_sequence`.
    async fn append_process_log(&self, entry: NewProcessLog) -> AppResult<PaymentProcessLog>;

    /// Process log of a transaction, by sequence.
    async fn list_process_logs(&self, transaction_id: TransactionId) -> AppResult<Vec<PaymentProcessLog>>;

    /// Appends an error log entry.
    async fn append_error_log(&self, entry: PaymentErrorLog) -> AppResult<()>;

    /// Error log of a transaction.
    async fn list_error_logs(&self, transaction_id: TransactionId) -> AppResult<Vec<PaymentErrorLog>>;

    /// Creates or replaces an intervention.
    async fn upsert_hitl_intervention(&self, intervention: &HitlIntervention) -> AppResult<()>;

    /// Looks up an intervention.
    async fn get_hitl_intervention(&self, id: InterventionId) -> AppResult<Option<HitlIntervention>>;

    /// Unresolved interventions, oldest first.
    async fn list_open_interventions(&self) -> AppResult<Vec<HitlIntervention>>;

    /// Interventions of a transaction, oldest first.
    async fn list_interventions(&self, transaction_id: TransactionId) -> AppResult<Vec<HitlIntervention>>;

    /// Appends an immutable HITL audit entry.
    async fn append_hitl_audit(&self, entry: HitlAuditTrail) -> AppResult<()>;

    /// Audit entries of an intervention, oldest first.
    async fn list_hitl_audit(&self, intervention_id: InterventionId) -> AppResult<Vec<HitlAuditTrail>>;
}

/// Everything the engine needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    /// Master data.
    pub master_data: Arc<dyn MasterData>,
    /// Rules.
    pub rules: Arc<dyn RuleSource>,
    /// Workflow definitions.
    pub workflows: Arc<dyn WorkflowSource>,
    /// Durable store.
    pub store: Arc<dyn PaymentStore>,
    /// Recency lookup for UNIQUE rules.
    pub recent_values: Arc<dyn RecentValueLookup>,
}

impl Collaborators {
    /// Uses one value for every collaborator.
    pub fn from_shared<T>(shared: Arc<T>) -> Self
    where
        T: MasterData + RuleSource + WorkflowSource + PaymentStore + RecentValueLookup + 'static,
    {
        Self {
            master_data: shared.clone(),
            rules: shared.clone(),
            workflows: shared.clone(),
            store: shared.clone(),
            recent_values: shared,
        }
    }
}
