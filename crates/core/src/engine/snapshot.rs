//! Per-run configuration snapshot.
//!
//! Everything a run reads besides the transaction itself is captured once
//! when the run starts and passed down explicitly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use railflow_shared::EngineConfig;

use crate::hitl::manager::EscalationManager;
use crate::reference::types::{PaymentProduct, PaymentRail};
use crate::transaction::types::PaymentTransaction;
use crate::transaction::view::TransactionView;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::types::WorkflowStep;

/// Immutable inputs of one advancement.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    /// Engine settings.
    pub config: Arc<EngineConfig>,
    /// Workflow version the transaction is bound to.
    pub graph: Arc<WorkflowGraph>,
    /// Bound rail.
    pub rail: PaymentRail,
    /// Bound product.
    pub product: Option<PaymentProduct>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl RunSnapshot {
    /// Field view carrying the rail/product codes.
    #[must_use]
    pub fn view<'a>(&'a self, tx: &'a PaymentTransaction) -> TransactionView<'a> {
        TransactionView::new(tx).with_codes(
            Some(self.rail.rail_code.as_str()),
            self.product.as_ref().map(|p| p.product_code.as_str()),
        )
    }

    /// Per-attempt timeout of a step.
    ///
    /// The step's own `stepConfig` wins, then the workflow's
    /// `step_timeout_minutes`, then the engine default.
    #[must_use]
    pub fn step_timeout(&self, step: &WorkflowStep) -> Duration {
        let secs = step.timeout_override_secs().unwrap_or_else(|| {
            self.graph
                .timeout_config()
                .step_timeout_minutes
                .unwrap_or(self.config.default_step_timeout_minutes)
                .saturating_mul(60)
        });
        Duration::from_secs(secs)
    }

    /// Time after which the whole workflow run is abandoned.
    #[must_use]
    pub fn workflow_deadline(&self, tx: &PaymentTransaction) -> Option<DateTime<Utc>> {
        workflow_deadline(&self.graph, tx)
    }

    /// Queue for an intervention raised by `step`.
    #[must_use]
    pub fn hitl_queue(&self, step: &WorkflowStep) -> String {
        EscalationManager::queue_for(step, self.graph.hitl_config(), &self.config.default_hitl_queue)
    }

    /// Queue receiving escalated interventions.
    #[must_use]
    pub fn escalation_queue(&self) -> String {
        EscalationManager::escalation_queue(self.graph.hitl_config(), &self.config.supervisory_queue)
    }
}

/// Time after which a run of `graph` started by `tx` is abandoned.
#[must_use]
pub fn workflow_deadline(graph: &WorkflowGraph, tx: &PaymentTransaction) -> Option<DateTime<Utc>> {
    let minutes = i64::try_from(graph.timeout_config().workflow_timeout_minutes?).ok()?;
    let budget = chrono::Duration::try_minutes(minutes)?;
    tx.workflow_started_at?.checked_add_signed(budget)
}
