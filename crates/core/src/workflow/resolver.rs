//! Transition resolution.

use railflow_shared::types::{StepId, TransitionId};
use tracing::debug;

use crate::engine::error::ConfigurationError;
use crate::transaction::view::TransactionView;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::types::ExecutionStatus;

/// The edge selected for an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTransition {
    /// Transition row that matched.
    pub transition_id: TransitionId,
    /// Next step; `None` means the workflow is finished.
    pub next: Option<StepId>,
}

/// Stateless resolver selecting the next step for an outcome.
pub struct TransitionResolver;

impl TransitionResolver {
    /// Selects the first edge for `(from, trigger)` whose condition holds.
    ///
    /// Edges are tried in ascending `(priority, id)` order, so the result is
    /// a pure function of graph, source step, trigger and context.
    ///
    /// # Errors
    ///
    /// `NoMatchingTransition` when no edge matches. This is a configuration
    /// defect and is fatal to the transaction.
    pub fn resolve(
        graph: &WorkflowGraph,
        from: Option<StepId>,
        trigger: ExecutionStatus,
        view: &TransactionView<'_>,
    ) -> Result<ResolvedTransition, ConfigurationError> {
        let edge = graph
            .edges(from, trigger)
            .iter()
            .find(|edge| edge.condition.as_ref().is_none_or(|c| c.evaluate(view)))
            .ok_or(ConfigurationError::NoMatchingTransition {
                workflow_id: graph.id(),
                from,
                trigger,
            })?;

        debug!(
            workflow_id = %graph.id(),
            transition_id = %edge.id,
            trigger = %trigger,
            next = ?edge.to,
            "Resolved transition"
        );

        Ok(ResolvedTransition {
            transition_id: edge.id,
            next: edge.to,
        })
    }

    /// Like [`resolve`](Self::resolve) but returns `None` instead of an error
    /// when no edge matches.
    #[must_use]
    pub fn try_resolve(
        graph: &WorkflowGraph,
        from: Option<StepId>,
        trigger: ExecutionStatus,
        view: &TransactionView<'_>,
    ) -> Option<ResolvedTransition> {
        Self::resolve(graph, from, trigger, view).ok()
    }
}
