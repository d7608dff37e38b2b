//! In-memory workflow graph.
//!
//! Steps live in an arena indexed by [`StepId`]; outgoing edges are grouped
//! by `(from, trigger)` and pre-sorted by `(priority, id)`. A graph is built
//! once per workflow version and shared read-only between runs.

use std::collections::HashMap;

use railflow_shared::types::{StepId, TransitionId, WorkflowId};

use crate::engine::error::ConfigurationError;
use crate::workflow::condition::Condition;
use crate::workflow::policy::{HitlConfig, RetryPolicy, TimeoutConfig};
use crate::workflow::types::{ExecutionStatus, WorkflowDefinition, WorkflowStep, WorkflowStepTransition};

/// A validated outgoing edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Source transition row.
    pub id: TransitionId,
    /// Target step; `None` ends the workflow.
    pub to: Option<StepId>,
    /// Tie-breaker, ascending.
    pub priority: u32,
    /// Parsed guard.
    pub condition: Option<Condition>,
}

/// A loaded workflow node with its parsed guard.
#[derive(Debug, Clone)]
pub struct StepNode {
    /// Stored step row.
    pub step: WorkflowStep,
    /// Parsed `condition_expression`.
    pub condition: Option<Condition>,
}

/// Validated, interpretable form of a workflow definition.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    definition: WorkflowDefinition,
    nodes: Vec<StepNode>,
    index: HashMap<StepId, usize>,
    edges: HashMap<(Option<StepId>, ExecutionStatus), Vec<Edge>>,
    retry_policy: RetryPolicy,
    timeout_config: TimeoutConfig,
    hitl_config: HitlConfig,
}

impl WorkflowGraph {
    /// Builds a graph, rejecting any configuration defect.
    ///
    /// Checks performed:
    /// - the workflow is active and its policy documents parse strictly
    /// - every active edge references active steps of this workflow
    /// - an active start edge (`None` on `PENDING`) exists
    /// - no two unconditional edges share `(from, trigger, priority)`
    /// - every condition expression parses
    pub fn load(
        definition: WorkflowDefinition,
        steps: Vec<WorkflowStep>,
        transitions: Vec<WorkflowStepTransition>,
    ) -> Result<Self, ConfigurationError> {
        if !definition.is_active {
            return Err(ConfigurationError::WorkflowInactive(definition.id));
        }
        let retry_policy = RetryPolicy::from_json(&definition.retry_policy)?;
        let timeout_config = TimeoutConfig::from_json(&definition.timeout_config)?;
        let hitl_config = HitlConfig::from_json(&definition.hitl_config)?;

        let mut nodes: Vec<StepNode> = Vec::new();
        for step in steps {
            if step.workflow_id != definition.id || !step.is_active {
                continue;
            }
            let condition = step
                .condition_expression
                .as_deref()
                .filter(|source| !source.trim().is_empty())
                .map(Condition::parse)
                .transpose()?;
            nodes.push(StepNode { step, condition });
        }
        nodes.sort_by_key(|node| node.step.step_sequence);
        let index: HashMap<StepId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.step.id, i))
            .collect();

        let mut edges: HashMap<(Option<StepId>, ExecutionStatus), Vec<Edge>> = HashMap::new();
        for transition in transitions {
            if transition.workflow_id != definition.id || !transition.is_active {
                continue;
            }
            for step in [transition.from_step_id, transition.to_step_id].into_iter().flatten() {
                if !index.contains_key(&step) {
                    return Err(ConfigurationError::UnknownStep {
                        transition: transition.id,
                        step,
                    });
                }
            }
            let condition = transition
                .condition_expression
                .as_deref()
                .filter(|source| !source.trim().is_empty())
                .map(Condition::parse)
                .transpose()?;
            edges
                .entry((transition.from_step_id, transition.trigger))
                .or_default()
                .push(Edge {
                    id: transition.id,
                    to: transition.to_step_id,
                    priority: transition.priority,
                    condition,
                });
        }

        for ((from, trigger), group) in &mut edges {
            group.sort_by_key(|edge| (edge.priority, edge.id));
            let unconditional = group.iter().filter(|edge| edge.condition.is_none());
            let mut seen = Vec::new();
            for edge in unconditional {
                if seen.contains(&edge.priority) {
                    return Err(ConfigurationError::AmbiguousTransition {
                        from: *from,
                        trigger: *trigger,
                        priority: edge.priority,
                    });
                }
                seen.push(edge.priority);
            }
        }

        if !edges.contains_key(&(None, ExecutionStatus::Pending)) {
            return Err(ConfigurationError::MissingStartTransition(definition.id));
        }

        Ok(Self {
            definition,
            nodes,
            index,
            edges,
            retry_policy,
            timeout_config,
            hitl_config,
        })
    }

    /// The workflow version this graph was built from.
    #[must_use]
    pub fn id(&self) -> WorkflowId {
        self.definition.id
    }

    /// The stored definition.
    #[must_use]
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Looks up a step node.
    #[must_use]
    pub fn node(&self, id: StepId) -> Option<&StepNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Looks up a step.
    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&WorkflowStep> {
        self.node(id).map(|node| &node.step)
    }

    /// Steps in sequence order.
    pub fn steps(&self) -> impl Iterator<Item = &WorkflowStep> {
        self.nodes.iter().map(|node| &node.step)
    }

    /// Outgoing edges for `(from, trigger)`, in resolution order.
    #[must_use]
    pub fn edges(&self, from: Option<StepId>, trigger: ExecutionStatus) -> &[Edge] {
        self.edges
            .get(&(from, trigger))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Parsed retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Parsed timeout configuration.
    #[must_use]
    pub fn timeout_config(&self) -> &TimeoutConfig {
        &self.timeout_config
    }

    /// Parsed HITL configuration.
    #[must_use]
    pub fn hitl_config(&self) -> &HitlConfig {
        &self.hitl_config
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{definition, edge, step};
    use super::*;
    use crate::workflow::types::StepType;
    use serde_json::json;

    #[test]
    fn test_load_linear_workflow() {
        let def = definition();
        let a = step(def.id, 1, "VALIDATE", StepType::Validation);
        let b = step(def.id, 2, "SUBMIT", StepType::Submission);
        let transitions = vec![
            edge(def.id, None, Some(a.id), ExecutionStatus::Pending, 1),
            edge(def.id, Some(a.id), Some(b.id), ExecutionStatus::Success, 1),
            edge(def.id, Some(b.id), None, ExecutionStatus::Success, 1),
        ];
        let (a_id, b_id) = (a.id, b.id);
        let graph = WorkflowGraph::load(def, vec![b, a], transitions).unwrap();

        let codes: Vec<_> = graph.steps().map(|s| s.step_code.as_str()).collect();
        assert_eq!(codes, vec!["VALIDATE", "SUBMIT"]);
        assert_eq!(graph.edges(None, ExecutionStatus::Pending)[0].to, Some(a_id));
        assert_eq!(graph.edges(Some(b_id), ExecutionStatus::Success)[0].to, None);
        assert!(graph.edges(Some(a_id), ExecutionStatus::Failure).is_empty());
    }

    #[test]
    fn test_rejects_inactive_workflow() {
        let mut def = definition();
        def.is_active = false;
        let id = def.id;
        let err = WorkflowGraph::load(def, vec![], vec![]).unwrap_err();
        assert_eq!(err, ConfigurationError::WorkflowInactive(id));
    }

    #[test]
    fn test_rejects_missing_start_edge() {
        let def = definition();
        let a = step(def.id, 1, "VALIDATE", StepType::Validation);
        let transitions = vec![edge(def.id, Some(a.id), None, ExecutionStatus::Success, 1)];
        let err = WorkflowGraph::load(def, vec![a], transitions).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingStartTransition(_)));
    }

    #[test]
    fn test_rejects_edge_to_unknown_step() {
        let def = definition();
        let a = step(def.id, 1, "VALIDATE", StepType::Validation);
        let mut inactive = step(def.id, 2, "OLD", StepType::Notification);
        inactive.is_active = false;
        let transitions = vec![
            edge(def.id, None, Some(a.id), ExecutionStatus::Pending, 1),
            edge(def.id, Some(a.id), Some(inactive.id), ExecutionStatus::Success, 1),
        ];
        let err = WorkflowGraph::load(def, vec![a, inactive], transitions).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownStep { .. }));
    }

    #[test]
    fn test_rejects_ambiguous_edges() {
        let def = definition();
        let a = step(def.id, 1, "VALIDATE", StepType::Validation);
        let b = step(def.id, 2, "SUBMIT", StepType::Submission);
        let transitions = vec![
            edge(def.id, None, Some(a.id), ExecutionStatus::Pending, 1),
            edge(def.id, Some(a.id), Some(b.id), ExecutionStatus::Success, 1),
            edge(def.id, Some(a.id), None, ExecutionStatus::Success, 1),
        ];
        let err = WorkflowGraph::load(def, vec![a, b], transitions).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::AmbiguousTransition { priority: 1, trigger: ExecutionStatus::Success, .. }
        ));
    }

    #[test]
    fn test_conditional_edges_may_share_priority() {
        let def = definition();
        let a = step(def.id, 1, "VALIDATE", StepType::Validation);
        let b = step(def.id, 2, "SUBMIT", StepType::Submission);
        let mut guarded = edge(def.id, Some(a.id), Some(b.id), ExecutionStatus::Success, 1);
        guarded.condition_expression = Some("amount > 100".into());
        let transitions = vec![
            edge(def.id, None, Some(a.id), ExecutionStatus::Pending, 1),
            guarded,
            edge(def.id, Some(a.id), None, ExecutionStatus::Success, 1),
        ];
        assert!(WorkflowGraph::load(def, vec![a, b], transitions).is_ok());
    }

    #[test]
    fn test_rejects_bad_condition_and_policy() {
        let def = definition();
        let mut a = step(def.id, 1, "VALIDATE", StepType::Validation);
        a.condition_expression = Some("amount >".into());
        let transitions = vec![edge(def.id, None, Some(a.id), ExecutionStatus::Pending, 1)];
        let err = WorkflowGraph::load(def.clone(), vec![a], transitions).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidCondition { .. }));

        let mut def = definition();
        def.hitl_config = json!({"enabled": "yes"});
        let err = WorkflowGraph::load(def, vec![], vec![]).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPolicy { document: "hitlConfig", .. }));
    }
}
