//! Workflow definitions and their interpreter.
//!
//! # Modules
//!
//! - `types` - Stored definition rows (definition, step, transition) and enums
//! - `policy` - Strict schemas for `retryPolicy`, `timeoutConfig`, `hitlConfig`
//! - `condition` - Step and transition condition expressions
//! - `graph` - Validated in-memory workflow graph
//! - `resolver` - Transition resolution
//! - `cache` - Graph cache per workflow version

pub mod cache;
pub mod condition;
pub mod graph;
pub mod policy;
pub mod resolver;
pub mod types;

#[cfg(test)]
mod resolver_props;

pub use cache::GraphCache;
pub use condition::Condition;
pub use graph::{Edge, StepNode, WorkflowGraph};
pub use policy::{HitlConfig, RetryPolicy, TimeoutConfig};
pub use resolver::{ResolvedTransition, TransitionResolver};
pub use types::{
    ExecutionStatus, OnErrorAction, StepType, WorkflowDefinition, WorkflowStep,
    WorkflowStepTransition,
};
