//! Step Executor Registry.
//!
//! One [`StepHandler`] per [`StepType`](crate::workflow::types::StepType),
//! dispatched through [`StepRegistry`]. Handlers are external collaborators;
//! the only built-in one is the rule-backed VALIDATION handler.

pub mod handler;
pub mod mapping;
pub mod registry;
pub mod validation;

pub use handler::{FailureKind, HandlerError, StepContext, StepFailure, StepHandler, StepResult, StepWarning};
pub use mapping::{merge_output, project_input, record_output};
pub use registry::StepRegistry;
pub use validation::RuleValidationHandler;
