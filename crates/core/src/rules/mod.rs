//! Validation and routing rules.
//!
//! # Modules
//!
//! - `types` - Stored rule rows and the parsed expression form
//! - `evaluator` - Validation rule evaluation in priority order
//! - `routing` - Rail/product selection

pub mod evaluator;
pub mod routing;
pub mod types;

#[cfg(test)]
mod evaluator_props;

pub use evaluator::{RecentValueLookup, RuleEvaluator, RuleOutcome, ValidationReport};
pub use routing::{RoutingDecision, RoutingEngine};
pub use types::{DEFAULT_RULE_ERROR_CODE, RoutingRule, RuleExpression, ValidationRule};
