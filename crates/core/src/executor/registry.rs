//! Step handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::engine::error::ConfigurationError;
use crate::executor::handler::{HandlerError, StepContext, StepHandler, StepResult};
use crate::workflow::types::StepType;

/// Maps each step type to its handler.
#[derive(Clone, Default)]
pub struct StepRegistry {
    handlers: HashMap<StepType, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its step type, returning the one it replaces.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) -> Option<Arc<dyn StepHandler>> {
        let step_type = handler.step_type();
        info!(step_type = %step_type, "Registered step handler");
        self.handlers.insert(step_type, handler)
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, handler: Arc<dyn StepHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Returns the handler for a step type.
    ///
    /// # Errors
    ///
    /// `MissingHandler` if no handler is registered.
    pub fn get(&self, step_type: StepType) -> Result<Arc<dyn StepHandler>, ConfigurationError> {
        self.handlers
            .get(&step_type)
            .cloned()
            .ok_or(ConfigurationError::MissingHandler(step_type))
    }

    /// Returns true if a handler is registered for the step type.
    #[must_use]
    pub fn contains(&self, step_type: StepType) -> bool {
        self.handlers.contains_key(&step_type)
    }

    /// Registered step types.
    pub fn step_types(&self) -> impl Iterator<Item = StepType> + '_ {
        self.handlers.keys().copied()
    }

    /// Dispatches one attempt to the handler for `ctx.step_type`.
    pub async fn execute(&self, ctx: &StepContext) -> Result<StepResult, HandlerError> {
        match self.get(ctx.step_type) {
            Ok(handler) => handler.execute(ctx).await,
            Err(defect) => Ok(StepResult::misconfigured(&defect)),
        }
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("step_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
