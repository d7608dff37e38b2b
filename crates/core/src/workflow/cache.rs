//! Workflow graph caching using Moka.
//!
//! Workflow versions are immutable once transactions reference them, so a
//! loaded graph can be shared by every run of that version.

use moka::future::Cache;
use railflow_shared::types::WorkflowId;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::engine::error::{EngineError, EngineResult};
use crate::ports::WorkflowSource;
use crate::workflow::graph::WorkflowGraph;

/// Default cache capacity (number of workflow versions).
const DEFAULT_CACHE_CAPACITY: u64 = 256;

/// Default time-to-live for cache entries (1 hour).
const DEFAULT_TTL_SECS: u64 = 3600;

/// Cache of validated workflow graphs keyed by workflow version.
#[derive(Clone)]
pub struct GraphCache {
    cache: Cache<WorkflowId, Arc<WorkflowGraph>>,
}

impl GraphCache {
    /// Creates a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CACHE_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates a cache with custom capacity and time-to-live.
    #[must_use]
    pub fn with_config(max_capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { cache }
    }

    /// Returns the graph for `id`, loading and validating it on a miss.
    ///
    /// Configuration defects are not cached; every load retries them.
    pub async fn get_or_load(
        &self,
        source: &dyn WorkflowSource,
        id: WorkflowId,
    ) -> EngineResult<Arc<WorkflowGraph>> {
        if let Some(graph) = self.cache.get(&id).await {
            return Ok(graph);
        }

        let definition = source
            .get_workflow_definition(id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(id))?;
        let steps = source.list_steps(id).await?;
        let transitions = source.list_transitions(id).await?;
        let graph = Arc::new(WorkflowGraph::load(definition, steps, transitions)?);

        debug!(workflow_id = %id, steps = graph.steps().count(), "Loaded workflow graph");
        self.cache.insert(id, Arc::clone(&graph)).await;
        Ok(graph)
    }

    /// Drops a cached graph.
    pub async fn invalidate(&self, id: WorkflowId) {
        self.cache.invalidate(&id).await;
    }

    /// Returns the number of entries currently in the cache.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending cache maintenance tasks.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::fixtures::{definition, edge, step};
    use crate::workflow::types::{ExecutionStatus, StepType, WorkflowDefinition, WorkflowStep, WorkflowStepTransition};
    use async_trait::async_trait;
    use railflow_shared::error::AppResult;
    use railflow_shared::types::{ProductId, RailId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::transaction::types::PaymentDirection;

    struct CountingSource {
        definition: WorkflowDefinition,
        steps: Vec<WorkflowStep>,
        transitions: Vec<WorkflowStepTransition>,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowSource for CountingSource {
        async fn get_workflow_definition(&self, id: WorkflowId) -> AppResult<Option<WorkflowDefinition>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok((id == self.definition.id).then(|| self.definition.clone()))
        }

        async fn list_steps(&self, _workflow_id: WorkflowId) -> AppResult<Vec<WorkflowStep>> {
            Ok(self.steps.clone())
        }

        async fn list_transitions(&self, _workflow_id: WorkflowId) -> AppResult<Vec<WorkflowStepTransition>> {
            Ok(self.transitions.clone())
        }

        async fn find_default_workflow(
            &self,
            _rail_id: RailId,
            _product_id: Option<ProductId>,
            _direction: PaymentDirection,
        ) -> AppResult<Option<WorkflowDefinition>> {
            Ok(None)
        }
    }

    fn source() -> CountingSource {
        let definition = definition();
        let a = step(definition.id, 1, "VALIDATE", StepType::Validation);
        let transitions = vec![
            edge(definition.id, None, Some(a.id), ExecutionStatus::Pending, 1),
            edge(definition.id, Some(a.id), None, ExecutionStatus::Success, 1),
        ];
        CountingSource {
            definition,
            steps: vec![a],
            transitions,
            loads: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_second_get_is_served_from_cache() {
        let source = source();
        let cache = GraphCache::new();
        let id = source.definition.id;

        let first = cache.get_or_load(&source, id).await.unwrap();
        let second = cache.get_or_load(&source, id).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        cache.invalidate(id).await;
        cache.get_or_load(&source, id).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let source = source();
        let cache = GraphCache::new();
        let err = cache.get_or_load(&source, WorkflowId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn test_configuration_defects_are_not_cached() {
        let mut source = source();
        source.transitions.clear();
        let cache = GraphCache::new();
        let id = source.definition.id;

        for _ in 0..2 {
            let err = cache.get_or_load(&source, id).await.unwrap_err();
            assert!(matches!(err, EngineError::Configuration(_)));
        }
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
