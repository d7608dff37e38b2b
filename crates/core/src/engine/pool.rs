//! Bounded pool of concurrent advancements.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use railflow_shared::types::TransactionId;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

use super::error::{EngineError, EngineResult};
use super::orchestrator::{Orchestrator, Progress};

/// Outcome of one pooled advancement.
pub type PoolOutcome = (TransactionId, EngineResult<Progress>);

/// Advances many transactions concurrently, at most `size` at a time.
///
/// Different transactions run in parallel; the orchestrator's per-transaction
/// lock serializes work on the same one.
pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<PoolOutcome>,
}

impl WorkerPool {
    /// Creates a pool with `size` workers (at least one).
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, size: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Creates a pool sized by `worker_pool_size`.
    #[must_use]
    pub fn from_config(orchestrator: Arc<Orchestrator>) -> Self {
        let size = orchestrator.config().worker_pool_size;
        Self::new(orchestrator, size)
    }

    /// Schedules an advancement, waiting for a free worker.
    ///
    /// # Errors
    ///
    /// `Concurrency` if the pool has been closed.
    pub async fn submit(&mut self, id: TransactionId) -> EngineResult<()> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Concurrency("worker pool closed".into()))?;
        let orchestrator = Arc::clone(&self.orchestrator);
        self.tasks.spawn(async move {
            let outcome = orchestrator.advance(id).await;
            drop(permit);
            (id, outcome)
        });
        Ok(())
    }

    /// Schedules an advancement that starts once the engine clock reaches
    /// `at`. The wait holds neither a worker nor the transaction lock.
    pub fn submit_at(&mut self, id: TransactionId, at: DateTime<Utc>) {
        let permits = Arc::clone(&self.permits);
        let orchestrator = Arc::clone(&self.orchestrator);
        self.tasks.spawn(async move {
            orchestrator.wait_until(at).await;
            let Ok(_permit) = permits.acquire_owned().await else {
                return (id, Err(EngineError::Concurrency("worker pool closed".into())));
            };
            let outcome = orchestrator.advance(id).await;
            (id, outcome)
        });
    }

    /// Waits for the next finished advancement.
    ///
    /// Returns `None` once nothing is in flight. Panicked workers are logged
    /// and skipped.
    pub async fn join_next(&mut self) -> Option<PoolOutcome> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let (id, Err(e)) = &outcome {
                        warn!(transaction_id = %id, error = %e, code = %e.error_code(), "Advancement failed");
                    }
                    return Some(outcome);
                }
                Err(e) => error!(error = %e, "Worker task aborted"),
            }
        }
        None
    }

    /// Waits for everything in flight.
    pub async fn drain(&mut self) -> Vec<PoolOutcome> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(outcome) = self.join_next().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Number of advancements not yet joined.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}
