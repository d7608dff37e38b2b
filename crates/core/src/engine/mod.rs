//! Workflow Orchestrator: drives transactions through their graphs.

pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod pool;
mod run;
pub mod snapshot;

pub use error::{ConfigurationError, EngineError, EngineResult};
pub use locks::TransactionLocks;
pub use orchestrator::{
    CURRENCY_NOT_SUPPORTED_CODE, Delivery, Journey, Orchestrator, Progress, RAIL_UNAVAILABLE_CODE, SweepReport,
};
pub use pool::{PoolOutcome, WorkerPool};
pub use run::{HITL_REJECTED_CODE, WORKFLOW_TIMEOUT_CODE};
pub use snapshot::RunSnapshot;
