//! Payment workflow engine for Railflow.
//!
//! This crate contains the engine with ZERO storage or transport dependencies.
//! Everything it reads or writes goes through the traits in [`ports`].
//!
//! # Modules
//!
//! - `rules` - Rule Evaluator and rail routing
//! - `executor` - Step Executor Registry
//! - `workflow` - Workflow graphs and the Transition Resolver
//! - `retry` - Retry/Timeout Controller
//! - `hitl` - HITL Escalation Manager
//! - `engine` - Workflow Orchestrator
//! - `transaction` - Payment transactions and their status machine
//! - `audit` - Process and error logs
//! - `reference` - Rails, products and currencies
//! - `ports` - Collaborator contracts
//! - `clock` - Time source

pub mod audit;
pub mod clock;
pub mod engine;
pub mod executor;
pub mod hitl;
pub mod ports;
pub mod reference;
pub mod retry;
pub mod rules;
pub mod transaction;
pub mod workflow;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Delivery, EngineError, EngineResult, Orchestrator, Progress, WorkerPool};
pub use ports::Collaborators;
