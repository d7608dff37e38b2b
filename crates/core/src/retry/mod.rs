//! Retry/Timeout Controller.
//!
//! Bounded retries with exponential backoff and per-attempt timeouts. The
//! orchestrator owns the retry counter; this module decides and measures.

pub mod backoff;
pub mod controller;

#[cfg(test)]
mod backoff_props;

pub use backoff::BackoffSchedule;
pub use controller::{RetryController, RetryDecision};
