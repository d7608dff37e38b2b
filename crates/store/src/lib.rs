//! Collaborator store for Railflow.
//!
//! This crate provides:
//! - An in-memory implementation of every engine collaborator trait
//! - FedNow reference data for development and testing

pub mod in_memory;
pub mod seed;

pub use in_memory::InMemoryStore;
pub use seed::{FEDNOW_OUTBOUND_WORKFLOW, FEDNOW_STEPS, FedNowSeed, seed_fednow};
