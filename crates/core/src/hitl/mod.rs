//! Human-in-the-loop interventions.

pub mod manager;
pub mod types;

pub use manager::{EscalationManager, RaiseRequest};
pub use types::{HitlAction, HitlAuditTrail, HitlContext, HitlDecision, HitlIntervention, SYSTEM_ACTOR};
