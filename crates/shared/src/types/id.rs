//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `StepId` where a `WorkflowId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(RailId, "Unique identifier for a payment rail.");
typed_id!(ProductId, "Unique identifier for a payment product.");
typed_id!(CurrencyId, "Unique identifier for a currency.");
typed_id!(WorkflowId, "Unique identifier for a workflow definition version.");
typed_id!(StepId, "Unique identifier for a workflow step.");
typed_id!(TransitionId, "Unique identifier for a workflow step transition.");
typed_id!(TransactionId, "Unique identifier for a payment transaction.");
typed_id!(RuleId, "Unique identifier for a validation or routing rule.");
typed_id!(ProcessLogId, "Unique identifier for a process log entry.");
typed_id!(ErrorLogId, "Unique identifier for an error log entry.");
typed_id!(EventId, "Unique identifier for a process event.");
typed_id!(InterventionId, "Unique identifier for a HITL intervention.");
typed_id!(AuditTrailId, "Unique identifier for a HITL audit trail entry.");
