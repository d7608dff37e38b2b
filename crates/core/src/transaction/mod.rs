//! Payment transactions and their status lifecycle.
//!
//! # Modules
//!
//! - `types` - Transaction, status machine, parties and patches
//! - `view` - Name-addressed field view used by rules and conditions

pub mod types;
pub mod view;

#[cfg(test)]
mod status_props;

pub use types::{
    AwaitingStep, Party, PaymentDirection, PaymentTransaction, TransactionPatch, TransactionStatus,
};
pub use view::{FieldValue, TransactionView};
