//! Read-only master data consumed by the engine.

pub mod types;

pub use types::{CurrencyInfo, PaymentProduct, PaymentRail};
