//! Rail, product, currency and country reference data.

use railflow_shared::types::{Currency, CurrencyId, ProductId, RailId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An external payment network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRail {
    /// Unique identifier.
    pub id: RailId,
    /// Rail code (e.g. `FEDNOW`).
    pub rail_code: String,
    /// Display name.
    pub rail_name: String,
    /// Rail category (INSTANT, ACH, WIRE, ...).
    pub rail_type: String,
    /// Operating schedule (e.g. `24x7`).
    pub operating_hours: String,
    /// Smallest accepted amount.
    pub min_amount: Option<Decimal>,
    /// Largest accepted amount.
    pub max_amount: Option<Decimal>,
    /// Currencies the rail settles.
    pub supported_currencies: Vec<Currency>,
    /// Inactive rails accept no new work.
    pub is_active: bool,
}

impl PaymentRail {
    /// Returns true if the rail settles `currency`.
    #[must_use]
    pub fn supports(&self, currency: Currency) -> bool {
        self.supported_currencies.contains(&currency)
    }

    /// Returns true if the rail can take a payment in `currency` now.
    #[must_use]
    pub fn accepts(&self, currency: Currency) -> bool {
        self.is_active && self.supports(currency)
    }
}

/// A product offered on a rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProduct {
    /// Unique identifier.
    pub id: ProductId,
    /// Owning rail.
    pub rail_id: RailId,
    /// Product code (e.g. `FN-CT`).
    pub product_code: String,
    /// Display name.
    pub product_name: String,
    /// Inactive products accept no new work.
    pub is_active: bool,
}

/// ISO 4217 currency reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    /// Unique identifier.
    pub id: CurrencyId,
    /// ISO code.
    pub code: Currency,
    /// Display name.
    pub name: String,
    /// Minor units.
    pub decimal_places: u32,
    /// Inactive currencies accept no new work.
    pub is_active: bool,
}
