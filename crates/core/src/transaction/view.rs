//! Read-only field view over a transaction.
//!
//! Rules, step conditions and input mappings address transaction data by
//! name (`instructed_amount`, `creditor_account`, `metadata.channel`, ...).
//! The view resolves those names to typed values without exposing the
//! transaction for mutation.

use rust_decimal::Decimal;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::transaction::types::{Party, PaymentTransaction};

/// A scalar value resolved from a transaction or a step output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Fixed-point number.
    Decimal(Decimal),
    /// String value.
    Text(String),
    /// Boolean flag.
    Bool(bool),
}

impl FieldValue {
    /// Converts a JSON scalar into a field value.
    ///
    /// Numbers go through their textual form so that `0.1` stays exactly
    /// `0.1`. Null, arrays and objects resolve to `None`.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => decimal_from_number(n).map(Self::Decimal),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Returns the value as a decimal, parsing text if needed.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            Self::Text(s) => Decimal::from_str(s.trim()).ok(),
            Self::Bool(_) => None,
        }
    }

    /// Renders the value as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Decimal(d) => Value::String(d.to_string()),
            Self::Text(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Parses a JSON number as a decimal without passing through `f64`.
#[must_use]
pub fn decimal_from_number(n: &serde_json::Number) -> Option<Decimal> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Name-addressed view of a transaction.
#[derive(Debug, Clone, Copy)]
pub struct TransactionView<'a> {
    tx: &'a PaymentTransaction,
    rail_code: Option<&'a str>,
    product_code: Option<&'a str>,
}

impl<'a> TransactionView<'a> {
    /// Creates a view without rail/product codes.
    #[must_use]
    pub fn new(tx: &'a PaymentTransaction) -> Self {
        Self {
            tx,
            rail_code: None,
            product_code: None,
        }
    }

    /// Adds the bound rail and product codes (`rail_code`, `product_code`).
    #[must_use]
    pub fn with_codes(mut self, rail_code: Option<&'a str>, product_code: Option<&'a str>) -> Self {
        self.rail_code = rail_code;
        self.product_code = product_code;
        self
    }

    /// The underlying transaction.
    #[must_use]
    pub fn transaction(&self) -> &'a PaymentTransaction {
        self.tx
    }

    /// Resolves a field by name. Missing and null fields return `None`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let tx = self.tx;
        if let Some(key) = name.strip_prefix("metadata.") {
            return lookup_path(&tx.metadata, key).and_then(FieldValue::from_json);
        }
        if let Some(rest) = name.strip_prefix("debtor_") {
            return party_field(&tx.debtor, rest);
        }
        if let Some(rest) = name.strip_prefix("creditor_") {
            return party_field(&tx.creditor, rest);
        }
        let text = |s: &Option<String>| s.clone().map(FieldValue::Text);
        match name {
            "instructed_amount" | "amount" => Some(FieldValue::Decimal(tx.instructed.amount)),
            "currency" | "instructed_currency" => Some(FieldValue::Text(tx.instructed.currency.to_string())),
            "settlement_amount" => tx.settlement.map(|m| FieldValue::Decimal(m.amount)),
            "exchange_rate" => tx.exchange_rate.map(FieldValue::Decimal),
            "charges_amount" => Some(FieldValue::Decimal(tx.charges_amount)),
            "charge_bearer" => Some(FieldValue::Text(tx.charge_bearer.clone())),
            "transaction_ref" => Some(FieldValue::Text(tx.transaction_ref.clone())),
            "end_to_end_id" => text(&tx.end_to_end_id),
            "instruction_id" => text(&tx.instruction_id),
            "uetr" => text(&tx.uetr),
            "purpose_code" => text(&tx.purpose_code),
            "remittance_info" => text(&tx.remittance_info),
            "direction" => Some(FieldValue::Text(tx.direction.as_str().to_string())),
            "status" => Some(FieldValue::Text(tx.status.as_str().to_string())),
            "is_suspicious" => Some(FieldValue::Bool(tx.is_suspicious)),
            "requires_hitl" => Some(FieldValue::Bool(tx.requires_hitl)),
            "retry_count" => Some(FieldValue::Decimal(Decimal::from(tx.retry_count))),
            "rail_code" => self.rail_code.map(|c| FieldValue::Text(c.to_string())),
            "product_code" => self.product_code.map(|c| FieldValue::Text(c.to_string())),
            _ => None,
        }
    }

    /// Resolves a `result.*` path against the accumulated step outputs.
    #[must_use]
    pub fn result(&self, path: &str) -> Option<FieldValue> {
        lookup_path(&self.tx.context, path).and_then(FieldValue::from_json)
    }

    /// Projects a mapping path into JSON for a handler input.
    ///
    /// `payload.transaction` yields the whole transaction, `payload.<field>`
    /// a single field and `result.<path>` a (possibly structured) step
    /// output.
    #[must_use]
    pub fn project(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("result.") {
            return lookup_path(&self.tx.context, rest).cloned();
        }
        let field = path.strip_prefix("payload.").unwrap_or(path);
        if field == "transaction" {
            return serde_json::to_value(self.tx).ok();
        }
        self.field(field).map(|v| v.to_json())
    }
}

fn party_field(party: &Party, name: &str) -> Option<FieldValue> {
    match name {
        "name" => Some(FieldValue::Text(party.name.clone())),
        "account" => Some(FieldValue::Text(party.account.clone())),
        "routing_number" => party.routing_number.clone().map(FieldValue::Text),
        "country" => party.country.clone().map(FieldValue::Text),
        _ => None,
    }
}

/// Walks a dotted path through nested JSON objects.
#[must_use]
pub fn lookup_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(root, |node, key| node.get(key))
        .filter(|v| !v.is_null())
}
