//! Validation and routing rule types.

use chrono::{DateTime, Duration, Utc};
use railflow_shared::types::{Currency, ProductId, RailId, RuleId};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::error::ConfigurationError;
use crate::transaction::view::{FieldValue, decimal_from_number};

/// Default error code for a failing rule that names none.
pub const DEFAULT_RULE_ERROR_CODE: &str = "VALIDATION_FAILED";
/// Longest look-back a UNIQUE rule may ask for (one year).
pub const MAX_UNIQUE_WINDOW_HOURS: i64 = 24 * 366;

/// A declarative validation predicate, optionally scoped to a rail/product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Unique identifier.
    pub id: RuleId,
    /// Rail scope; `None` applies to every rail.
    pub rail_id: Option<RailId>,
    /// Product scope; `None` applies to every product.
    pub product_id: Option<ProductId>,
    /// Stable rule code (e.g. `FN-AMOUNT-LIMIT`).
    pub rule_code: String,
    /// Display name.
    pub rule_name: String,
    /// Grouping (LIMIT, FORMAT, BUSINESS, ...).
    pub rule_category: String,
    /// Evaluation order, ascending.
    pub rule_priority: i32,
    /// Stored expression document.
    pub rule_expression: Value,
    /// Code reported on failure.
    pub error_code: Option<String>,
    /// Message reported on failure.
    pub error_message: Option<String>,
    /// A blocking failure halts validation.
    pub is_blocking: bool,
    /// Inactive rules are ignored.
    pub is_active: bool,
    /// Start of the validity window.
    pub effective_from: Option<DateTime<Utc>>,
    /// End of the validity window (exclusive).
    pub effective_to: Option<DateTime<Utc>>,
}

impl ValidationRule {
    /// Returns true if the rule is active and effective at `at`.
    #[must_use]
    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        self.is_active && within_window(self.effective_from, self.effective_to, at)
    }

    /// Returns true if the rule's scope covers the rail and product.
    #[must_use]
    pub fn applies_to(&self, rail_id: Option<RailId>, product_id: Option<ProductId>) -> bool {
        let rail_ok = self.rail_id.is_none() || self.rail_id == rail_id;
        let product_ok = self.product_id.is_none() || self.product_id == product_id;
        rail_ok && product_ok
    }

    /// Error code reported when the rule fails.
    #[must_use]
    pub fn failure_code(&self) -> &str {
        self.error_code.as_deref().unwrap_or(DEFAULT_RULE_ERROR_CODE)
    }
}

pub(crate) fn within_window(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> bool {
    from.is_none_or(|from| from <= at) && to.is_none_or(|to| at < to)
}

/// Parsed form of a rule expression.
///
/// Stored documents look like
/// `{"field": "instructed_amount", "operator": "BETWEEN", "min": 0.01, "max": 500000}`
/// or `{"always": true}`.
#[derive(Debug, Clone)]
pub enum RuleExpression {
    /// Tautology.
    Always,
    /// Field equals a scalar.
    Equals {
        /// Field name.
        field: String,
        /// Expected value.
        value: FieldValue,
    },
    /// Field differs from a scalar.
    NotEquals {
        /// Field name.
        field: String,
        /// Rejected value.
        value: FieldValue,
    },
    /// Inclusive decimal range.
    Between {
        /// Field name.
        field: String,
        /// Lower bound.
        min: Decimal,
        /// Upper bound.
        max: Decimal,
    },
    /// Whole-value regular expression match.
    Regex {
        /// Field name.
        field: String,
        /// Anchored pattern.
        pattern: Regex,
    },
    /// Value not seen on another transaction within a window.
    Unique {
        /// Field name.
        field: String,
        /// Look-back window.
        window: Duration,
    },
}

impl RuleExpression {
    /// Parses an expression document.
    ///
    /// # Errors
    ///
    /// `UnknownOperator` for an operator outside the supported set and
    /// `MalformedRule` for missing or ill-typed operands.
    pub fn parse(rule_code: &str, document: &Value) -> Result<Self, ConfigurationError> {
        let malformed = |reason: &str| ConfigurationError::MalformedRule {
            rule_code: rule_code.to_string(),
            reason: reason.to_string(),
        };
        let Value::Object(map) = document else {
            return Err(malformed("expression must be an object"));
        };
        if let Some(always) = map.get("always") {
            return match always {
                Value::Bool(true) => Ok(Self::Always),
                _ => Err(malformed("`always` must be true")),
            };
        }
        let field = map
            .get("field")
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| malformed("missing `field`"))?
            .to_string();
        let operator = map
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing `operator`"))?;

        match operator.to_uppercase().as_str() {
            "EQUALS" | "EQ" => Ok(Self::Equals {
                field,
                value: map
                    .get("value")
                    .and_then(FieldValue::from_json)
                    .ok_or_else(|| malformed("EQUALS needs a scalar `value`"))?,
            }),
            "NOT_EQUALS" | "NE" => Ok(Self::NotEquals {
                field,
                value: map
                    .get("value")
                    .and_then(FieldValue::from_json)
                    .ok_or_else(|| malformed("NOT_EQUALS needs a scalar `value`"))?,
            }),
            "BETWEEN" => {
                let bound = |key: &str| match map.get(key) {
                    Some(Value::Number(n)) => decimal_from_number(n),
                    Some(Value::String(s)) => s.trim().parse::<Decimal>().ok(),
                    _ => None,
                };
                let min = bound("min").ok_or_else(|| malformed("BETWEEN needs a decimal `min`"))?;
                let max = bound("max").ok_or_else(|| malformed("BETWEEN needs a decimal `max`"))?;
                if min > max {
                    return Err(malformed("BETWEEN `min` exceeds `max`"));
                }
                Ok(Self::Between { field, min, max })
            }
            "REGEX" => {
                let source = map
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("REGEX needs a `pattern`"))?;
                // anchors inside the source bind to single alternation branches
                let pattern = Regex::new(&format!("^(?:{source})$")).map_err(|e| malformed(&e.to_string()))?;
                Ok(Self::Regex { field, pattern })
            }
            "UNIQUE" => {
                let window = map
                    .get("window_hours")
                    .and_then(Value::as_i64)
                    .filter(|h| (1..=MAX_UNIQUE_WINDOW_HOURS).contains(h))
                    .and_then(Duration::try_hours)
                    .ok_or_else(|| {
                        malformed(&format!("UNIQUE needs a `window_hours` between 1 and {MAX_UNIQUE_WINDOW_HOURS}"))
                    })?;
                Ok(Self::Unique { field, window })
            }
            _ => Err(ConfigurationError::UnknownOperator {
                rule_code: rule_code.to_string(),
                operator: operator.to_string(),
            }),
        }
    }
}

/// Selects a rail/product for transactions that arrive without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Unique identifier.
    pub id: RuleId,
    /// Stable rule code.
    pub rule_code: String,
    /// Display name.
    pub rule_name: String,
    /// Evaluation order, ascending.
    pub rule_priority: i32,
    /// Debtor country (ISO alpha-3).
    pub condition_country_from: Option<String>,
    /// Creditor country (ISO alpha-3).
    pub condition_country_to: Option<String>,
    /// Instructed currency.
    pub condition_currency: Option<Currency>,
    /// Minimum instructed amount (inclusive).
    pub condition_amount_min: Option<Decimal>,
    /// Maximum instructed amount (inclusive).
    pub condition_amount_max: Option<Decimal>,
    /// Extra equality conditions against transaction metadata.
    pub condition_expression: Value,
    /// Rail selected on match.
    pub target_rail_id: RailId,
    /// Product selected on match.
    pub target_product_id: Option<ProductId>,
    /// Rail used when the target is unavailable.
    pub fallback_rail_id: Option<RailId>,
    /// Inactive rules are ignored.
    pub is_active: bool,
    /// Start of the validity window.
    pub effective_from: Option<DateTime<Utc>>,
    /// End of the validity window (exclusive).
    pub effective_to: Option<DateTime<Utc>>,
}

impl RoutingRule {
    /// Returns true if the rule is active and effective at `at`.
    #[must_use]
    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        self.is_active && within_window(self.effective_from, self.effective_to, at)
    }
}
