//! Rail/product routing.

use chrono::{DateTime, Utc};
use railflow_shared::types::{ProductId, RailId, RuleId};
use serde_json::Value;

use crate::rules::types::RoutingRule;
use crate::transaction::view::{FieldValue, TransactionView};

/// Rail and product selected for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Rule that matched.
    pub rule_id: RuleId,
    /// Selected rail.
    pub rail_id: RailId,
    /// Selected product.
    pub product_id: Option<ProductId>,
    /// True when the target rail was unavailable and the fallback was used.
    pub used_fallback: bool,
}

/// Stateless routing engine.
pub struct RoutingEngine;

impl RoutingEngine {
    /// Returns true if every condition of `rule` holds for the transaction.
    #[must_use]
    pub fn matches(rule: &RoutingRule, view: &TransactionView<'_>) -> bool {
        let tx = view.transaction();
        let country_ok = |condition: &Option<String>, actual: &Option<String>| {
            condition
                .as_deref()
                .is_none_or(|code| actual.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(code)))
        };
        let amount = tx.instructed.amount;

        country_ok(&rule.condition_country_from, &tx.debtor.country)
            && country_ok(&rule.condition_country_to, &tx.creditor.country)
            && rule.condition_currency.is_none_or(|c| c == tx.instructed.currency)
            && rule.condition_amount_min.is_none_or(|min| amount >= min)
            && rule.condition_amount_max.is_none_or(|max| amount <= max)
            && expression_holds(&rule.condition_expression, view)
    }

    /// Picks the first matching effective rule in priority order.
    ///
    /// When the target rail is unavailable the rule's fallback rail is
    /// used; a rule with neither available is skipped.
    pub fn route(
        rules: &[RoutingRule],
        view: &TransactionView<'_>,
        now: DateTime<Utc>,
        rail_available: impl Fn(RailId) -> bool,
    ) -> Option<RoutingDecision> {
        let mut candidates: Vec<_> = rules.iter().filter(|r| r.is_effective(now)).collect();
        candidates.sort_by(|a, b| {
            a.rule_priority
                .cmp(&b.rule_priority)
                .then_with(|| a.rule_code.cmp(&b.rule_code))
        });

        candidates
            .into_iter()
            .filter(|rule| Self::matches(rule, view))
            .find_map(|rule| {
                if rail_available(rule.target_rail_id) {
                    Some(RoutingDecision {
                        rule_id: rule.id,
                        rail_id: rule.target_rail_id,
                        product_id: rule.target_product_id,
                        used_fallback: false,
                    })
                } else {
                    rule.fallback_rail_id
                        .filter(|fallback| rail_available(*fallback))
                        .map(|fallback| RoutingDecision {
                            rule_id: rule.id,
                            rail_id: fallback,
                            product_id: None,
                            used_fallback: true,
                        })
                }
            })
    }
}

/// `{"key": scalar, ...}` equality conditions against transaction fields,
/// falling back to `metadata.<key>`.
fn expression_holds(expression: &Value, view: &TransactionView<'_>) -> bool {
    let Value::Object(conditions) = expression else {
        return expression.is_null();
    };
    conditions.iter().all(|(key, expected)| {
        let Some(expected) = FieldValue::from_json(expected) else {
            return false;
        };
        view.field(key)
            .or_else(|| view.field(&format!("metadata.{key}")))
            .is_some_and(|actual| actual == expected || actual.to_string() == expected.to_string())
    })
}
