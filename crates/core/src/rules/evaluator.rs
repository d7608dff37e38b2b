//! Rule evaluation.
//!
//! Evaluation is a function of the rule, the transaction view and the
//! answers of the recency lookup; nothing is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use railflow_shared::error::AppResult;
use railflow_shared::types::{ProductId, RailId, TransactionId};
use serde::Serialize;
use tracing::warn;

use crate::engine::error::ConfigurationError;
use crate::rules::types::{RuleExpression, ValidationRule};
use crate::transaction::view::{FieldValue, TransactionView};

/// Answers "has this value been seen recently" for UNIQUE rules.
#[async_trait]
pub trait RecentValueLookup: Send + Sync {
    /// Returns true if another transaction created at or after `since`
    /// carries `value` in `field`.
    async fn seen_since(
        &self,
        field: &str,
        value: &str,
        since: DateTime<Utc>,
        exclude: TransactionId,
    ) -> AppResult<bool>;
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    /// Rule evaluated.
    pub rule_code: String,
    /// Whether the predicate held.
    pub passed: bool,
    /// Whether a failure halts validation.
    pub blocking: bool,
    /// Code reported on failure.
    pub error_code: Option<String>,
    /// Message reported on failure.
    pub error_message: Option<String>,
    /// Set when the rule could not be evaluated at all.
    #[serde(skip)]
    pub defect: Option<ConfigurationError>,
}

impl RuleOutcome {
    fn pass(rule: &ValidationRule) -> Self {
        Self {
            rule_code: rule.rule_code.clone(),
            passed: true,
            blocking: rule.is_blocking,
            error_code: None,
            error_message: None,
            defect: None,
        }
    }

    fn fail(rule: &ValidationRule) -> Self {
        Self {
            rule_code: rule.rule_code.clone(),
            passed: false,
            blocking: rule.is_blocking,
            error_code: Some(rule.failure_code().to_string()),
            error_message: rule.error_message.clone(),
            defect: None,
        }
    }

    /// Unevaluable rules fail closed: blocking, with the defect attached.
    fn misconfigured(rule: &ValidationRule, defect: ConfigurationError) -> Self {
        Self {
            rule_code: rule.rule_code.clone(),
            passed: false,
            blocking: true,
            error_code: Some(defect.error_code().to_string()),
            error_message: Some(defect.to_string()),
            defect: Some(defect),
        }
    }

    /// Returns true if the rule could not be evaluated.
    #[must_use]
    pub fn is_misconfigured(&self) -> bool {
        self.defect.is_some()
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Outcomes in evaluation order, ending at the first blocking failure.
    pub outcomes: Vec<RuleOutcome>,
}

impl ValidationReport {
    /// Returns true if no blocking rule failed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.blocking_failure().is_none()
    }

    /// The blocking failure that halted validation, if any.
    #[must_use]
    pub fn blocking_failure(&self) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| !o.passed && o.blocking)
    }

    /// Non-blocking failures, recorded but not halting.
    pub fn warnings(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| !o.passed && !o.blocking)
    }
}

/// Stateless rule evaluator.
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Evaluates a single rule.
    ///
    /// Unknown operators and malformed expressions never pass.
    ///
    /// # Errors
    ///
    /// A failed recency lookup is returned as is; the rule has no verdict.
    pub async fn evaluate(
        rule: &ValidationRule,
        view: &TransactionView<'_>,
        lookup: &dyn RecentValueLookup,
        now: DateTime<Utc>,
    ) -> AppResult<RuleOutcome> {
        let expression = match RuleExpression::parse(&rule.rule_code, &rule.rule_expression) {
            Ok(expression) => expression,
            Err(defect) => {
                warn!(rule_code = %rule.rule_code, error = %defect, "Rule cannot be evaluated");
                return Ok(RuleOutcome::misconfigured(rule, defect));
            }
        };

        let passed = match &expression {
            RuleExpression::Always => true,
            RuleExpression::Equals { field, value } => {
                view.field(field).is_some_and(|actual| same_value(&actual, value))
            }
            RuleExpression::NotEquals { field, value } => {
                view.field(field).is_some_and(|actual| !same_value(&actual, value))
            }
            RuleExpression::Between { field, min, max } => view
                .field(field)
                .and_then(|actual| actual.as_decimal())
                .is_some_and(|amount| *min <= amount && amount <= *max),
            RuleExpression::Regex { field, pattern } => view
                .field(field)
                .is_some_and(|actual| pattern.is_match(&actual.to_string())),
            RuleExpression::Unique { field, window } => match view.field(field) {
                // nothing to be a duplicate of
                None => true,
                Some(actual) => {
                    let tx = view.transaction();
                    let since = now.checked_sub_signed(*window).unwrap_or(DateTime::<Utc>::MIN_UTC);
                    match lookup.seen_since(field, &actual.to_string(), since, tx.id).await {
                        Ok(seen) => !seen,
                        Err(e) => {
                            warn!(rule_code = %rule.rule_code, error = %e, "Recency lookup failed");
                            return Err(e);
                        }
                    }
                }
            },
        };

        Ok(if passed {
            RuleOutcome::pass(rule)
        } else {
            RuleOutcome::fail(rule)
        })
    }

    /// Selects the rules that apply to a rail/product at `now`, in
    /// evaluation order (priority ascending, then rule code).
    #[must_use]
    pub fn applicable<'r>(
        rules: &'r [ValidationRule],
        rail_id: Option<RailId>,
        product_id: Option<ProductId>,
        now: DateTime<Utc>,
    ) -> Vec<&'r ValidationRule> {
        let mut selected: Vec<_> = rules
            .iter()
            .filter(|rule| rule.is_effective(now) && rule.applies_to(rail_id, product_id))
            .collect();
        selected.sort_by(|a, b| {
            a.rule_priority
                .cmp(&b.rule_priority)
                .then_with(|| a.rule_code.cmp(&b.rule_code))
        });
        selected
    }

    /// Runs every applicable rule, stopping at the first blocking failure.
    ///
    /// # Errors
    ///
    /// Recency lookup failures; see [`evaluate`](Self::evaluate).
    pub async fn validate(
        rules: &[ValidationRule],
        view: &TransactionView<'_>,
        lookup: &dyn RecentValueLookup,
        now: DateTime<Utc>,
    ) -> AppResult<ValidationReport> {
        let tx = view.transaction();
        let mut report = ValidationReport::default();
        for rule in Self::applicable(rules, tx.rail_id, tx.product_id, now) {
            let outcome = Self::evaluate(rule, view, lookup, now).await?;
            let halt = !outcome.passed && outcome.blocking;
            report.outcomes.push(outcome);
            if halt {
                break;
            }
        }
        Ok(report)
    }
}

fn same_value(actual: &FieldValue, expected: &FieldValue) -> bool {
    match (actual.as_decimal(), expected.as_decimal()) {
        (Some(a), Some(b)) => a == b,
        _ => actual.to_string() == expected.to_string(),
    }
}
