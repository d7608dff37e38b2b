//! Built-in VALIDATION step handler backed by the rule evaluator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::handler::{HandlerError, StepContext, StepHandler, StepResult};
use crate::clock::Clock;
use crate::ports::RuleSource;
use crate::rules::evaluator::{RecentValueLookup, RuleEvaluator};
use crate::rules::types::DEFAULT_RULE_ERROR_CODE;
use crate::workflow::types::StepType;

/// Runs the rail/product validation rules against the transaction.
///
/// A blocking failure becomes a business-rule violation carrying the rule's
/// error code; a rule that cannot be evaluated becomes a configuration
/// defect. Non-blocking failures travel as warnings. A recency lookup that
/// cannot be answered is a transient handler error.
pub struct RuleValidationHandler {
    rules: Arc<dyn RuleSource>,
    lookup: Arc<dyn RecentValueLookup>,
    clock: Arc<dyn Clock>,
}

impl RuleValidationHandler {
    /// Creates the handler.
    pub fn new(rules: Arc<dyn RuleSource>, lookup: Arc<dyn RecentValueLookup>, clock: Arc<dyn Clock>) -> Self {
        Self { rules, lookup, clock }
    }
}

#[async_trait]
impl StepHandler for RuleValidationHandler {
    fn step_type(&self) -> StepType {
        StepType::Validation
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, HandlerError> {
        let tx = &ctx.transaction;
        let rules = self.rules.list_validation_rules(tx.rail_id, tx.product_id).await?;
        let view = ctx.view();
        let report = RuleEvaluator::validate(&rules, &view, self.lookup.as_ref(), self.clock.now()).await?;

        let output = json!({
            "validation": {
                "passed": report.passed(),
                "outcomes": report.outcomes,
            }
        });

        let Some(failure) = report.blocking_failure() else {
            let mut result = StepResult::success(output);
            for warning in report.warnings() {
                info!(
                    transaction_id = %ctx.transaction_id,
                    rule_code = %warning.rule_code,
                    "Non-blocking rule failed"
                );
                let message = warning
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Rule {} failed", warning.rule_code));
                result = result.with_warning(warning.error_code.as_deref().unwrap_or(DEFAULT_RULE_ERROR_CODE), message);
            }
            return Ok(result);
        };

        if let Some(defect) = &failure.defect {
            warn!(
                transaction_id = %ctx.transaction_id,
                rule_code = %failure.rule_code,
                error = %defect,
                "Validation rule is misconfigured"
            );
            return Ok(StepResult::misconfigured(defect).with_output(output));
        }

        let code = failure
            .error_code
            .clone()
            .unwrap_or_else(|| DEFAULT_RULE_ERROR_CODE.to_string());
        let message = failure
            .error_message
            .clone()
            .unwrap_or_else(|| format!("Rule {} failed", failure.rule_code));
        info!(
            transaction_id = %ctx.transaction_id,
            rule_code = %failure.rule_code,
            error_code = %code,
            "Blocking validation rule failed"
        );
        Ok(StepResult::violation(code, message).with_output(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::executor::handler::FailureKind;
    use crate::rules::evaluator::fixtures::{LookupOutage, SeenValues, rule};
    use crate::rules::types::{RoutingRule, ValidationRule};
    use crate::transaction::types::{Party, PaymentTransaction};
    use crate::workflow::types::ExecutionStatus;
    use railflow_shared::error::AppResult;
    use railflow_shared::types::{Currency, EventId, Money, ProductId, RailId, StepId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FixedRules(Vec<ValidationRule>);

    #[async_trait]
    impl RuleSource for FixedRules {
        async fn list_validation_rules(
            &self,
            _rail_id: Option<RailId>,
            _product_id: Option<ProductId>,
        ) -> AppResult<Vec<ValidationRule>> {
            Ok(self.0.clone())
        }

        async fn list_routing_rules(&self) -> AppResult<Vec<RoutingRule>> {
            Ok(Vec::new())
        }
    }

    fn handler(rules: Vec<ValidationRule>) -> RuleValidationHandler {
        RuleValidationHandler::new(
            Arc::new(FixedRules(rules)),
            Arc::new(SeenValues::default()),
            Arc::new(ManualClock::default()),
        )
    }

    fn context(amount: Decimal) -> StepContext {
        let tx = PaymentTransaction::new("REF", Money::new(amount, Currency::Usd), Party::default(), Party::default());
        StepContext {
            transaction_id: tx.id,
            event_id: EventId::new(),
            idempotency_key: tx.idempotency_key("VALIDATE"),
            step_id: StepId::new(),
            step_code: "VALIDATE".into(),
            step_type: StepType::Validation,
            attempt: 0,
            input: json!({}),
            config: json!({}),
            transaction: tx,
            rail_code: Some("FEDNOW".into()),
            product_code: None,
        }
    }

    fn amount_limit() -> ValidationRule {
        rule(
            "FN-AMOUNT-LIMIT",
            1,
            json!({"field": "instructed_amount", "operator": "BETWEEN", "min": "0.01", "max": "500000.00"}),
            Some("AMOUNT_EXCEEDS_LIMIT"),
            true,
        )
    }

    #[tokio::test]
    async fn test_passing_payment_succeeds() {
        let result = handler(vec![amount_limit()]).execute(&context(dec!(25000))).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output["validation"]["passed"], json!(true));
    }

    #[tokio::test]
    async fn test_blocking_failure_is_violation_with_rule_code() {
        let result = handler(vec![amount_limit()]).execute(&context(dec!(600000))).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failure);
        let failure = result.failure.unwrap();
        assert_eq!(failure.code, "AMOUNT_EXCEEDS_LIMIT");
        assert_eq!(failure.kind, FailureKind::Violation);
    }

    #[tokio::test]
    async fn test_non_blocking_failure_becomes_warning() {
        let purpose = rule(
            "FN-PURPOSE",
            2,
            json!({"field": "purpose_code", "operator": "EQUALS", "value": "GDDS"}),
            Some("PURPOSE_CODE_MISSING"),
            false,
        );
        let result = handler(vec![amount_limit(), purpose]).execute(&context(dec!(25000))).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, "PURPOSE_CODE_MISSING");
        assert_eq!(result.warnings[0].message, "Rule FN-PURPOSE failed");
    }

    #[tokio::test]
    async fn test_lookup_outage_is_transient() {
        let unique = rule(
            "FN-DUPLICATE-CHECK",
            1,
            json!({"field": "transaction_ref", "operator": "UNIQUE", "window_hours": 24}),
            Some("DUPLICATE_TRANSACTION"),
            true,
        );
        let handler = RuleValidationHandler::new(
            Arc::new(FixedRules(vec![unique])),
            Arc::new(LookupOutage),
            Arc::new(ManualClock::default()),
        );
        let err = handler.execute(&context(dec!(10))).await.unwrap_err();
        assert!(matches!(err, HandlerError::Store(_)));
        let result = err.into_result();
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.failure_kind(), Some(FailureKind::Transient));
    }

    #[tokio::test]
    async fn test_unknown_operator_is_misconfiguration() {
        let broken = rule("FN-BROKEN", 1, json!({"field": "currency", "operator": "LIKE"}), None, false);
        let result = handler(vec![broken]).execute(&context(dec!(10))).await.unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::Misconfiguration));
        assert_eq!(result.failure.unwrap().code, "UNKNOWN_RULE_OPERATOR");
    }
}
