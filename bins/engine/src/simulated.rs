//! Stand-in collaborators for running the FedNow workflow locally.
//!
//! The rail gateway and the notifier answer asynchronously; their outcomes
//! are delivered by the runner once a transaction reports it is waiting.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::json;

use railflow_core::executor::{HandlerError, StepContext, StepHandler, StepRegistry, StepResult};
use railflow_core::workflow::types::StepType;

/// Creditor names the sanctions screener reports as matches.
const WATCHLIST: [&str; 2] = ["BLOCKED TRADING LTD", "OFAC TEST ENTITY"];

/// Registry with a simulated handler for every non-validation step type of
/// the seeded workflow.
pub fn registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry.register(Arc::new(FraudScorer));
    registry.register(Arc::new(SanctionsScreener));
    registry.register(Arc::new(MessageTransformer));
    registry.register(Arc::new(RailGateway));
    registry.register(Arc::new(Deferred(StepType::Acknowledgment)));
    registry.register(Arc::new(Deferred(StepType::Notification)));
    registry
}

struct FraudScorer;

#[async_trait]
impl StepHandler for FraudScorer {
    fn step_type(&self) -> StepType {
        StepType::FraudCheck
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, HandlerError> {
        let tx = &ctx.transaction;
        let flagged = tx
            .remittance_info
            .as_deref()
            .is_some_and(|info| info.to_ascii_lowercase().contains("crypto"));
        if flagged {
            return Ok(StepResult::suspicious(
                "HIGH_RISK",
                json!({"fraud_score": 91, "risk_level": "HIGH"}),
            ));
        }
        let risk_level = if tx.instructed.amount >= dec!(100000) { "MEDIUM" } else { "LOW" };
        Ok(StepResult::success(json!({"fraud_score": 12, "risk_level": risk_level})))
    }
}

struct SanctionsScreener;

#[async_trait]
impl StepHandler for SanctionsScreener {
    fn step_type(&self) -> StepType {
        StepType::ComplianceCheck
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, HandlerError> {
        let creditor = ctx.transaction.creditor.name.to_ascii_uppercase();
        if let Some(hit) = WATCHLIST.iter().find(|name| creditor.contains(*name)) {
            return Ok(StepResult::suspicious(
                "MATCH_FOUND",
                json!({"screening": "HIT", "matches": [hit]}),
            ));
        }
        Ok(StepResult::success(json!({"screening": "CLEAR", "matches": []})))
    }
}

struct MessageTransformer;

#[async_trait]
impl StepHandler for MessageTransformer {
    fn step_type(&self) -> StepType {
        StepType::Transformation
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, HandlerError> {
        let tx = &ctx.transaction;
        let message = json!({
            "msg_type": "pacs.008.001.08",
            "end_to_end_id": tx.end_to_end_id,
            "amount": tx.instructed.amount.to_string(),
            "currency": tx.instructed.currency,
            "debtor": tx.debtor,
            "creditor": tx.creditor,
            "remittance_info": tx.remittance_info,
        });
        Ok(StepResult::success(json!({ "iso20022_message": message })))
    }
}

struct RailGateway;

#[async_trait]
impl StepHandler for RailGateway {
    fn step_type(&self) -> StepType {
        StepType::Submission
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, HandlerError> {
        // stable across retries of the same submission
        let message_id = format!("FN-{}", ctx.transaction_id);
        Ok(StepResult::success(json!({"fednow_response": "ACTC", "message_id": message_id})))
    }
}

/// Accepts the request; the outcome arrives later.
struct Deferred(StepType);

#[async_trait]
impl StepHandler for Deferred {
    fn step_type(&self) -> StepType {
        self.0
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<StepResult, HandlerError> {
        Ok(StepResult::pending())
    }
}

/// Outcome the simulated rail reports for a waiting step.
pub fn callback_for(step_code: &str) -> StepResult {
    match step_code {
        "ACKNOWLEDGE" => StepResult::success(json!({"acknowledgment": "ACCP", "payment_status": "ACSC"})),
        _ => StepResult::success(json!({"notifications": ["debtor", "creditor"]})),
    }
}
