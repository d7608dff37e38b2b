//! FedNow reference data.
//!
//! Seeds USD, the FedNow rail with its credit-transfer product, the
//! `FN-OUTBOUND-CT` workflow, the FedNow validation rules and the
//! US domestic instant routing rule.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use railflow_shared::error::{AppError, AppResult};
use railflow_shared::types::{
    Currency, CurrencyId, ProductId, RailId, RuleId, StepId, TransitionId, WorkflowId,
};
use rust_decimal_macros::dec;
use serde_json::json;
use tracing::info;

use railflow_core::reference::types::{CurrencyInfo, PaymentProduct, PaymentRail};
use railflow_core::rules::types::{RoutingRule, ValidationRule};
use railflow_core::transaction::types::PaymentDirection;
use railflow_core::workflow::types::{
    ExecutionStatus, OnErrorAction, StepType, WorkflowDefinition, WorkflowStep, WorkflowStepTransition,
};

use crate::in_memory::InMemoryStore;

/// Workflow code of the seeded outbound workflow.
pub const FEDNOW_OUTBOUND_WORKFLOW: &str = "FN-OUTBOUND-CT";

/// Step codes of `FN-OUTBOUND-CT`, in sequence.
pub const FEDNOW_STEPS: [&str; 7] = [
    "VALIDATE",
    "FRAUD_CHECK",
    "COMPLIANCE_CHECK",
    "TRANSFORM",
    "SUBMIT",
    "ACKNOWLEDGE",
    "NOTIFY",
];

/// Identifiers of the seeded rows.
#[derive(Debug, Clone)]
pub struct FedNowSeed {
    /// FedNow rail.
    pub rail_id: RailId,
    /// Credit-transfer product.
    pub product_id: ProductId,
    /// `FN-OUTBOUND-CT` version 1.
    pub workflow_id: WorkflowId,
    /// Step ids by step code.
    pub steps: HashMap<String, StepId>,
}

impl FedNowSeed {
    /// Id of a seeded step.
    ///
    /// # Errors
    ///
    /// `NotFound` for a code outside [`FEDNOW_STEPS`].
    pub fn step(&self, code: &str) -> AppResult<StepId> {
        self.steps
            .get(code)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("step {code}")))
    }
}

/// Seeds the FedNow reference data.
///
/// # Errors
///
/// `Conflict` if another default outbound FedNow workflow is present.
pub fn seed_fednow(store: &InMemoryStore) -> AppResult<FedNowSeed> {
    let launch = Utc.with_ymd_and_hms(2023, 7, 20, 0, 0, 0).single();

    store.put_currency(CurrencyInfo {
        id: CurrencyId::new(),
        code: Currency::Usd,
        name: "US Dollar".into(),
        decimal_places: 2,
        is_active: true,
    });

    let rail = PaymentRail {
        id: RailId::new(),
        rail_code: "FEDNOW".into(),
        rail_name: "FedNow Service".into(),
        rail_type: "INSTANT".into(),
        operating_hours: "24x7".into(),
        min_amount: Some(dec!(0.01)),
        max_amount: Some(dec!(500000.00)),
        supported_currencies: vec![Currency::Usd],
        is_active: true,
    };
    let rail_id = rail.id;
    store.put_rail(rail);

    let product = PaymentProduct {
        id: ProductId::new(),
        rail_id,
        product_code: "FN-CT".into(),
        product_name: "FedNow Credit Transfer".into(),
        is_active: true,
    };
    let product_id = product.id;
    store.put_product(product);

    let definition = WorkflowDefinition {
        id: WorkflowId::new(),
        workflow_code: FEDNOW_OUTBOUND_WORKFLOW.into(),
        workflow_name: "FedNow Outbound Credit Transfer".into(),
        version: 1,
        rail_id,
        product_id: Some(product_id),
        direction: PaymentDirection::Outbound,
        is_default: true,
        is_active: true,
        retry_policy: json!({
            "max_retries": 3,
            "retry_delay_seconds": 60,
            "exponential_backoff": true,
            "backoff_multiplier": 2,
            "max_delay_seconds": 300
        }),
        timeout_config: json!({
            "workflow_timeout_minutes": 60,
            "step_timeout_minutes": 5
        }),
        hitl_config: json!({
            "enabled": true,
            "auto_escalate_after_minutes": 30,
            "require_approval_for": ["SUSPICIOUS", "ERROR", "AMOUNT_THRESHOLD"],
            "amount_threshold": "100000.00"
        }),
        created_at: Utc::now(),
    };
    let workflow_id = definition.id;

    let steps = fednow_steps(workflow_id);
    let ids: HashMap<String, StepId> = steps.iter().map(|s| (s.step_code.clone(), s.id)).collect();
    let chain: Vec<StepId> = steps.iter().map(|s| s.id).collect();

    let mut transitions = Vec::with_capacity(chain.len() + 1);
    transitions.push(transition(workflow_id, None, chain.first().copied(), ExecutionStatus::Pending));
    for pair in chain.windows(2) {
        transitions.push(transition(workflow_id, Some(pair[0]), Some(pair[1]), ExecutionStatus::Success));
    }
    transitions.push(transition(workflow_id, chain.last().copied(), None, ExecutionStatus::Success));

    store.put_workflow(definition, steps, transitions)?;

    let rule = |code: &str,
                name: &str,
                category: &str,
                priority: i32,
                expression: serde_json::Value,
                error: Option<(&str, &str)>| {
        ValidationRule {
            id: RuleId::new(),
            rail_id: Some(rail_id),
            product_id: Some(product_id),
            rule_code: code.into(),
            rule_name: name.into(),
            rule_category: category.into(),
            rule_priority: priority,
            rule_expression: expression,
            error_code: error.map(|(c, _)| c.to_string()),
            error_message: error.map(|(_, m)| m.to_string()),
            is_blocking: error.is_some(),
            is_active: true,
            effective_from: launch,
            effective_to: None,
        }
    };
    for validation in [
        rule(
            "FN-AMOUNT-LIMIT",
            "FedNow Amount Limit Validation",
            "LIMIT",
            100,
            json!({"field": "instructed_amount", "operator": "BETWEEN", "min": "0.01", "max": "500000.00"}),
            Some(("AMOUNT_EXCEEDS_LIMIT", "Payment amount must be between $0.01 and $500,000.00")),
        ),
        rule(
            "FN-ACCOUNT-FORMAT",
            "Account Number Format Validation",
            "FORMAT",
            90,
            json!({"field": "creditor_account", "operator": "REGEX", "pattern": "^[0-9]{6,17}$"}),
            Some(("INVALID_ACCOUNT_FORMAT", "Account number must be 6-17 digits")),
        ),
        rule(
            "FN-ROUTING-NUMBER",
            "Routing Number Validation",
            "FORMAT",
            90,
            json!({"field": "creditor_routing_number", "operator": "REGEX", "pattern": "^[0-9]{9}$"}),
            Some(("INVALID_ROUTING_NUMBER", "Routing number must be 9 digits")),
        ),
        rule(
            "FN-BUSINESS-HOURS",
            "Business Hours Check",
            "BUSINESS",
            50,
            json!({"always": true}),
            None,
        ),
        rule(
            "FN-DUPLICATE-CHECK",
            "Duplicate Transaction Check",
            "BUSINESS",
            80,
            json!({"field": "end_to_end_id", "operator": "UNIQUE", "window_hours": 24}),
            Some(("DUPLICATE_TRANSACTION", "Duplicate end-to-end ID detected")),
        ),
    ] {
        store.put_validation_rule(validation);
    }

    store.put_routing_rule(RoutingRule {
        id: RuleId::new(),
        rule_code: "US-DOMESTIC-INSTANT".into(),
        rule_name: "US Domestic Instant Payment Routing".into(),
        rule_priority: 100,
        condition_country_from: Some("USA".into()),
        condition_country_to: Some("USA".into()),
        condition_currency: Some(Currency::Usd),
        condition_amount_min: Some(dec!(0.01)),
        condition_amount_max: Some(dec!(500000.00)),
        condition_expression: json!({"payment_type": "INSTANT", "urgency": "HIGH"}),
        target_rail_id: rail_id,
        target_product_id: Some(product_id),
        fallback_rail_id: None,
        is_active: true,
        effective_from: launch,
        effective_to: None,
    });

    info!(%rail_id, %workflow_id, "Seeded FedNow reference data");
    Ok(FedNowSeed {
        rail_id,
        product_id,
        workflow_id,
        steps: ids,
    })
}

fn fednow_steps(workflow_id: WorkflowId) -> Vec<WorkflowStep> {
    let step = |sequence: u32, code: &str, name: &str, step_type: StepType| WorkflowStep {
        id: StepId::new(),
        workflow_id,
        step_sequence: sequence,
        step_code: code.into(),
        step_name: name.into(),
        step_type,
        is_mandatory: true,
        is_async: false,
        is_hitl_checkpoint: false,
        condition_expression: None,
        skip_on_condition: false,
        on_error_action: OnErrorAction::Fail,
        max_retries: 0,
        retry_delay_seconds: 0,
        step_config: json!({}),
        input_mapping: json!({}),
        output_mapping: json!({}),
        hitl_triggers: Vec::new(),
        hitl_queue: None,
        is_active: true,
    };

    vec![
        WorkflowStep {
            step_config: json!({"validation_types": ["format", "business", "amount", "account"]}),
            input_mapping: json!({"transaction_data": "payload.transaction"}),
            output_mapping: json!({"validation_result": "result.validation"}),
            ..step(1, "VALIDATE", "Validate Payment Request", StepType::Validation)
        },
        WorkflowStep {
            is_hitl_checkpoint: true,
            on_error_action: OnErrorAction::Hitl,
            step_config: json!({"fraud_engine": "advanced_ml", "risk_threshold": "0.7"}),
            input_mapping: json!({
                "transaction": "payload.transaction",
                "debtor": "payload.debtor_name",
                "creditor": "payload.creditor_name"
            }),
            output_mapping: json!({"fraud_score": "result.fraud_score", "risk_level": "result.risk_level"}),
            hitl_triggers: vec!["SUSPICIOUS".into(), "HIGH_RISK".into()],
            ..step(2, "FRAUD_CHECK", "Fraud Detection Check", StepType::FraudCheck)
        },
        WorkflowStep {
            is_hitl_checkpoint: true,
            on_error_action: OnErrorAction::Hitl,
            max_retries: 2,
            retry_delay_seconds: 30,
            step_config: json!({"screening_lists": ["OFAC", "EU_Sanctions", "UN_Sanctions"], "match_threshold": "0.85"}),
            input_mapping: json!({"debtor": "payload.debtor_name", "creditor": "payload.creditor_name"}),
            output_mapping: json!({"screening_result": "result.screening", "matches": "result.matches"}),
            hitl_triggers: vec!["MATCH_FOUND".into(), "COMPLIANCE_REVIEW".into()],
            ..step(3, "COMPLIANCE_CHECK", "AML/Compliance Screening", StepType::ComplianceCheck)
        },
        WorkflowStep {
            max_retries: 1,
            retry_delay_seconds: 10,
            step_config: json!({
                "target_format": "ISO20022",
                "message_type": "pacs.008.001.08",
                "include_structured_remittance": true
            }),
            input_mapping: json!({"payment_data": "payload"}),
            output_mapping: json!({"iso_message": "result.iso20022_message"}),
            ..step(4, "TRANSFORM", "Transform to ISO20022", StepType::Transformation)
        },
        WorkflowStep {
            on_error_action: OnErrorAction::Retry,
            max_retries: 3,
            retry_delay_seconds: 60,
            step_config: json!({"endpoint": "credit_transfer", "timeout_seconds": 30, "require_acknowledgment": true}),
            input_mapping: json!({"iso_message": "result.iso20022_message"}),
            output_mapping: json!({"submission_response": "result.fednow_response", "message_id": "result.message_id"}),
            ..step(5, "SUBMIT", "Submit to FedNow", StepType::Submission)
        },
        WorkflowStep {
            is_async: true,
            on_error_action: OnErrorAction::Hitl,
            step_config: json!({"wait_for_response": true, "timeout_minutes": 2}),
            input_mapping: json!({"message_id": "result.message_id"}),
            output_mapping: json!({"acknowledgment": "result.acknowledgment", "status": "result.payment_status"}),
            hitl_triggers: vec!["TIMEOUT".into(), "NEGATIVE_ACK".into()],
            ..step(6, "ACKNOWLEDGE", "Process Acknowledgment", StepType::Acknowledgment)
        },
        WorkflowStep {
            is_mandatory: false,
            is_async: true,
            on_error_action: OnErrorAction::Skip,
            max_retries: 2,
            retry_delay_seconds: 30,
            step_config: json!({"notification_channels": ["email", "webhook", "sms"], "template": "payment_completed"}),
            input_mapping: json!({"transaction": "payload.transaction", "status": "result.payment_status"}),
            output_mapping: json!({"notification_sent": "result.notifications"}),
            ..step(7, "NOTIFY", "Send Notifications", StepType::Notification)
        },
    ]
}

fn transition(
    workflow_id: WorkflowId,
    from: Option<StepId>,
    to: Option<StepId>,
    trigger: ExecutionStatus,
) -> WorkflowStepTransition {
    WorkflowStepTransition {
        id: TransitionId::new(),
        workflow_id,
        from_step_id: from,
        to_step_id: to,
        trigger,
        priority: 1,
        condition_expression: None,
        is_active: true,
    }
}
