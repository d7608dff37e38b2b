//! Shared fixtures for the engine scenarios: a seeded store, a manual clock
//! and scripted step handlers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use railflow_core::clock::{Clock, ManualClock};
use railflow_core::engine::Orchestrator;
use railflow_core::executor::{HandlerError, StepContext, StepHandler, StepRegistry, StepResult};
use railflow_core::ports::{Collaborators, WorkflowSource};
use railflow_core::rules::RecentValueLookup;
use railflow_core::transaction::types::{Party, PaymentTransaction};
use railflow_core::workflow::types::{StepType, WorkflowDefinition};
use railflow_shared::EngineConfig;
use railflow_shared::types::{Currency, Money, TransactionId};
use railflow_shared::{AppError, AppResult};
use railflow_store::{FedNowSeed, InMemoryStore, seed_fednow};

/// Handler answering from a script, then with a fixed default.
pub struct Scripted {
    step_type: StepType,
    script: Mutex<VecDeque<StepResult>>,
    default: StepResult,
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl StepHandler for Scripted {
    fn step_type(&self) -> StepType {
        self.step_type
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, HandlerError> {
        self.calls.lock().unwrap().push(ctx.step_code.clone());
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.default.clone()))
    }
}

/// A seeded engine on a manual clock.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub seed: FedNowSeed,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<Orchestrator>,
    calls: Arc<Mutex<Vec<String>>>,
}

/// Scripted outcomes per step type; unscripted attempts use the defaults.
#[derive(Default)]
pub struct Script {
    results: HashMap<StepType, Vec<StepResult>>,
}

impl Script {
    pub fn then(mut self, step_type: StepType, result: StepResult) -> Self {
        self.results.entry(step_type).or_default().push(result);
        self
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 14, 0, 0).unwrap()
}

fn defaults() -> Vec<(StepType, StepResult)> {
    vec![
        (
            StepType::FraudCheck,
            StepResult::success(json!({"fraud_score": 12, "risk_level": "LOW"})),
        ),
        (
            StepType::ComplianceCheck,
            StepResult::success(json!({"screening": "CLEAR", "matches": []})),
        ),
        (
            StepType::Transformation,
            StepResult::success(json!({"iso20022_message": {"msg_type": "pacs.008.001.08"}})),
        ),
        (
            StepType::Submission,
            StepResult::success(json!({"fednow_response": "ACTC", "message_id": "FN20250303000001"})),
        ),
        (StepType::Acknowledgment, StepResult::pending()),
        (StepType::Notification, StepResult::pending()),
    ]
}

impl Harness {
    pub fn new() -> Self {
        Self::scripted(Script::default())
    }

    pub fn scripted(script: Script) -> Self {
        Self::build(script, |_| {})
    }

    /// Default handlers, with the recency lookup replaced.
    pub fn with_lookup(lookup: Arc<dyn RecentValueLookup>) -> Self {
        Self::build(Script::default(), |ports| ports.recent_values = lookup)
    }

    fn build(mut script: Script, customize: impl FnOnce(&mut Collaborators)) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let seed = seed_fednow(&store).unwrap();
        let clock = Arc::new(ManualClock::new(start_time()));
        let calls = Arc::new(Mutex::new(Vec::new()));

        let mut registry = StepRegistry::new();
        for (step_type, default) in defaults() {
            let scripted = script.results.remove(&step_type).unwrap_or_default();
            registry.register(Arc::new(Scripted {
                step_type,
                script: Mutex::new(scripted.into()),
                default,
                calls: Arc::clone(&calls),
            }));
        }

        let mut ports = Collaborators::from_shared(Arc::clone(&store));
        customize(&mut ports);
        let engine = Orchestrator::new(
            EngineConfig::default(),
            ports,
            registry,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Self {
            store,
            seed,
            clock,
            engine: Arc::new(engine),
            calls,
        }
    }

    /// Rewrites the seeded workflow definition. Call before the first
    /// advance; loaded graphs are cached.
    pub async fn reconfigure(&self, edit: impl FnOnce(&mut WorkflowDefinition)) {
        let id = self.seed.workflow_id;
        let mut definition = self.store.get_workflow_definition(id).await.unwrap().unwrap();
        edit(&mut definition);
        let steps = self.store.list_steps(id).await.unwrap();
        let transitions = self.store.list_transitions(id).await.unwrap();
        self.store.put_workflow(definition, steps, transitions).unwrap();
    }

    /// Step codes executed by scripted handlers, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, step_code: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == step_code).count()
    }

    /// Submits a routable domestic payment.
    pub async fn submit(&self, amount: Decimal) -> PaymentTransaction {
        self.engine.submit(payment(amount)).await.unwrap()
    }

    /// Submits a payment already bound to the FedNow workflow, bypassing
    /// routing limits.
    pub async fn submit_bound(&self, amount: Decimal) -> PaymentTransaction {
        let tx = payment(amount).on_workflow(self.seed.rail_id, Some(self.seed.product_id), self.seed.workflow_id);
        self.engine.submit(tx).await.unwrap()
    }
}

fn party(name: &str, account: &str) -> Party {
    Party {
        name: name.into(),
        account: account.into(),
        routing_number: Some("021000021".into()),
        country: Some("USA".into()),
    }
}

/// A US domestic instant payment with a fresh end-to-end id.
pub fn payment(amount: Decimal) -> PaymentTransaction {
    let reference = format!("TX-{}", uuid::Uuid::new_v4().simple());
    let mut tx = PaymentTransaction::new(
        reference.clone(),
        Money::new(amount, Currency::Usd),
        party("Acme Corp", "987654321"),
        party("Globex LLC", "123456789012"),
    )
    .with_end_to_end_id(format!("E2E-{reference}"));
    tx.metadata = json!({"payment_type": "INSTANT", "urgency": "HIGH"});
    tx
}

/// Recency lookup whose backing store is down.
pub struct LookupOutage;

#[async_trait]
impl RecentValueLookup for LookupOutage {
    async fn seen_since(
        &self,
        _field: &str,
        _value: &str,
        _since: DateTime<Utc>,
        _exclude: TransactionId,
    ) -> AppResult<bool> {
        Err(AppError::Storage("connection refused".into()))
    }
}
