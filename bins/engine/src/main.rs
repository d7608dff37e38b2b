//! Railflow engine runner.
//!
//! Seeds FedNow reference data into the in-memory store, pushes a batch of
//! demo payments through the worker pool, then keeps sweeping for HITL
//! escalations and timeouts until interrupted.

mod simulated;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use railflow_core::engine::Delivery;
use railflow_core::ports::Collaborators;
use railflow_core::transaction::types::{Party, PaymentTransaction};
use railflow_core::{Orchestrator, Progress, SystemClock, WorkerPool};
use railflow_shared::types::{Currency, Money, StepId, TransactionId};
use railflow_shared::{AppConfig, LoggingConfig};
use railflow_store::{InMemoryStore, seed_fednow};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.logging);

    let store = Arc::new(InMemoryStore::new());
    let seed = seed_fednow(&store)?;
    let step_codes: HashMap<StepId, String> = seed.steps.iter().map(|(code, id)| (*id, code.clone())).collect();

    let orchestrator = Arc::new(Orchestrator::new(
        config.engine.clone(),
        Collaborators::from_shared(Arc::clone(&store)),
        simulated::registry(),
        Arc::new(SystemClock),
    ));
    info!(
        workers = config.engine.worker_pool_size,
        sweep_interval_secs = config.engine.sweep_interval_secs,
        "Engine ready"
    );

    let mut pool = WorkerPool::from_config(Arc::clone(&orchestrator));
    for (n, (amount, remittance)) in demo_batch().into_iter().enumerate() {
        match orchestrator.submit(demo_payment(n, amount, remittance)).await {
            Ok(tx) => pool.submit(tx.id).await?,
            Err(e) => warn!(%amount, error_code = %e.error_code(), error = %e, "Payment refused at intake"),
        }
    }

    while let Some((id, outcome)) = pool.join_next().await {
        match outcome {
            Ok(Progress::AwaitingCallback { step_id, fence }) => {
                deliver_callbacks(&orchestrator, &step_codes, id, step_id, fence).await;
            }
            Ok(Progress::RetryScheduled { attempt, retry_at, .. }) => {
                info!(transaction_id = %id, attempt, %retry_at, "Retry scheduled");
                pool.submit_at(id, retry_at);
            }
            Ok(progress) => info!(transaction_id = %id, ?progress, "Transaction settled"),
            // logged by the pool
            Err(_) => {}
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.engine.sweep_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = orchestrator.sweep().await {
                    error!(error = %e, "Sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.filter.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Plays the rail: answers every waiting step until the run stops waiting.
async fn deliver_callbacks(
    orchestrator: &Orchestrator,
    step_codes: &HashMap<StepId, String>,
    id: TransactionId,
    mut step_id: StepId,
    mut fence: u64,
) {
    loop {
        let step_code = step_codes.get(&step_id).map_or("", String::as_str);
        match orchestrator
            .deliver_outcome(id, fence, simulated::callback_for(step_code))
            .await
        {
            Ok(Delivery::Applied(Progress::AwaitingCallback {
                step_id: next,
                fence: next_fence,
            })) => {
                step_id = next;
                fence = next_fence;
            }
            Ok(Delivery::Applied(progress)) => {
                info!(transaction_id = %id, ?progress, "Transaction settled");
                return;
            }
            Ok(Delivery::Discarded) => {
                warn!(transaction_id = %id, fence, "Callback discarded");
                return;
            }
            Err(e) => {
                error!(transaction_id = %id, error = %e, "Callback failed");
                return;
            }
        }
    }
}

/// Amounts and remittance lines covering the common paths: straight
/// through, approval threshold, unroutable amount and fraud review.
fn demo_batch() -> Vec<(Decimal, Option<&'static str>)> {
    vec![
        (dec!(25000.00), Some("Invoice 2025-0113")),
        (dec!(1250.75), None),
        (dec!(480000.00), Some("Quarterly settlement")),
        (dec!(600000.00), Some("Plant acquisition")),
        (dec!(250000.00), Some("Equipment purchase")),
        (dec!(9800.00), Some("Crypto exchange top-up")),
    ]
}

fn demo_payment(n: usize, amount: Decimal, remittance: Option<&str>) -> PaymentTransaction {
    let party = |name: &str, account: &str| Party {
        name: name.into(),
        account: account.into(),
        routing_number: Some("021000021".into()),
        country: Some("USA".into()),
    };
    let reference = format!("DEMO-{n:04}");
    let mut tx = PaymentTransaction::new(
        reference.clone(),
        Money::new(amount, Currency::Usd),
        party("Acme Corp", "987654321"),
        party("Globex LLC", "123456789012"),
    )
    .with_end_to_end_id(format!("E2E-{reference}-{}", TransactionId::new()));
    tx.remittance_info = remittance.map(str::to_string);
    tx.metadata = json!({"payment_type": "INSTANT", "urgency": "HIGH"});
    tx
}
