//! Strict schemas for the workflow policy documents.
//!
//! `retryPolicy`, `timeoutConfig` and `hitlConfig` are stored as free-form
//! JSON. They are parsed here once, when a workflow graph is loaded, and
//! any unknown key or out-of-range value rejects the whole workflow.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::engine::error::ConfigurationError;
use crate::transaction::view::decimal_from_number;

const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;
const DEFAULT_MAX_DELAY_SECONDS: u64 = 3600;
/// Upper bound for every minute-valued setting (one year).
pub const MAX_POLICY_MINUTES: u64 = 366 * 24 * 60;
/// Upper bound for `max_delay_seconds`.
pub const MAX_RETRY_DELAY_SECONDS: u64 = MAX_POLICY_MINUTES * 60;

/// Workflow-level retry policy.
///
/// The step supplies the retry budget and base delay; the policy supplies
/// the growth factor and the cap. `max_retries` and `retry_delay_seconds`
/// document the workflow's defaults for step authors and are not applied
/// to steps at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Workflow-wide default retry budget (informational, steps carry their own).
    pub max_retries: u32,
    /// Workflow-wide default base delay.
    pub retry_delay_seconds: u64,
    /// Multiplier applied per attempt; 1 when backoff is disabled.
    pub multiplier: u32,
    /// Upper bound on any single delay.
    pub max_delay_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay_seconds: 0,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay_seconds: DEFAULT_MAX_DELAY_SECONDS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetryPolicy {
    #[serde(default)]
    max_retries: u32,
    #[serde(default)]
    retry_delay_seconds: u64,
    #[serde(default = "default_true")]
    exponential_backoff: bool,
    #[serde(default)]
    backoff_multiplier: Option<u32>,
    #[serde(default)]
    max_delay_seconds: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl RetryPolicy {
    /// Parses a `retryPolicy` document. `null` or `{}` yields the defaults.
    pub fn from_json(value: &Value) -> Result<Self, ConfigurationError> {
        let Some(raw) = parse_document::<RawRetryPolicy>("retryPolicy", value)? else {
            return Ok(Self::default());
        };
        let multiplier = if raw.exponential_backoff {
            raw.backoff_multiplier.unwrap_or(DEFAULT_BACKOFF_MULTIPLIER)
        } else {
            1
        };
        if multiplier == 0 {
            return Err(ConfigurationError::InvalidPolicy {
                document: "retryPolicy",
                reason: "backoff_multiplier must be at least 1".to_string(),
            });
        }
        let max_delay_seconds = raw.max_delay_seconds.unwrap_or(DEFAULT_MAX_DELAY_SECONDS);
        if !(1..=MAX_RETRY_DELAY_SECONDS).contains(&max_delay_seconds) {
            return Err(ConfigurationError::InvalidPolicy {
                document: "retryPolicy",
                reason: format!("max_delay_seconds must be between 1 and {MAX_RETRY_DELAY_SECONDS}"),
            });
        }
        Ok(Self {
            max_retries: raw.max_retries,
            retry_delay_seconds: raw.retry_delay_seconds,
            multiplier,
            max_delay_seconds,
        })
    }
}

/// Workflow and step timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Whole-run budget measured from the start transition.
    #[serde(default)]
    pub workflow_timeout_minutes: Option<u64>,
    /// Per-attempt budget for a step.
    #[serde(default)]
    pub step_timeout_minutes: Option<u64>,
}

impl TimeoutConfig {
    /// Parses a `timeoutConfig` document. `null` or `{}` disables both limits.
    pub fn from_json(value: &Value) -> Result<Self, ConfigurationError> {
        let config = parse_document::<Self>("timeoutConfig", value)?.unwrap_or_default();
        check_minutes("timeoutConfig", "workflow_timeout_minutes", config.workflow_timeout_minutes)?;
        check_minutes("timeoutConfig", "step_timeout_minutes", config.step_timeout_minutes)?;
        Ok(config)
    }
}

/// Human-in-the-loop settings for a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HitlConfig {
    /// When false, `require_approval_for` and the amount threshold are ignored.
    pub enabled: bool,
    /// Age after which an unassigned intervention is escalated.
    pub auto_escalate_after_minutes: Option<u64>,
    /// When true, the workflow timeout does not fail a transaction while
    /// it waits on a human decision.
    pub pause_workflow_timeout: bool,
    /// Outcome labels that need approval at checkpoint steps.
    pub require_approval_for: Vec<String>,
    /// Amount at or above which a checkpoint needs approval.
    pub amount_threshold: Option<Decimal>,
    /// Queue for interventions when the step names none.
    pub queue: Option<String>,
    /// Queue receiving escalated interventions.
    pub escalation_queue: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHitlConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    auto_escalate_after_minutes: Option<u64>,
    #[serde(default)]
    pause_workflow_timeout: bool,
    #[serde(default)]
    require_approval_for: Vec<String>,
    #[serde(default)]
    amount_threshold: Option<Value>,
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    escalation_queue: Option<String>,
}

impl HitlConfig {
    /// Parses a `hitlConfig` document. `null` or `{}` disables HITL rules.
    pub fn from_json(value: &Value) -> Result<Self, ConfigurationError> {
        let Some(raw) = parse_document::<RawHitlConfig>("hitlConfig", value)? else {
            return Ok(Self::default());
        };
        let amount_threshold = match raw.amount_threshold {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(decimal_from_number(&n).ok_or_else(|| {
                ConfigurationError::InvalidPolicy {
                    document: "hitlConfig",
                    reason: format!("amount_threshold {n} is not a decimal"),
                }
            })?),
            Some(Value::String(s)) => Some(s.trim().parse::<Decimal>().map_err(|_| {
                ConfigurationError::InvalidPolicy {
                    document: "hitlConfig",
                    reason: format!("amount_threshold {s:?} is not a decimal"),
                }
            })?),
            Some(other) => {
                return Err(ConfigurationError::InvalidPolicy {
                    document: "hitlConfig",
                    reason: format!("amount_threshold must be a number, got {other}"),
                });
            }
        };
        if amount_threshold.is_some_and(|t| t.is_sign_negative()) {
            return Err(ConfigurationError::InvalidPolicy {
                document: "hitlConfig",
                reason: "amount_threshold must not be negative".to_string(),
            });
        }
        check_minutes("hitlConfig", "auto_escalate_after_minutes", raw.auto_escalate_after_minutes)?;
        Ok(Self {
            enabled: raw.enabled,
            auto_escalate_after_minutes: raw.auto_escalate_after_minutes,
            pause_workflow_timeout: raw.pause_workflow_timeout,
            require_approval_for: raw
                .require_approval_for
                .into_iter()
                .map(|label| label.to_uppercase())
                .collect(),
            amount_threshold,
            queue: raw.queue,
            escalation_queue: raw.escalation_queue,
        })
    }

    /// Returns true if `label` needs approval at a checkpoint.
    #[must_use]
    pub fn requires_approval_for(&self, label: &str) -> bool {
        self.enabled
            && self
                .require_approval_for
                .iter()
                .any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Returns true if `amount` reaches the approval threshold.
    #[must_use]
    pub fn exceeds_threshold(&self, amount: Decimal) -> bool {
        self.enabled && self.amount_threshold.is_some_and(|t| amount >= t)
    }
}

fn check_minutes(document: &'static str, key: &str, minutes: Option<u64>) -> Result<(), ConfigurationError> {
    match minutes {
        Some(m) if !(1..=MAX_POLICY_MINUTES).contains(&m) => Err(ConfigurationError::InvalidPolicy {
            document,
            reason: format!("{key} must be between 1 and {MAX_POLICY_MINUTES}"),
        }),
        _ => Ok(()),
    }
}

fn parse_document<T: serde::de::DeserializeOwned>(
    document: &'static str,
    value: &Value,
) -> Result<Option<T>, ConfigurationError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(_) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ConfigurationError::InvalidPolicy {
                document,
                reason: e.to_string(),
            }),
        other => Err(ConfigurationError::InvalidPolicy {
            document,
            reason: format!("expected an object, got {other}"),
        }),
    }
}
