//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Workflow engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workflow engine configuration.
///
/// A snapshot of this struct is handed to every workflow run; the engine
/// never reads configuration from ambient state.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of transactions advanced concurrently.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Interval between HITL escalation / timeout sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Queue used when neither the step nor the workflow names one.
    #[serde(default = "default_hitl_queue")]
    pub default_hitl_queue: String,
    /// Queue that receives automatically escalated interventions.
    #[serde(default = "default_supervisory_queue")]
    pub supervisory_queue: String,
    /// Maximum number of workflow graphs kept in memory.
    #[serde(default = "default_graph_cache_capacity")]
    pub graph_cache_capacity: u64,
    /// Time-to-live for cached workflow graphs.
    #[serde(default = "default_graph_cache_ttl_secs")]
    pub graph_cache_ttl_secs: u64,
    /// Step timeout applied when a workflow has no `timeoutConfig`.
    #[serde(default = "default_step_timeout_minutes")]
    pub default_step_timeout_minutes: u64,
}

fn default_worker_pool_size() -> usize {
    8
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_hitl_queue() -> String {
    "DEFAULT".to_string()
}

fn default_supervisory_queue() -> String {
    "SUPERVISOR".to_string()
}

fn default_graph_cache_capacity() -> u64 {
    256
}

fn default_graph_cache_ttl_secs() -> u64 {
    3600
}

fn default_step_timeout_minutes() -> u64 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            sweep_interval_secs: default_sweep_interval_secs(),
            default_hitl_queue: default_hitl_queue(),
            supervisory_queue: default_supervisory_queue(),
            graph_cache_capacity: default_graph_cache_capacity(),
            graph_cache_ttl_secs: default_graph_cache_ttl_secs(),
            default_step_timeout_minutes: default_step_timeout_minutes(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "railflow=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("RAILFLOW").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
