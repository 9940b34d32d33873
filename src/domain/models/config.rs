use serde::{Deserialize, Serialize};

use super::flow_type::FlowType;

/// Main configuration structure for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Claim/dispatch worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Recurring scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Workflow type definitions (task templates per flow type)
    #[serde(default)]
    pub flow_types: Vec<FlowType>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            worker: WorkerConfig::default(),
            scheduler: SchedulerConfig::default(),
            flow_types: vec![],
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".dynaflow/dynaflow.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Claim/dispatch worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Stable worker identity; generated from host + pid when unset
    #[serde(default)]
    pub processor_id: Option<String>,

    /// Seconds between claim passes
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum candidates pulled per claim pass
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: usize,

    /// Seconds a Running task may go without finishing before the reaper
    /// treats its claim as stale
    #[serde(default = "default_stale_task_secs")]
    pub stale_task_secs: u64,

    /// Seconds between cancellation-flag polls during task execution
    #[serde(default = "default_cancel_poll_secs")]
    pub cancel_poll_secs: u64,

    /// Seconds between per-tenant maintenance sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

const fn default_poll_interval_secs() -> u64 {
    5
}

const fn default_claim_batch_size() -> usize {
    10
}

const fn default_stale_task_secs() -> u64 {
    1800
}

const fn default_cancel_poll_secs() -> u64 {
    5
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            processor_id: None,
            poll_interval_secs: default_poll_interval_secs(),
            claim_batch_size: default_claim_batch_size(),
            stale_task_secs: default_stale_task_secs(),
            cancel_poll_secs: default_cancel_poll_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Recurring scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Seconds between scheduler passes
    #[serde(default = "default_scheduler_poll_secs")]
    pub poll_interval_secs: u64,
}

const fn default_scheduler_poll_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_scheduler_poll_secs(),
        }
    }
}
