use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::FlowTypeRegistry;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid claim_batch_size: {0}. Must be at least 1")]
    InvalidClaimBatchSize(usize),

    #[error("Invalid stale_task_secs: {0}. Must be at least 1")]
    InvalidStaleTaskSecs(u64),

    #[error("Invalid flow type configuration: {0}")]
    InvalidFlowTypes(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .dynaflow/config.yaml (project config)
    /// 3. .dynaflow/local.yaml (local overrides, optional)
    /// 4. Environment variables (DYNAFLOW_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".dynaflow/config.yaml"))
            .merge(Yaml::file(".dynaflow/local.yaml"))
            .merge(Env::prefixed("DYNAFLOW_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.worker.claim_batch_size == 0 {
            return Err(ConfigError::InvalidClaimBatchSize(config.worker.claim_batch_size));
        }
        if config.worker.stale_task_secs == 0 {
            return Err(ConfigError::InvalidStaleTaskSecs(config.worker.stale_task_secs));
        }

        // Flow types carry the whole expansion contract; fail fast on a bad set
        FlowTypeRegistry::new(config.flow_types.clone())
            .map_err(ConfigError::InvalidFlowTypes)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FlowType, TaskTemplate};

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_database_path_rejected() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_cyclic_flow_types_rejected() {
        let mut config = Config::default();
        config.flow_types = vec![FlowType::new(
            "bad",
            vec![
                TaskTemplate::new("a").with_depends_on(vec!["b".to_string()]),
                TaskTemplate::new("b").with_depends_on(vec!["a".to_string()]),
            ],
        )];
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidFlowTypes(_))
        ));
    }
}
