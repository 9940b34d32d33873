//! CLI command implementations.

pub mod schedule;
pub mod tenant;
pub mod worker;
pub mod workflow;

use std::path::PathBuf;

use anyhow::Result;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::Engine;

pub(crate) fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

pub(crate) async fn init_engine(config_path: Option<&PathBuf>) -> Result<(Config, Engine)> {
    let config = load_config(config_path)?;
    let engine = Engine::init(&config).await?;
    Ok((config, engine))
}
