//! Command implementations.

mod echo;
mod info;
mod queue;
mod validate;

pub use echo::run_echo;
pub use info::run_info;
pub use queue::run_queue;
pub use validate::run_validate;

use anyhow::{Context, Result};
use contracts::IpcConfig;
use std::path::Path;

/// Load configuration from `path`, or defaults when no path is given
fn load_config(path: Option<&Path>) -> Result<IpcConfig> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(IpcConfig::default()),
    }
}
