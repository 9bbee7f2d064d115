//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce `IpcConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("ipc.toml")).unwrap();
//! println!("Location: {}", config.identity.location);
//! ```

mod parser;
mod validator;

pub use contracts::IpcConfig;
pub use parser::ConfigFormat;

use contracts::IpcError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<IpcConfig, IpcError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<IpcConfig, IpcError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already-built configuration
    pub fn validate(config: &IpcConfig) -> Result<(), IpcError> {
        validator::validate(config)
    }

    /// Serialize IpcConfig to TOML string
    pub fn to_toml(config: &IpcConfig) -> Result<String, IpcError> {
        toml::to_string_pretty(config)
            .map_err(|e| IpcError::config("<toml>", format!("TOML serialize error: {e}")))
    }

    /// Serialize IpcConfig to JSON string
    pub fn to_json(config: &IpcConfig) -> Result<String, IpcError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| IpcError::config("<json>", format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, IpcError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            IpcError::config("<path>", "cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext)
            .ok_or_else(|| IpcError::config("<path>", format!("unsupported config format: .{ext}")))
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, IpcError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(content: &str, format: ConfigFormat) -> Result<IpcConfig, IpcError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}
