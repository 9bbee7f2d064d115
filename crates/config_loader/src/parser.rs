//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{IpcConfig, IpcError};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<IpcConfig, IpcError> {
    toml::from_str(content).map_err(|e| IpcError::config("<toml>", format!("TOML parse error: {e}")))
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<IpcConfig, IpcError> {
    serde_json::from_str(content)
        .map_err(|e| IpcError::config("<json>", format!("JSON parse error: {e}")))
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<IpcConfig, IpcError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[identity]
location = "Controller"

[queue]
enabled = true
base_dir = "/var/lib/ipc"
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.identity.location, "Controller");
        assert!(config.queue.enabled);
        assert_eq!(config.queue.memory_capacity, 1_000);
        assert_eq!(config.rpc.default_timeout_ms, contracts::DEFAULT_RPC_TIMEOUT_MS);
    }

    #[test]
    fn test_parse_empty_toml_gives_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.identity.location, contracts::DEFAULT_LOCATION);
        assert!(!config.queue.enabled);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "identity": { "location": "minion", "system_id": "minion-1" },
            "rpc": { "default_timeout_ms": 500 },
            "sink": { "max_chunk_size": 4096, "retry_max_attempts": 3 }
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.identity.system_id.as_deref(), Some("minion-1"));
        assert_eq!(config.sink.max_chunk_size, 4096);
        assert_eq!(config.sink.retry_max_attempts, Some(3));
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse_toml("invalid toml [[[").unwrap_err();
        assert!(matches!(err, IpcError::Config { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
