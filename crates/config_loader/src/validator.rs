//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (derive `Validate`)：location 非空、超时/容量 > 0
//! - 重试退避：initial <= max
//! - 启用队列时 base_dir 非空
//! - destination_prefix 不含空白

use contracts::{IpcConfig, IpcError};
use ::validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 IpcConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &IpcConfig) -> Result<(), IpcError> {
    config.validate().map_err(|errors| first_error("", &errors))?;
    validate_retry_backoff(config)?;
    validate_queue(config)?;
    validate_destination_prefix(config)?;
    Ok(())
}

/// 把 validator 的嵌套错误展开成第一个字段路径
fn first_error(prefix: &str, errors: &ValidationErrors) -> IpcError {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by_key(|(name, _)| name.to_string());

    for (name, kind) in fields {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                let message = list
                    .first()
                    .map(|e| match &e.message {
                        Some(message) => message.to_string(),
                        None => format!("failed '{}' check", e.code),
                    })
                    .unwrap_or_else(|| "invalid value".to_string());
                return IpcError::config(path, message);
            }
            ValidationErrorsKind::Struct(nested) => return first_error(&path, nested),
            ValidationErrorsKind::List(items) => {
                if let Some((idx, nested)) = items.iter().next() {
                    return first_error(&format!("{path}[{idx}]"), nested);
                }
            }
        }
    }
    IpcError::config(prefix, "invalid configuration")
}

/// 校验重试退避
fn validate_retry_backoff(config: &IpcConfig) -> Result<(), IpcError> {
    let sink = &config.sink;
    if sink.retry_initial_backoff_ms > sink.retry_max_backoff_ms {
        return Err(IpcError::config(
            "sink.retry_initial_backoff_ms / sink.retry_max_backoff_ms",
            format!(
                "initial backoff ({}) must be <= max backoff ({})",
                sink.retry_initial_backoff_ms, sink.retry_max_backoff_ms
            ),
        ));
    }
    if sink.retry_max_attempts == Some(0) {
        return Err(IpcError::config(
            "sink.retry_max_attempts",
            "must be > 0 when set",
        ));
    }
    Ok(())
}

/// 校验队列配置
fn validate_queue(config: &IpcConfig) -> Result<(), IpcError> {
    if config.queue.enabled && config.queue.base_dir.as_os_str().is_empty() {
        return Err(IpcError::config(
            "queue.base_dir",
            "base_dir cannot be empty when the queue is enabled",
        ));
    }
    Ok(())
}

fn validate_destination_prefix(config: &IpcConfig) -> Result<(), IpcError> {
    if config.sink.destination_prefix.chars().any(char::is_whitespace) {
        return Err(IpcError::config(
            "sink.destination_prefix",
            format!(
                "'{}' must not contain whitespace",
                config.sink.destination_prefix
            ),
        ));
    }
    Ok(())
}
