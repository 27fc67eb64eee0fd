//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
///
/// 每个变体对应一种明确的错误类别，Web 层据此决定 HTTP 状态码，
/// 不再依赖错误消息中的子串匹配。
#[derive(Error, Debug)]
pub enum MedError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("加密错误: {0}")]
    Crypto(String),

    #[error("AI服务错误: {0}")]
    Ai(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MedError {
    /// 缺少必填字段
    pub fn missing_field(field: &str) -> Self {
        MedError::Validation(format!("Falta el campo requerido: {}", field))
    }
}

impl From<config::ConfigError> for MedError {
    fn from(err: config::ConfigError) -> Self {
        MedError::Config(err.to_string())
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, MedError>;
