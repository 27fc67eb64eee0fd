//! 配置管理
//!
//! 配置来源按优先级从低到高：内置默认值 → 配置文件 → `MEDIMG_` 前缀的环境变量。
//! 例如 `MEDIMG_SECURITY__MFA_ENCRYPTION_KEY`、`MEDIMG_AI__API_KEY`。

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::error::{MedError, Result};

/// 系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 安全配置
    pub security: SecurityConfig,
    /// AI 服务配置
    pub ai: AiConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// CORS允许的源，空列表表示允许任意来源
    pub cors_allowed_origins: Vec<String>,
    /// 请求体大小上限（字节）
    pub body_limit_bytes: usize,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL 连接字符串
    pub url: Option<String>,
    /// 最大连接数
    pub max_connections: u32,
}

/// 安全配置
#[derive(Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// MFA 密钥加密用的 AES-256 密钥（64个十六进制字符）
    #[serde(default)]
    pub mfa_encryption_key: String,
    /// 会话令牌签名密钥
    #[serde(default)]
    pub session_secret: String,
    /// 会话有效期（小时）
    pub session_ttl_hours: i64,
    /// TOTP 发行者名称
    pub totp_issuer: String,
    /// 仅用于调试：在 MFA 设置响应中返回明文密钥
    pub debug_expose_mfa_secret: bool,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("mfa_encryption_key", &"<redacted>")
            .field("session_secret", &"<redacted>")
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("totp_issuer", &self.totp_issuer)
            .field("debug_expose_mfa_secret", &self.debug_expose_mfa_secret)
            .finish()
    }
}

/// AI 服务配置
#[derive(Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// API 密钥，未配置时AI诊断接口不可用
    pub api_key: Option<String>,
    /// OpenAI 兼容接口地址
    pub base_url: String,
    /// 模型名称
    pub model: String,
    /// 站点URL，作为 HTTP-Referer 发送
    pub site_url: String,
    /// 应用名称，作为 X-Title 发送
    pub app_title: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("site_url", &self.site_url)
            .field("app_title", &self.app_title)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（EnvFilter 语法）
    pub level: String,
}

impl AppConfig {
    /// 从配置文件（可选）和环境变量加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Self::defaults()?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("MEDIMG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.cors_allowed_origins"),
        );

        let config = Self::from_builder(builder)?;
        info!("Configuration loaded (file: {:?})", config_path);
        Ok(config)
    }

    /// 内置默认值
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("server.cors_allowed_origins", Vec::<String>::new())?
            .set_default("server.body_limit_bytes", 25_i64 * 1024 * 1024)?
            .set_default("database.max_connections", 10_i64)?
            .set_default("security.session_ttl_hours", 12_i64)?
            .set_default("security.totp_issuer", "MedImg")?
            .set_default("security.debug_expose_mfa_secret", false)?
            .set_default("ai.base_url", "https://openrouter.ai/api/v1")?
            .set_default("ai.model", "openai/gpt-4o-mini")?
            .set_default("ai.site_url", "http://localhost:3000")?
            .set_default("ai.app_title", "MedImg Dashboard")?
            .set_default("ai.timeout_secs", 60_i64)?
            .set_default("logging.level", "info")?;
        Ok(builder)
    }

    /// 构建、反序列化并校验
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置，缺少密钥时拒绝启动
    pub fn validate(&self) -> Result<()> {
        let key = self.security.mfa_encryption_key.trim();
        if key.is_empty() {
            return Err(MedError::Config(
                "MEDIMG_SECURITY__MFA_ENCRYPTION_KEY no está configurada".to_string(),
            ));
        }
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MedError::Config(
                "la clave de cifrado MFA debe tener 64 caracteres hexadecimales (32 bytes)"
                    .to_string(),
            ));
        }

        if self.security.session_secret.len() < 32 {
            return Err(MedError::Config(
                "MEDIMG_SECURITY__SESSION_SECRET debe tener al menos 32 caracteres".to_string(),
            ));
        }

        if self.security.session_ttl_hours <= 0 {
            return Err(MedError::Config(
                "security.session_ttl_hours debe ser positivo".to_string(),
            ));
        }

        if self.security.totp_issuer.contains(':') {
            return Err(MedError::Config(
                "security.totp_issuer no puede contener ':'".to_string(),
            ));
        }

        Ok(())
    }

    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
