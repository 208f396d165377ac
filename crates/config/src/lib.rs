//! 统一配置中心
//!
//! 配置按以下优先级合并：
//! - 内置默认值
//! - `APP_CONFIG_FILE` 指向的文件（按扩展名识别 toml / yaml / json）
//! - `APP_` 前缀的环境变量，`__` 表示嵌套，例如 `APP_AUTH__JWT_SECRET`

use std::path::PathBuf;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 默认的 JWT 密钥只用于本地开发，校验时会被拒绝
const DEV_JWT_SECRET: &str = "dev-secret-please-change-me-0123456789abcdef";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub auth: AuthConfig,
    #[validate(nested)]
    pub verification: VerificationConfig,
    #[validate(nested)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[validate(nested)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// 认证与会话配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    #[validate(length(min = 32))]
    pub jwt_secret: String,
    #[validate(range(min = 1))]
    pub session_hours: i64,
    #[validate(range(min = 1))]
    pub max_sessions_per_user: usize,
    #[validate(range(min = 4, max = 31))]
    pub bcrypt_cost: u32,
    /// 会话 cookie 是否带 `Secure` 标记
    #[serde(default)]
    pub cookie_secure: bool,
}

/// 邮箱验证码配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerificationConfig {
    #[validate(range(min = 1))]
    pub code_ttl_secs: i64,
    #[validate(range(min = 0))]
    pub resend_interval_secs: i64,
    #[validate(range(min = 1))]
    pub hourly_limit_per_ip: u32,
    #[validate(range(min = 1))]
    pub daily_limit_per_ip: u32,
    #[validate(range(min = 1))]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegistrationConfig {
    #[validate(range(min = 1))]
    pub hourly_limit_per_ip: u32,
}

/// 持久化配置；未设置数据目录时所有数据只保存在内存中
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MessagesConfig {
    #[validate(range(min = 1, max = 10000))]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                cors_origins: vec!["*".into()],
            },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.into(),
                session_hours: 24 * 7,
                max_sessions_per_user: 5,
                bcrypt_cost: 12,
                cookie_secure: false,
            },
            verification: VerificationConfig {
                code_ttl_secs: 600,
                resend_interval_secs: 60,
                hourly_limit_per_ip: 6,
                daily_limit_per_ip: 12,
                max_attempts: 5,
            },
            registration: RegistrationConfig {
                hourly_limit_per_ip: 3,
            },
            storage: StorageConfig::default(),
            messages: MessagesConfig { history_limit: 100 },
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的顺序加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Self::defaults();
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            figment = if path.ends_with(".yml") || path.ends_with(".yaml") {
                figment.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        Self::finish(figment.merge(Env::prefixed("APP_").split("__")))
    }

    /// 从 TOML 文本加载，未出现的字段取默认值
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::finish(Self::defaults().merge(Toml::string(source)))
    }

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.check()?;
        Ok(config)
    }

    /// 字段级校验之外的交叉检查
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.auth.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::InvalidJwtSecret(
                "the built-in development secret must be replaced (APP_AUTH__JWT_SECRET)".into(),
            ));
        }
        if self.verification.daily_limit_per_ip < self.verification.hourly_limit_per_ip {
            return Err(ConfigError::InvalidVerificationConfig(
                "daily_limit_per_ip must not be lower than hourly_limit_per_ip".into(),
            ));
        }
        if self.verification.resend_interval_secs >= self.verification.code_ttl_secs {
            return Err(ConfigError::InvalidVerificationConfig(
                "resend_interval_secs must be shorter than code_ttl_secs".into(),
            ));
        }
        Ok(())
    }

    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 用于日志输出的配置摘要，不包含密钥
    pub fn sanitize(&self) -> String {
        let mut redacted = self.clone();
        redacted.auth.jwt_secret = "[REDACTED]".into();
        format!("{redacted:?}")
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid verification configuration: {0}")]
    InvalidVerificationConfig(String),
}
