//! 统一配置中心
//!
//! 加载顺序：内置默认值 → 可选配置文件（`APP_CONFIG_FILE`，toml/yaml/json）→ `APP_` 环境变量。
//! 环境变量用 `__` 表示嵌套，例如 `APP_STORAGE__BACKEND=postgres`。

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const CONFIG_FILE_ENV: &str = "APP_CONFIG_FILE";
pub const ENV_PREFIX: &str = "APP_";

/// 全局应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub storage: StorageConfig,
    #[serde(default)]
    #[validate(nested)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    // 0 表示由系统分配端口
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub database_url: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub max_connections: u32,
    /// 单次存储调用的超时
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` 语法，`RUST_LOG` 优先
    #[validate(length(min = 1))]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info,tower_http=info".into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: None,
                max_connections: 10,
                timeout_ms: 5_000,
            },
            log: LogConfig::default(),
        }
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("storage.database_url is required when storage.backend is postgres")]
    MissingDatabaseUrl,
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

fn with_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yml") | Some("yaml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

impl AppConfig {
    /// 按 默认值 → `APP_CONFIG_FILE` → `APP_*` 环境变量 的顺序加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            figment = with_file(figment, Path::new(&path));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// 只读取指定文件（缺失字段用默认值），不读环境变量
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()));
        Self::extract(with_file(figment, path.as_ref()))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract()?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.storage.backend == StorageBackend::Postgres && self.storage.database_url.is_none()
        {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(())
    }

    /// 监听地址，形如 `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 用于日志输出的配置摘要，隐藏数据库口令
    pub fn sanitize(&self) -> String {
        let mut redacted = self.clone();
        redacted.storage.database_url = redacted.storage.database_url.as_deref().map(redact_url);
        format!("{redacted:?}")
    }
}

fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    match rest.rfind('@') {
        Some(at) => format!("{}://[REDACTED]@{}", &url[..scheme_end], &rest[at + 1..]),
        None => url.to_string(),
    }
}
