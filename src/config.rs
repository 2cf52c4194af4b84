//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use crate::secrets::{self, SecretSource};
use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:9092"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

/// 内置管理员账号
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    /// 明文引导密码，启动时会被哈希，仅在未提供 password_hash 时使用
    #[serde(default)]
    pub password: Option<Secret<String>>,
    /// Argon2 PHC 格式的密码哈希
    #[serde(default)]
    pub password_hash: Option<Secret<String>>,
    pub email: String,
    pub display_name: String,
    /// 登录后授予的角色
    #[serde(deserialize_with = "deserialize_list")]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 每次认证请求后 API key 延长到的有效期（秒）
    pub key_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    /// 过期 key 清理周期（秒）
    pub interval_secs: u64,
    /// 同时运行的周期任务上限
    pub max_concurrent: usize,
    /// 单次清理超时（秒）
    pub firing_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretsConfig {
    /// 挂载的 secret 目录，`secret:` 引用从这里解析
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub admin: AdminConfig,
    pub session: SessionConfig,
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:9092")?
            .set_default("server.graceful_shutdown_timeout_secs", 5)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("admin.display_name", "Administrator")?
            .set_default("admin.roles", "admin")?
            .set_default("session.key_ttl_secs", 600_000)?
            .set_default("sweeper.interval_secs", 3600)?
            .set_default("sweeper.max_concurrent", 2)?
            .set_default("sweeper.firing_timeout_secs", 60)?;

        // 从环境变量加载配置（前缀为 APP_）
        settings = settings.add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 解析配置中的 `secret:` 引用
    ///
    /// 只处理已知的敏感字段，未使用引用格式的值保持不变。
    pub fn resolve_secrets(&mut self, source: &impl SecretSource) -> Result<(), ConfigError> {
        self.database.url = resolve_field(&self.database.url, source)?;

        if let Some(password) = &self.admin.password {
            self.admin.password = Some(resolve_field(password, source)?);
        }
        if let Some(hash) = &self.admin.password_hash {
            self.admin.password_hash = Some(resolve_field(hash, source)?);
        }

        Ok(())
    }

    /// 是否仍有未解析的 `secret:` 引用
    pub fn has_secret_references(&self) -> bool {
        let optional = [&self.admin.password, &self.admin.password_hash];
        secrets::is_reference(self.database.url.expose_secret())
            || optional
                .into_iter()
                .flatten()
                .any(|s| secrets::is_reference(s.expose_secret()))
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证端口范围
        if let Some(port_str) = self.server.addr.split(':').next_back() {
            if let Ok(port) = port_str.parse::<u16>() {
                if port != 0 && port < 1024 {
                    return Err(ConfigError::Message("Server port should be >= 1024".to_string()));
                }
            }
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 管理员账号
        if self.admin.username.trim().is_empty() {
            return Err(ConfigError::Message("admin.username is not set".to_string()));
        }
        if self.admin.email.trim().is_empty() {
            return Err(ConfigError::Message("admin.email is not set".to_string()));
        }
        let has_password = self
            .admin
            .password
            .as_ref()
            .is_some_and(|p| !p.expose_secret().is_empty());
        let has_hash = self
            .admin
            .password_hash
            .as_ref()
            .is_some_and(|h| !h.expose_secret().is_empty());
        if !has_password && !has_hash {
            return Err(ConfigError::Message(
                "admin.password or admin.password_hash must be set".to_string(),
            ));
        }

        check_duration_secs("session.key_ttl_secs", self.session.key_ttl_secs)?;
        check_duration_secs("sweeper.interval_secs", self.sweeper.interval_secs)?;
        check_duration_secs("sweeper.firing_timeout_secs", self.sweeper.firing_timeout_secs)?;

        if self.sweeper.max_concurrent == 0 {
            return Err(ConfigError::Message("sweeper.max_concurrent must be > 0".to_string()));
        }

        Ok(())
    }
}

/// 时长类配置的上限（秒），约 100 年
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn check_duration_secs(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_DURATION_SECS {
        return Err(ConfigError::Message(format!(
            "{} must be between 1 and {}",
            name, MAX_DURATION_SECS
        )));
    }
    Ok(())
}

fn resolve_field(
    value: &Secret<String>,
    source: &impl SecretSource,
) -> Result<Secret<String>, ConfigError> {
    let resolved = secrets::resolve(value.expose_secret(), source)
        .map_err(|e| ConfigError::Message(e.to_string()))?;
    Ok(Secret::new(resolved))
}

/// 支持 "a,b" 形式的环境变量以及真正的数组
fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        String(String),
    }

    let items = match ListOrString::deserialize(deserializer)? {
        ListOrString::List(list) => list,
        ListOrString::String(s) => s.split(',').map(str::to_string).collect(),
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
