use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 监听端口的环境变量名（兼容 Heroku 等 PaaS 注入方式）
pub const PORT_ENV: &str = "PORT";

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        4747
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// 二维码尺寸配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    /// 未传 size（或无法解析）时使用的默认边长
    #[serde(default = "QrConfig::default_size")]
    pub default_size: u32,
    /// 允许的最小边长（版本 1 的二维码为 21x21 模块）
    #[serde(default = "QrConfig::default_min_size")]
    pub min_size: u32,
    /// 允许的最大边长
    #[serde(default = "QrConfig::default_max_size")]
    pub max_size: u32,
}

impl QrConfig {
    fn default_size() -> u32 {
        250
    }
    fn default_min_size() -> u32 {
        21
    }
    fn default_max_size() -> u32 {
        500
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            default_size: Self::default_size(),
            min_size: Self::default_min_size(),
            max_size: Self::default_max_size(),
        }
    }
}

/// Logo 叠加配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoConfig {
    /// 是否启用 Logo 叠加（关闭后忽略 logo 参数）
    #[serde(default = "LogoConfig::default_enabled")]
    pub enabled: bool,
    /// 回源请求超时（秒）
    #[serde(default = "LogoConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 回源响应体大小上限（字节）
    #[serde(default = "LogoConfig::default_max_bytes")]
    pub max_bytes: u64,
    /// Logo 宽度占二维码宽度的比例
    #[serde(default = "LogoConfig::default_width_ratio")]
    pub width_ratio: f64,
}

impl LogoConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_timeout() -> u64 {
        10
    }
    fn default_max_bytes() -> u64 {
        5 * 1024 * 1024
    }
    fn default_width_ratio() -> f64 {
        0.2
    }

    /// 获取回源超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            timeout_secs: Self::default_timeout(),
            max_bytes: Self::default_max_bytes(),
            width_ratio: Self::default_width_ratio(),
        }
    }
}

/// 图片渲染配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImageRenderConfig {
    /// 并发渲染许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 是否优先速度编码 PNG（Fast 压缩 + 无滤波），体积略大
    #[serde(default)]
    pub optimize_speed: bool,
}

impl ImageRenderConfig {
    /// 实际生效的并发许可数
    pub fn effective_parallelism(&self) -> usize {
        match self.max_parallel as usize {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 未设置时生效）
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// 日志格式：full | compact
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
    fn default_format() -> String {
        "full".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// 二维码尺寸配置
    #[serde(default)]
    pub qr: QrConfig,
    /// Logo 叠加配置
    #[serde(default)]
    pub logo: LogoConfig,
    /// 图片渲染配置
    #[serde(default)]
    pub image: ImageRenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置（文件可缺省），支持 `APP_*` 与 `PORT` 环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            // 支持环境变量覆盖，例如：APP_LOGO__TIMEOUT_SECS（`__` 分隔段与键）
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = builder.try_deserialize()?;
        config.apply_port_env(std::env::var(PORT_ENV).ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// 应用 `PORT` 环境变量；未设置或为空时保留配置端口
    pub fn apply_port_env(&mut self, raw: Option<&str>) -> Result<(), ConfigError> {
        if let Some(port) = raw.map(str::trim).filter(|s| !s.is_empty()) {
            self.server.port = port.parse::<u16>().map_err(|e| {
                ConfigError::Message(format!("{PORT_ENV} 环境变量无效 ({port}): {e}"))
            })?;
        }
        Ok(())
    }

    /// `PORT` 环境变量是否生效（非空）
    pub fn port_from_env() -> bool {
        std::env::var(PORT_ENV).is_ok_and(|v| !v.trim().is_empty())
    }

    /// 校验配置之间的约束关系
    pub fn validate(&self) -> Result<(), ConfigError> {
        let qr = &self.qr;
        if qr.min_size == 0 {
            return Err(ConfigError::Message("qr.min_size 必须大于 0".to_string()));
        }
        if qr.min_size > qr.max_size {
            return Err(ConfigError::Message(format!(
                "qr.min_size ({}) 不能大于 qr.max_size ({})",
                qr.min_size, qr.max_size
            )));
        }
        if !(qr.min_size..=qr.max_size).contains(&qr.default_size) {
            return Err(ConfigError::Message(format!(
                "qr.default_size ({}) 必须位于 [{}, {}] 区间内",
                qr.default_size, qr.min_size, qr.max_size
            )));
        }
        let ratio = self.logo.width_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::Message(format!(
                "logo.width_ratio ({ratio}) 必须位于 (0, 1] 区间内"
            )));
        }
        Ok(())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
