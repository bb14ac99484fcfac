use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::features::avatar::NetworkId;

/// 画布边长上限（RGBA 画布约 64 MiB）
pub const MAX_CANVAS_SIZE: u32 = 4096;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

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
        3000
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

/// 图片存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 渲染结果的落盘根目录
    #[serde(default = "StorageConfig::default_root")]
    pub root: String,
}

impl StorageConfig {
    fn default_root() -> String {
        "./resources/avatars".to_string()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
        }
    }
}

/// 渲染与缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// 同一缓存键两次渲染的最小间隔（毫秒）
    #[serde(default = "RenderConfig::default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// 是否合并同一缓存键的并发渲染（single-flight）
    #[serde(default = "RenderConfig::default_coalesce")]
    pub coalesce: bool,
    /// 缓存键是否包含头像样式（默认不包含，同一 token 的不同样式共用一张图）
    #[serde(default)]
    pub style_in_cache_key: bool,
    /// 画布边长（像素）
    #[serde(default = "RenderConfig::default_canvas_size")]
    pub canvas_size: u32,
    /// 并发渲染许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 过期缓存条目清理间隔（秒，0=不清理）
    #[serde(default = "RenderConfig::default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl RenderConfig {
    fn default_cache_ttl_ms() -> u64 {
        3000
    }
    fn default_coalesce() -> bool {
        true
    }
    fn default_canvas_size() -> u32 {
        512
    }
    fn default_sweep_interval() -> u64 {
        60
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// 实际并发渲染许可数
    pub fn effective_parallelism(&self) -> usize {
        match self.max_parallel {
            0 => num_cpus::get(),
            m => m as usize,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: Self::default_cache_ttl_ms(),
            coalesce: Self::default_coalesce(),
            style_in_cache_key: false,
            canvas_size: Self::default_canvas_size(),
            max_parallel: 0,
            sweep_interval_secs: Self::default_sweep_interval(),
        }
    }
}

/// 各网络的 REST 入口
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEndpoints {
    #[serde(default = "ChainEndpoints::default_unique")]
    pub unique: String,
    #[serde(default = "ChainEndpoints::default_quartz")]
    pub quartz: String,
    #[serde(default = "ChainEndpoints::default_opal")]
    pub opal: String,
    #[serde(default = "ChainEndpoints::default_sapphire")]
    pub sapphire: String,
}

impl ChainEndpoints {
    fn default_unique() -> String {
        "https://rest.unique.network/unique/v1".to_string()
    }
    fn default_quartz() -> String {
        "https://rest.unique.network/quartz/v1".to_string()
    }
    fn default_opal() -> String {
        "https://rest.unique.network/opal/v1".to_string()
    }
    fn default_sapphire() -> String {
        "https://rest.unique.network/sapphire/v1".to_string()
    }

    pub fn base_url(&self, network: NetworkId) -> &str {
        match network {
            NetworkId::Unique => &self.unique,
            NetworkId::Quartz => &self.quartz,
            NetworkId::Opal => &self.opal,
            NetworkId::Sapphire => &self.sapphire,
        }
    }
}

impl Default for ChainEndpoints {
    fn default() -> Self {
        Self {
            unique: Self::default_unique(),
            quartz: Self::default_quartz(),
            opal: Self::default_opal(),
            sapphire: Self::default_sapphire(),
        }
    }
}

/// 链上数据访问配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// REST 请求超时（秒，0=不限制）
    #[serde(default = "ChainConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 图层图片下载超时（秒，0=不限制）
    #[serde(default = "ChainConfig::default_timeout")]
    pub layer_timeout_secs: u64,
    /// `ipfs://` 与 ipfsCid 的网关前缀
    #[serde(default = "ChainConfig::default_ipfs_gateway")]
    pub ipfs_gateway: String,
    #[serde(default)]
    pub endpoints: ChainEndpoints,
}

impl ChainConfig {
    fn default_timeout() -> u64 {
        30
    }
    fn default_ipfs_gateway() -> String {
        "https://ipfs.unique.network/ipfs/".to_string()
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
            layer_timeout_secs: Self::default_timeout(),
            ipfs_gateway: Self::default_ipfs_gateway(),
            endpoints: ChainEndpoints::default(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 未设置时生效）
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
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
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置（文件可缺省），支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            // 支持环境变量覆盖，例如：APP_SERVER__PORT、APP_RENDER__CACHE_TTL_MS
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = builder.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 拒绝会导致渲染管线无法工作的配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render.cache_ttl_ms == 0 {
            return Err(ConfigError::Message(
                "render.cache_ttl_ms 必须大于 0".to_string(),
            ));
        }
        if self.render.canvas_size == 0 || self.render.canvas_size > MAX_CANVAS_SIZE {
            return Err(ConfigError::Message(format!(
                "render.canvas_size 必须在 1..={MAX_CANVAS_SIZE} 之间"
            )));
        }
        for network in NetworkId::ALL {
            if self.chain.endpoints.base_url(network).trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "chain.endpoints.{network} 不能为空"
                )));
            }
        }
        Ok(())
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径（可通过 APP_CONFIG 指定）
    fn get_config_path() -> PathBuf {
        std::env::var("APP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 获取图片存储根目录
    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.root)
    }
}
