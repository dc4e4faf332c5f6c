//! 配置管理模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 引擎配置（config/mql.toml）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tabular: TabularConfig,
}

impl EngineConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: Self =
            toml::from_str(content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// 加载默认配置文件
    pub fn load_default() -> Result<Self, String> {
        Self::load_from_file("config/mql.toml")
    }

    /// 基本取值检查
    pub fn validate(&self) -> Result<(), String> {
        if self.manager.max_concurrent_queries == 0 {
            return Err("manager.max_concurrent_queries must be > 0".to_string());
        }
        if self.tabular.page_size == 0 {
            return Err("tabular.page_size must be > 0".to_string());
        }
        if self.health.probe_timeout_ms == 0 {
            return Err("health.probe_timeout_ms must be > 0".to_string());
        }
        if self.manager.reconcile_interval_ms == 0 {
            return Err("manager.reconcile_interval_ms must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 查询管理器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// 并发执行上限（worker 池大小）
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_queries: usize,

    /// 终态查询保留时长
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// 过期墓碑保留时长（之后查询返回 NotFound）
    #[serde(default = "default_tombstone_retention_secs")]
    pub tombstone_retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// UNKNOWN 状态下探测后端的间隔
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,

    /// UNKNOWN 状态最长持续时间
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,

    /// list 默认返回条数
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
}

impl ManagerConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn tombstone_retention(&self) -> Duration {
        Duration::from_secs(self.tombstone_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent(),
            retention_secs: default_retention_secs(),
            tombstone_retention_secs: default_tombstone_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
            default_list_limit: default_list_limit(),
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// 条目过期时间（不设置则永不过期）
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// drop_all 确认令牌（不设置则禁用清空）
    #[serde(default)]
    pub drop_confirmation_token: Option<String>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: None,
            drop_confirmation_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// 单个探测的超时
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// ParquetBackend 数据目录
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// 物化表输出目录
    #[serde(default = "default_table_dir")]
    pub table_dir: String,

    /// 物化表默认 schema
    #[serde(default = "default_schema")]
    pub default_schema: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            table_dir: default_table_dir(),
            default_schema: default_schema(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularConfig {
    /// 每页行数
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

// 默认值函数
fn default_name() -> String {
    "mql-server".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_concurrent() -> usize {
    8
}
fn default_retention_secs() -> u64 {
    3600
}
fn default_tombstone_retention_secs() -> u64 {
    86400
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_reconcile_interval_ms() -> u64 {
    1000
}
fn default_reconcile_timeout_secs() -> u64 {
    300
}
fn default_list_limit() -> usize {
    100
}
fn default_cache_max_entries() -> usize {
    10_000
}
fn default_probe_timeout_ms() -> u64 {
    2000
}
fn default_data_dir() -> String {
    "./data/warehouse".to_string()
}
fn default_table_dir() -> String {
    "./data/tables".to_string()
}
fn default_schema() -> String {
    "mql".to_string()
}
fn default_page_size() -> usize {
    1000
}
