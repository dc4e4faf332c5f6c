//! 健康检查聚合
//!
//! 每个依赖子系统一个探测器，并发执行，各自带超时。
//! 单个探测失败或超时只会让对应条目变为 DEGRADED，不影响其他条目。

use crate::cache::CacheStore;
use crate::execution::QueryBackend;
use crate::manager::QueryManager;
use crate::materialize::TableStore;
use crate::observability::HEALTH_PROBE_FAILURES;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 组件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// 单个组件的健康条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthItem {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl HealthItem {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            error_message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            error_message: Some(error.into()),
        }
    }
}

/// 探测器
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> Result<(), String>;
}

/// 缓存可达性
pub struct CacheProbe(pub Arc<CacheStore>);

#[async_trait]
impl HealthProbe for CacheProbe {
    fn name(&self) -> &str {
        "cache"
    }

    async fn check(&self) -> Result<(), String> {
        self.0.ping().await.map_err(|e| e.to_string())
    }
}

/// 执行后端可达性
pub struct BackendProbe(pub Arc<dyn QueryBackend>);

#[async_trait]
impl HealthProbe for BackendProbe {
    fn name(&self) -> &str {
        "execution_backend"
    }

    async fn check(&self) -> Result<(), String> {
        self.0.ping().await.map_err(|e| e.to_string())
    }
}

/// 外部表存储可达性
pub struct TableStoreProbe(pub Arc<dyn TableStore>);

#[async_trait]
impl HealthProbe for TableStoreProbe {
    fn name(&self) -> &str {
        "table_store"
    }

    async fn check(&self) -> Result<(), String> {
        self.0.ping().await.map_err(|e| e.to_string())
    }
}

/// 查询 worker 池
pub struct WorkerProbe(pub Arc<QueryManager>);

#[async_trait]
impl HealthProbe for WorkerProbe {
    fn name(&self) -> &str {
        "query_workers"
    }

    async fn check(&self) -> Result<(), String> {
        self.0.ping_workers()
    }
}

/// 健康检查聚合器
pub struct HealthAggregator {
    probes: Vec<Arc<dyn HealthProbe>>,
    timeout: Duration,
}

impl HealthAggregator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            probes: Vec::new(),
            timeout,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn register(&mut self, probe: Arc<dyn HealthProbe>) {
        self.probes.push(probe);
    }

    /// 并发探测全部组件（结果顺序与注册顺序一致）
    pub async fn report(&self) -> Vec<HealthItem> {
        let timeout = self.timeout;
        let checks = self.probes.iter().map(|probe| async move {
            let name = probe.name().to_string();
            let item = match tokio::time::timeout(timeout, probe.check()).await {
                Ok(Ok(())) => HealthItem::healthy(name),
                Ok(Err(e)) => HealthItem::degraded(name, e),
                Err(_) => HealthItem::degraded(
                    name,
                    format!("probe timed out after {}ms", timeout.as_millis()),
                ),
            };
            if item.status == HealthStatus::Degraded {
                HEALTH_PROBE_FAILURES.with_label_values(&[item.name.as_str()]).inc();
                log::warn!(
                    "Health probe {} degraded: {}",
                    item.name,
                    item.error_message.as_deref().unwrap_or("")
                );
            }
            item
        });
        join_all(checks).await
    }
}

/// 全部组件健康
pub fn all_healthy(items: &[HealthItem]) -> bool {
    items.iter().all(|i| i.status == HealthStatus::Healthy)
}
