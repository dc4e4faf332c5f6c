//! 引擎门面
//!
//! 持有全部组件，对外暴露查询服务的逻辑操作：
//! submit / status / result / tabular / logs / list / materialize / drop_cache / health。
//! 传输层（HTTP 等）只依赖本模块。

use crate::cache::{CacheBackend, CacheStore, DropOutcome, MemoryCacheBackend};
use crate::execution::{ParquetBackend, QueryBackend};
use crate::health::{
    BackendProbe, CacheProbe, HealthAggregator, HealthItem, TableStoreProbe, WorkerProbe,
};
use crate::manager::QueryManager;
use crate::materialize::{
    Orient, ParquetTableStore, ResultMaterializer, TableLocation, TableStore, TabularPage,
};
use crate::model::{
    MqlQuery, MqlQueryResultSeries, MqlQueryStatus, MqlQuerySummary, QueryId, QuerySpecification,
};
use crate::utils::config::EngineConfig;
use crate::{CacheMode, MqlError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// MQL 引擎
pub struct MqlEngine {
    config: EngineConfig,
    cache: Arc<CacheStore>,
    manager: Arc<QueryManager>,
    materializer: ResultMaterializer,
    health: HealthAggregator,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MqlEngine {
    /// 使用配置中的内存缓存
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn QueryBackend>,
        table_store: Arc<dyn TableStore>,
    ) -> Self {
        let cache_backend: Arc<dyn CacheBackend> = Arc::new(MemoryCacheBackend::new(
            config.cache.max_entries,
            config.cache.ttl(),
        ));
        Self::with_cache_backend(config, cache_backend, backend, table_store)
    }

    /// 指定缓存后端
    pub fn with_cache_backend(
        config: EngineConfig,
        cache_backend: Arc<dyn CacheBackend>,
        backend: Arc<dyn QueryBackend>,
        table_store: Arc<dyn TableStore>,
    ) -> Self {
        let cache = Arc::new(CacheStore::new(
            cache_backend,
            config.cache.drop_confirmation_token.clone(),
        ));
        let manager = Arc::new(QueryManager::new(
            config.manager.clone(),
            cache.clone(),
            backend.clone(),
        ));
        let materializer = ResultMaterializer::new(
            manager.clone(),
            table_store.clone(),
            config.storage.default_schema.clone(),
            config.tabular.page_size,
        );
        let health = HealthAggregator::new(config.health.probe_timeout())
            .with_probe(Arc::new(CacheProbe(cache.clone())))
            .with_probe(Arc::new(BackendProbe(backend)))
            .with_probe(Arc::new(TableStoreProbe(table_store)))
            .with_probe(Arc::new(WorkerProbe(manager.clone())));

        Self {
            config,
            cache,
            manager,
            materializer,
            health,
            sweeper: Mutex::new(None),
        }
    }

    /// 按配置组装 Parquet 后端与 Parquet 表存储
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate().map_err(MqlError::Config)?;
        let backend = Arc::new(ParquetBackend::new(&config.storage.data_dir));
        let table_store = Arc::new(ParquetTableStore::new(&config.storage.table_dir));
        log::info!(
            "Engine storage: data_dir={}, table_dir={}",
            config.storage.data_dir,
            config.storage.table_dir
        );
        Ok(Self::new(config, backend, table_store))
    }

    /// 启动后台任务（保留期清理）
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(self.manager.start_sweeper());
            log::info!(
                "Query sweeper started (interval {}s)",
                self.config.manager.sweep_interval_secs
            );
        }
    }

    /// 停止接收新查询并停止后台任务
    pub fn shutdown(&self) {
        self.manager.shutdown();
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<QueryManager> {
        &self.manager
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // 逻辑操作
    // ------------------------------------------------------------------

    pub fn submit_query(&self, spec: QuerySpecification) -> Result<QueryId> {
        self.manager.submit(spec)
    }

    pub fn get_query_status(&self, id: &QueryId) -> Result<MqlQueryStatus> {
        self.manager.status(id)
    }

    pub fn get_query(&self, id: &QueryId) -> Result<MqlQuery> {
        self.manager.get(id)
    }

    /// 序列形式的结果
    pub fn get_query_result(&self, id: &QueryId) -> Result<Vec<MqlQueryResultSeries>> {
        self.materializer.series(id)
    }

    /// 分页表格形式的结果
    pub fn get_query_result_tabular(
        &self,
        id: &QueryId,
        cursor: Option<&str>,
        orient: Orient,
    ) -> Result<TabularPage> {
        self.materializer.tabular(id, cursor, orient)
    }

    pub fn get_query_logs(
        &self,
        id: &QueryId,
        from_line: Option<usize>,
        max_lines: Option<usize>,
    ) -> Result<String> {
        self.manager.logs(id, from_line, max_lines)
    }

    pub fn list_queries(&self, active_only: bool, limit: Option<usize>) -> Vec<MqlQuerySummary> {
        self.manager.list(active_only, limit)
    }

    pub async fn materialize(
        &self,
        spec: QuerySpecification,
        as_table: Option<&str>,
        cache_mode: CacheMode,
    ) -> Result<TableLocation> {
        self.materializer.materialize(spec, as_table, cache_mode).await
    }

    /// 清空缓存
    ///
    /// 令牌缺失或不匹配返回 `CacheRejected`，成功返回删除的条目数。
    pub async fn drop_cache(&self, confirmation_token: Option<&str>) -> Result<usize> {
        match self.cache.drop_all(confirmation_token).await? {
            DropOutcome::Dropped { removed } => Ok(removed),
            DropOutcome::Rejected { reason } => Err(MqlError::CacheRejected(reason)),
        }
    }

    pub async fn health_report(&self) -> Vec<HealthItem> {
        self.health.report().await
    }

    /// 等待查询进入终态
    pub async fn wait(&self, id: &QueryId) -> Result<MqlQueryStatus> {
        self.manager.wait(id).await
    }
}
