//! 集成测试公共组件：可控的假执行后端、失效的缓存后端、引擎构造

#![allow(dead_code)]

use async_trait::async_trait;
use mqlserver::cache::{CacheBackend, CacheEntry, CacheError, Fingerprint};
use mqlserver::execution::{ExecutionError, QueryBackend, QueryLog};
use mqlserver::materialize::ParquetTableStore;
use mqlserver::model::{ModelKey, QuerySpecification, ResultColumn, ResultTable, METRIC_TIME};
use mqlserver::utils::config::EngineConfig;
use mqlserver::{MqlEngine, MqlError, MqlQueryStatus, QueryId};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// 假后端的行为
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    Unreachable,
    Internal(String),
    Panic,
    /// 返回的表格里混入一行单元格数不足的行
    Ragged,
}

/// 可控的执行后端
pub struct FakeBackend {
    behavior: Mutex<Behavior>,
    executions: AtomicUsize,
    reachable: AtomicBool,
    /// 设置后每次执行都要先拿到一个许可（测试用来让查询停在 RUNNING）
    gate: Option<Arc<Semaphore>>,
    rows: usize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::with_rows(2)
    }

    pub fn with_rows(rows: usize) -> Self {
        Self {
            behavior: Mutex::new(Behavior::Succeed),
            executions: AtomicUsize::new(0),
            reachable: AtomicBool::new(true),
            gate: None,
            rows,
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn table(&self, spec: &QuerySpecification) -> ResultTable {
        let mut columns: Vec<ResultColumn> = spec
            .group_by
            .iter()
            .map(|d| ResultColumn::dimension(d.as_str()))
            .collect();
        if spec.add_time_series {
            columns.push(ResultColumn::time(METRIC_TIME));
        }
        columns.extend(spec.metrics.iter().map(|m| ResultColumn::metric(m.as_str())));

        let mut table = ResultTable::new(columns);
        for i in 0..self.rows {
            let mut row = Vec::new();
            for _ in &spec.group_by {
                row.push(json!(format!("v{}", i)));
            }
            if spec.add_time_series {
                row.push(json!(format!("2024-01-{:02}", (i % 28) + 1)));
            }
            for _ in &spec.metrics {
                row.push(json!((i + 1) as f64));
            }
            table.push_row(row).unwrap();
        }
        table
    }
}

#[async_trait]
impl QueryBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn execute(
        &self,
        spec: &QuerySpecification,
        log: &QueryLog,
    ) -> Result<ResultTable, ExecutionError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        log.info("Compiling metrics");

        if let Some(gate) = &self.gate {
            log.info("Waiting for warehouse");
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
            log.info("Warehouse responded");
        }

        let behavior = self.behavior.lock().clone();
        match behavior {
            Behavior::Succeed => Ok(self.table(spec)),
            Behavior::Fail(msg) => Err(ExecutionError::Query(msg)),
            Behavior::Unreachable => Err(ExecutionError::Unreachable("connection reset".into())),
            Behavior::Internal(msg) => Err(ExecutionError::Internal(msg)),
            Behavior::Panic => panic!("backend exploded"),
            Behavior::Ragged => {
                let mut table = self.table(spec);
                table.rows.push(vec![json!("short")]);
                Ok(table)
            }
        }
    }

    async fn ping(&self) -> Result<(), ExecutionError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExecutionError::Unreachable("ping failed".into()))
        }
    }
}

/// 永远不可用的缓存后端
pub struct BrokenCache;

#[async_trait]
impl CacheBackend for BrokenCache {
    fn name(&self) -> &str {
        "broken"
    }

    async fn get(&self, _fingerprint: &Fingerprint) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn put(&self, _entry: CacheEntry) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

/// 读取正常、写入时 panic 的缓存后端
pub struct PanickyCache;

#[async_trait]
impl CacheBackend for PanickyCache {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn get(&self, _fingerprint: &Fingerprint) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _entry: CacheEntry) -> Result<(), CacheError> {
        panic!("cache serializer exploded")
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        Ok(0)
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(0)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

pub const DROP_TOKEN: &str = "drop-everything";

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.cache.drop_confirmation_token = Some(DROP_TOKEN.to_string());
    config.manager.reconcile_interval_ms = 10;
    config.manager.reconcile_timeout_secs = 5;
    config.health.probe_timeout_ms = 200;
    config
}

pub struct TestEngine {
    pub engine: Arc<MqlEngine>,
    pub backend: Arc<FakeBackend>,
    pub tables: tempfile::TempDir,
}

pub fn engine_with(config: EngineConfig, backend: FakeBackend) -> TestEngine {
    let tables = tempfile::tempdir().unwrap();
    let backend = Arc::new(backend);
    let engine = MqlEngine::new(
        config,
        backend.clone(),
        Arc::new(ParquetTableStore::new(tables.path())),
    );
    TestEngine {
        engine: Arc::new(engine),
        backend,
        tables,
    }
}

pub fn engine() -> TestEngine {
    engine_with(test_config(), FakeBackend::new())
}

pub fn model_key() -> ModelKey {
    ModelKey::new("acme", "metrics", "main", "abc123")
}

pub fn spec() -> QuerySpecification {
    QuerySpecification::new(model_key(), vec!["revenue".to_string()])
        .with_group_by(vec!["country".to_string()])
}

/// 等待终态（带超时，防止测试挂起）
pub async fn wait_terminal(engine: &MqlEngine, id: &QueryId) -> MqlQueryStatus {
    tokio::time::timeout(Duration::from_secs(10), engine.wait(id))
        .await
        .expect("query did not finish in time")
        .expect("wait failed")
}

/// 等待某个状态出现
pub async fn wait_for_status(engine: &MqlEngine, id: &QueryId, status: MqlQueryStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        match engine.get_query_status(id) {
            Ok(s) if s == status => return,
            Ok(_) => {}
            Err(e) => panic!("status lookup failed: {}", e),
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "query never reached {}",
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn is_not_found(e: &MqlError) -> bool {
    matches!(e, MqlError::NotFound(_))
}
