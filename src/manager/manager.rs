//! 查询管理器
//!
//! 负责查询从提交到完成的整个生命周期：
//! 校验 → 指纹 → 登记 PENDING → 异步执行（受 worker 池限制）→ 终态。
//! 终态记录在保留期后被清理，留下墓碑以区分"已过期"和"不存在"。

use super::record::QueryRecord;
use crate::cache::{fingerprint, CacheStore};
use crate::constraint::validate;
use crate::execution::{apply_post_processors, ExecutionError, QueryBackend};
use crate::model::{
    MqlQuery, MqlQueryStatus, MqlQuerySummary, QueryId, QuerySpecification, ResultTable,
};
use crate::observability::{
    Timer, ACTIVE_QUERIES, QUERY_EVICTED_TOTAL, QUERY_EXECUTION_LATENCY, QUERY_SUBMITTED_TOTAL,
    RETAINED_QUERIES,
};
use crate::utils::config::ManagerConfig;
use crate::{MqlError, Result};
use dashmap::DashMap;
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// 查询管理器
pub struct QueryManager {
    config: ManagerConfig,
    cache: Arc<CacheStore>,
    backend: Arc<dyn QueryBackend>,

    /// 保留期内的查询记录
    records: DashMap<QueryId, Arc<QueryRecord>>,

    /// 已清理查询 -> 清理时间
    tombstones: DashMap<QueryId, Instant>,

    /// worker 池
    workers: Arc<Semaphore>,

    next_seq: AtomicU64,
}

impl QueryManager {
    pub fn new(
        config: ManagerConfig,
        cache: Arc<CacheStore>,
        backend: Arc<dyn QueryBackend>,
    ) -> Self {
        let permits = config.max_concurrent_queries.max(1);
        log::info!(
            "QueryManager created: backend={}, workers={}, retention={}s",
            backend.name(),
            permits,
            config.retention_secs
        );
        Self {
            config,
            cache,
            backend,
            records: DashMap::new(),
            tombstones: DashMap::new(),
            workers: Arc::new(Semaphore::new(permits)),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn backend(&self) -> &Arc<dyn QueryBackend> {
        &self.backend
    }

    /// 提交查询
    ///
    /// 只做同步校验和登记，执行在后台任务中进行，本方法不会等待执行。
    /// 需要在 Tokio 运行时内调用。
    pub fn submit(&self, spec: QuerySpecification) -> Result<QueryId> {
        Self::validate_spec(&spec)?;
        let fp = fingerprint(&spec)?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MqlError::Internal(format!("No async runtime available: {}", e)))?;

        let id = QueryId::generate();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(QueryRecord::new(id.clone(), spec, fp, seq));

        record.log.info(format!(
            "Query submitted: model={}, metrics=[{}], group_by=[{}], cache_mode={}, fingerprint={}",
            record.spec.model_key,
            record.spec.metrics.join(", "),
            record.spec.group_by.join(", "),
            record.spec.cache_mode,
            record.fingerprint.short()
        ));

        self.records.insert(id.clone(), record.clone());
        QUERY_SUBMITTED_TOTAL.inc();
        ACTIVE_QUERIES.inc();
        RETAINED_QUERIES.set(self.records.len() as i64);

        let worker = Worker {
            record,
            cache: self.cache.clone(),
            backend: self.backend.clone(),
            workers: self.workers.clone(),
            config: self.config.clone(),
        };
        runtime.spawn(worker.run());

        log::info!("Query {} submitted", id);
        Ok(id)
    }

    /// 提交前的同步校验
    fn validate_spec(spec: &QuerySpecification) -> Result<()> {
        if let Some(field) = spec.model_key.missing_field() {
            return Err(MqlError::Validation(format!(
                "model_key.{} must not be empty",
                field
            )));
        }
        if spec.metrics.is_empty() {
            return Err(MqlError::Validation(
                "at least one metric is required".to_string(),
            ));
        }
        if spec.metrics.iter().any(|m| m.trim().is_empty()) {
            return Err(MqlError::Validation(
                "metric names must not be empty".to_string(),
            ));
        }
        if spec.group_by.iter().any(|d| d.trim().is_empty()) {
            return Err(MqlError::Validation(
                "group_by dimension names must not be empty".to_string(),
            ));
        }
        // 指纹和执行使用同一份名称，这里只接受规范写法
        if let Some(name) = spec
            .metrics
            .iter()
            .chain(spec.group_by.iter())
            .find(|n| n.trim() != n.as_str())
        {
            return Err(MqlError::Validation(format!(
                "name '{}' has leading or trailing whitespace",
                name
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = spec.group_by.iter().find(|d| !seen.insert(d.as_str())) {
            return Err(MqlError::Validation(format!(
                "group_by dimension '{}' is listed more than once",
                dup
            )));
        }
        if let Some(node) = &spec.where_constraint {
            validate(node)?;
        }
        spec.parsed_post_processors().map_err(MqlError::Validation)?;
        Ok(())
    }

    fn record(&self, id: &QueryId) -> Result<Arc<QueryRecord>> {
        if let Some(record) = self.records.get(id) {
            return Ok(record.value().clone());
        }
        if self.tombstones.contains_key(id) {
            return Err(MqlError::Expired(id.to_string()));
        }
        Err(MqlError::NotFound(id.to_string()))
    }

    /// 查询状态
    pub fn status(&self, id: &QueryId) -> Result<MqlQueryStatus> {
        Ok(self.record(id)?.status())
    }

    /// 完整记录快照
    pub fn get(&self, id: &QueryId) -> Result<MqlQuery> {
        Ok(self.record(id)?.snapshot())
    }

    /// 查询结果（仅 SUCCESSFUL）
    pub fn result(&self, id: &QueryId) -> Result<Arc<ResultTable>> {
        let record = self.record(id)?;
        match record.status() {
            MqlQueryStatus::Successful => record.result().ok_or_else(|| {
                MqlError::Internal(format!("Query {} succeeded without a result", id))
            }),
            status @ (MqlQueryStatus::Pending
            | MqlQueryStatus::Running
            | MqlQueryStatus::Unknown) => Err(MqlError::NotReady {
                id: id.to_string(),
                status,
            }),
            status @ (MqlQueryStatus::Failed | MqlQueryStatus::UnhandledException) => {
                let detail = record
                    .error()
                    .or_else(|| record.log.last_error())
                    .unwrap_or_else(|| "no error detail recorded".to_string());
                Err(MqlError::QueryFailed {
                    id: id.to_string(),
                    status,
                    detail,
                })
            }
        }
    }

    /// 查询日志（换行连接）
    pub fn logs(
        &self,
        id: &QueryId,
        from_line: Option<usize>,
        max_lines: Option<usize>,
    ) -> Result<String> {
        let record = self.record(id)?;
        Ok(record
            .log
            .slice(from_line.unwrap_or(0), max_lines)
            .join("\n"))
    }

    /// 查询列表（最新在前）
    pub fn list(&self, active_only: bool, limit: Option<usize>) -> Vec<MqlQuerySummary> {
        let mut records: Vec<Arc<QueryRecord>> = self
            .records
            .iter()
            .map(|r| r.value().clone())
            .filter(|r| !active_only || r.status().is_active())
            .collect();
        records.sort_by(|a, b| b.seq.cmp(&a.seq));

        records
            .iter()
            .take(limit.unwrap_or(self.config.default_list_limit))
            .map(|r| r.summary())
            .collect()
    }

    /// 等待查询进入终态
    pub async fn wait(&self, id: &QueryId) -> Result<MqlQueryStatus> {
        let record = self.record(id)?;
        let mut rx = record.subscribe();
        let status = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => record.status(),
        };
        Ok(status)
    }

    /// 清理超过保留期的终态记录
    ///
    /// 返回本次清理的记录数。
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.retention();

        let mut evicted = Vec::new();
        self.records.retain(|id, record| match record.terminal_age(now) {
            Some(age) if age >= retention => {
                evicted.push(id.clone());
                false
            }
            _ => true,
        });
        for id in &evicted {
            self.tombstones.insert(id.clone(), now);
            log::debug!("Query {} evicted after retention", id);
        }

        let tombstone_retention = self.config.tombstone_retention();
        self.tombstones
            .retain(|_, evicted_at| now.saturating_duration_since(*evicted_at) < tombstone_retention);

        if !evicted.is_empty() {
            QUERY_EVICTED_TOTAL.inc_by(evicted.len() as u64);
            log::info!(
                "Swept {} expired queries ({} retained)",
                evicted.len(),
                self.records.len()
            );
        }
        RETAINED_QUERIES.set(self.records.len() as i64);
        evicted.len()
    }

    /// 启动后台清理任务
    ///
    /// 管理器被释放后任务自动退出。
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(manager) => {
                        manager.sweep();
                    }
                    None => break,
                }
            }
            log::debug!("Query sweeper stopped");
        })
    }

    /// worker 池健康状态
    pub fn ping_workers(&self) -> std::result::Result<(), String> {
        if self.workers.is_closed() {
            return Err("query worker pool is shut down".to_string());
        }
        Ok(())
    }

    /// 空闲 worker 数
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// 关闭 worker 池，之后提交的查询直接失败
    pub fn shutdown(&self) {
        self.workers.close();
        log::info!("QueryManager worker pool closed");
    }

    pub fn retained(&self) -> usize {
        self.records.len()
    }
}

/// 单个查询的执行任务
#[derive(Clone)]
struct Worker {
    record: Arc<QueryRecord>,
    cache: Arc<CacheStore>,
    backend: Arc<dyn QueryBackend>,
    workers: Arc<Semaphore>,
    config: ManagerConfig,
}

/// 受保护段的结果
enum Processed {
    /// 记录已进入终态
    Done,
    /// 后端不可达，需要对账
    Unreachable(String),
}

impl Worker {
    async fn run(self) {
        let permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.record.log.error("Query worker pool is shut down");
                let _ = self
                    .record
                    .fail(MqlQueryStatus::Failed, "query worker pool is shut down");
                return;
            }
        };

        if self.record.transition(MqlQueryStatus::Running).is_err() {
            return;
        }
        self.record.log.info("Query running");

        // 从读缓存到写缓存整段在独立任务里运行，任何 panic 都落到 UNHANDLED_EXCEPTION
        let guarded = {
            let worker = self.clone();
            tokio::spawn(async move { worker.process().await }).await
        };

        match guarded {
            Ok(Processed::Done) => {}
            Ok(Processed::Unreachable(msg)) => {
                self.record
                    .log
                    .warn(format!("Execution backend unreachable: {}", msg));
                let _ = self.record.transition(MqlQueryStatus::Unknown);
                // 对账期间不占用 worker
                drop(permit);
                self.reconcile(msg).await;
            }
            Err(join_err) => {
                let detail = if join_err.is_panic() {
                    format!("execution panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    format!("execution task cancelled: {}", join_err)
                };
                log::error!("[{}] {}", self.record.id, detail);
                self.record.log.error(&detail);
                let _ = self
                    .record
                    .fail(MqlQueryStatus::UnhandledException, detail);
            }
        }
    }

    /// 读缓存、执行、后处理、写缓存
    async fn process(&self) -> Processed {
        let mode = self.record.spec.cache_mode;
        if mode.reads() {
            match self.cache.get(&self.record.fingerprint).await {
                Ok(Some(entry)) => {
                    self.record.log.info(format!(
                        "Cache hit ({} rows, cached at {})",
                        entry.payload.row_count,
                        entry.created_at.to_rfc3339()
                    ));
                    let _ = self.record.succeed(entry.payload.table.clone());
                    return Processed::Done;
                }
                Ok(None) => self.record.log.info("Cache miss"),
                Err(e) => {
                    // 缓存读失败按未命中处理
                    log::warn!("[{}] Cache read failed: {}", self.record.id, e);
                    self.record
                        .log
                        .warn(format!("Cache read failed, executing anyway: {}", e));
                }
            }
        }

        let timer = Timer::new(QUERY_EXECUTION_LATENCY.clone());
        let outcome = self
            .backend
            .execute(&self.record.spec, &self.record.log)
            .await
            .and_then(|table| {
                table
                    .validate()
                    .map(|()| table)
                    .map_err(|e| ExecutionError::Internal(format!("malformed result table: {}", e)))
            });
        timer.observe();

        match outcome {
            Ok(mut table) => {
                let processors = self.record.spec.parsed_post_processors().unwrap_or_default();
                if !processors.is_empty() {
                    apply_post_processors(&mut table, &processors);
                    self.record.log.info(format!(
                        "Applied post processors: {}",
                        self.record.spec.post_processors.join(", ")
                    ));
                }

                let table = Arc::new(table);
                if mode.writes() {
                    match self
                        .cache
                        .put(self.record.fingerprint.clone(), table.clone())
                        .await
                    {
                        Ok(()) => self.record.log.info("Result cached"),
                        Err(e) => {
                            log::warn!("[{}] Cache write failed: {}", self.record.id, e);
                            self.record.log.warn(format!("Cache write failed: {}", e));
                        }
                    }
                }

                self.record.log.info(format!(
                    "Query completed with {} row(s)",
                    table.row_count()
                ));
                let _ = self.record.succeed(table);
            }
            Err(ExecutionError::Query(msg)) => {
                self.record.log.error(format!("Query failed: {}", msg));
                let _ = self.record.fail(MqlQueryStatus::Failed, msg);
            }
            Err(ExecutionError::Internal(msg)) => {
                log::error!("[{}] Unhandled execution error: {}", self.record.id, msg);
                self.record
                    .log
                    .error(format!("Unhandled execution error: {}", msg));
                let _ = self
                    .record
                    .fail(MqlQueryStatus::UnhandledException, msg);
            }
            Err(ExecutionError::Unreachable(msg)) => return Processed::Unreachable(msg),
        }
        Processed::Done
    }

    /// UNKNOWN 状态对账
    ///
    /// 周期性探测后端；恢复连通或超时后都以 FAILED 结束，不会自动重跑。
    async fn reconcile(&self, cause: String) {
        let deadline = Instant::now() + self.config.reconcile_timeout();
        loop {
            tokio::time::sleep(self.config.reconcile_interval()).await;
            match self.backend.ping().await {
                Ok(()) => {
                    let detail = format!(
                        "backend reachable again but the outcome of the interrupted execution is unknown ({})",
                        cause
                    );
                    self.record.log.error(format!("Reconciled to FAILED: {}", detail));
                    let _ = self.record.fail(MqlQueryStatus::Failed, detail);
                    return;
                }
                Err(e) if Instant::now() >= deadline => {
                    let detail = format!(
                        "backend still unreachable after {}s: {}",
                        self.config.reconcile_timeout_secs, e
                    );
                    self.record.log.error(format!("Reconciled to FAILED: {}", detail));
                    let _ = self.record.fail(MqlQueryStatus::Failed, detail);
                    return;
                }
                Err(e) => {
                    log::debug!("[{}] Backend still unreachable: {}", self.record.id, e);
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
