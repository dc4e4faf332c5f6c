//! 进程级结果缓存
//!
//! - 后端可插拔（`CacheBackend`），默认 DashMap 内存实现
//! - 同一指纹并发写入：整条记录 `Arc` 替换，最后写入者胜出，不会出现部分写入
//! - `drop_all` 与所有进行中的 `put` 互斥（全局写屏障），清空后不会被旧写入"复活"
//! - `drop_all` 必须携带与配置一致的确认令牌，否则整体拒绝

use super::fingerprint::Fingerprint;
use crate::model::ResultTable;
use crate::observability::metrics::{CACHE_DROP_TOTAL, CACHE_ENTRIES, CACHE_LOOKUP_TOTAL, CACHE_WRITE_TOTAL};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// 缓存错误
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache payload serialization failed: {0}")]
    Serialization(String),
}

/// 缓存内容：结果表 + 元数据
#[derive(Debug, Clone)]
pub struct CachePayload {
    pub table: Arc<ResultTable>,
    pub row_count: usize,
}

impl CachePayload {
    pub fn new(table: Arc<ResultTable>) -> Self {
        let row_count = table.row_count();
        Self { table, row_count }
    }
}

/// 缓存条目（由 CacheStore 独占）
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub payload: CachePayload,
    pub created_at: DateTime<Utc>,
}

/// 缓存后端接口
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// 后端名称（健康检查/日志）
    fn name(&self) -> &str;

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Arc<CacheEntry>>, CacheError>;

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// 清空全部条目，返回删除数量
    async fn clear(&self) -> Result<usize, CacheError>;

    async fn len(&self) -> Result<usize, CacheError>;

    /// 连通性探测
    async fn ping(&self) -> Result<(), CacheError>;
}

/// 内存缓存后端
pub struct MemoryCacheBackend {
    /// fingerprint -> entry
    entries: DashMap<Fingerprint, Arc<CacheEntry>>,

    /// 最大条目数（超过时淘汰最早写入的条目）
    max_entries: usize,

    /// 条目生存时间（None 表示永不过期）
    ttl: Option<Duration>,
}

impl MemoryCacheBackend {
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = Utc::now().signed_duration_since(entry.created_at);
                age.to_std().map(|age| age >= ttl).unwrap_or(false)
            }
            None => false,
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().created_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            log::debug!("Cache evicted oldest entry {}", key.short());
        }
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new(10_000, None)
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        if let Some(entry) = self.entries.get(fingerprint) {
            if !self.is_expired(entry.value()) {
                return Ok(Some(entry.value().clone()));
            }
            // 过期，删除
            drop(entry);
            self.entries.remove(fingerprint);
        }
        Ok(None)
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        if !self.entries.contains_key(&entry.fingerprint) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(entry.fingerprint.clone(), Arc::new(entry));
        Ok(())
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// drop_all 结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DropOutcome {
    Dropped { removed: usize },
    Rejected { reason: String },
}

impl DropOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DropOutcome::Dropped { .. })
    }
}

/// 缓存统计
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    writes: AtomicU64,
    clears: AtomicU64,
}

/// 缓存统计快照
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub writes: u64,
    pub clears: u64,
}

impl CacheStatsSnapshot {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            return 0.0;
        }
        self.hits as f64 / (self.hits + self.misses) as f64
    }
}

/// 缓存存储（进程内唯一所有者）
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,

    /// 全局写屏障：put 持读锁，drop_all 持写锁
    barrier: RwLock<()>,

    /// drop_all 确认令牌（None 表示禁用 drop_all）
    confirmation_token: Option<String>,

    stats: CacheStats,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, confirmation_token: Option<String>) -> Self {
        Self {
            backend,
            barrier: RwLock::new(()),
            confirmation_token: confirmation_token.filter(|t| !t.is_empty()),
            stats: CacheStats::default(),
        }
    }

    /// 内存后端的便捷构造
    pub fn in_memory(confirmation_token: impl Into<String>) -> Self {
        Self::new(
            Arc::new(MemoryCacheBackend::default()),
            Some(confirmation_token.into()),
        )
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// 查询缓存
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        match self.backend.get(fingerprint).await {
            Ok(Some(entry)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                CACHE_LOOKUP_TOTAL.with_label_values(&["hit"]).inc();
                Ok(Some(entry))
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                CACHE_LOOKUP_TOTAL.with_label_values(&["miss"]).inc();
                Ok(None)
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                CACHE_LOOKUP_TOTAL.with_label_values(&["error"]).inc();
                Err(e)
            }
        }
    }

    /// 写入缓存
    pub async fn put(&self, fingerprint: Fingerprint, table: Arc<ResultTable>) -> Result<(), CacheError> {
        let _guard = self.barrier.read().await;

        let entry = CacheEntry {
            fingerprint,
            payload: CachePayload::new(table),
            created_at: Utc::now(),
        };
        match self.backend.put(entry).await {
            Ok(()) => {
                self.stats.writes.fetch_add(1, Ordering::Relaxed);
                CACHE_WRITE_TOTAL.with_label_values(&["ok"]).inc();
                if let Ok(len) = self.backend.len().await {
                    CACHE_ENTRIES.set(len as i64);
                }
                Ok(())
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                CACHE_WRITE_TOTAL.with_label_values(&["error"]).inc();
                Err(e)
            }
        }
    }

    /// 清空全部缓存
    ///
    /// 令牌缺失或不匹配时整体拒绝，不做任何删除。
    pub async fn drop_all(&self, confirmation_token: Option<&str>) -> Result<DropOutcome, CacheError> {
        let expected = match &self.confirmation_token {
            Some(t) => t,
            None => {
                CACHE_DROP_TOTAL.with_label_values(&["rejected"]).inc();
                return Ok(DropOutcome::Rejected {
                    reason: "cache drop is disabled (no confirmation token configured)".to_string(),
                });
            }
        };

        let supplied = match confirmation_token {
            Some(t) if !t.is_empty() => t,
            _ => {
                log::warn!("Cache drop rejected: confirmation token missing");
                CACHE_DROP_TOTAL.with_label_values(&["rejected"]).inc();
                return Ok(DropOutcome::Rejected {
                    reason: "confirmation token missing".to_string(),
                });
            }
        };

        if !tokens_match(supplied, expected) {
            log::warn!("Cache drop rejected: confirmation token mismatch");
            CACHE_DROP_TOTAL.with_label_values(&["rejected"]).inc();
            return Ok(DropOutcome::Rejected {
                reason: "confirmation token mismatch".to_string(),
            });
        }

        // 等待所有进行中的 put 完成，并阻止新的 put
        let _guard = self.barrier.write().await;
        let removed = self.backend.clear().await?;

        self.stats.clears.fetch_add(1, Ordering::Relaxed);
        CACHE_DROP_TOTAL.with_label_values(&["dropped"]).inc();
        CACHE_ENTRIES.set(0);
        log::warn!("Cache dropped: {} entries removed", removed);

        Ok(DropOutcome::Dropped { removed })
    }

    pub async fn len(&self) -> Result<usize, CacheError> {
        self.backend.len().await
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.backend.ping().await
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            writes: self.stats.writes.load(Ordering::Relaxed),
            clears: self.stats.clears.load(Ordering::Relaxed),
        }
    }
}

/// 逐字节比较全部内容，不因首个差异提前返回
fn tokens_match(supplied: &str, expected: &str) -> bool {
    let a = supplied.as_bytes();
    let b = expected.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResultColumn, ResultTable};
    use serde_json::json;

    fn table(v: f64) -> Arc<ResultTable> {
        let mut t = ResultTable::new(vec![ResultColumn::metric("revenue")]);
        t.push_row(vec![json!(v)]).unwrap();
        Arc::new(t)
    }

    #[tokio::test]
    async fn test_get_put() {
        let store = CacheStore::in_memory("secret");
        let fp = Fingerprint::from("abc");

        assert!(store.get(&fp).await.unwrap().is_none());
        store.put(fp.clone(), table(1.0)).await.unwrap();

        let entry = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.payload.row_count, 1);

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = CacheStore::in_memory("secret");
        let fp = Fingerprint::from("abc");
        store.put(fp.clone(), table(1.0)).await.unwrap();
        store.put(fp.clone(), table(2.0)).await.unwrap();

        let entry = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.payload.table.rows[0][0], json!(2.0));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drop_requires_token() {
        let store = CacheStore::in_memory("secret");
        store.put(Fingerprint::from("a"), table(1.0)).await.unwrap();
        store.put(Fingerprint::from("b"), table(2.0)).await.unwrap();

        let missing = store.drop_all(None).await.unwrap();
        assert!(!missing.is_success());
        let wrong = store.drop_all(Some("secreT")).await.unwrap();
        assert!(!wrong.is_success());
        assert_eq!(store.len().await.unwrap(), 2);

        let ok = store.drop_all(Some("secret")).await.unwrap();
        assert_eq!(ok, DropOutcome::Dropped { removed: 2 });
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_disabled_without_configured_token() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::default()), None);
        store.put(Fingerprint::from("a"), table(1.0)).await.unwrap();
        assert!(!store.drop_all(Some("")).await.unwrap().is_success());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_max_entries_evicts_oldest() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::new(2, None)), None);
        store.put(Fingerprint::from("a"), table(1.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.put(Fingerprint::from("b"), table(2.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.put(Fingerprint::from("c"), table(3.0)).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 2);
        assert!(store.get(&Fingerprint::from("a")).await.unwrap().is_none());
        assert!(store.get(&Fingerprint::from("c")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let backend = MemoryCacheBackend::new(10, Some(Duration::from_millis(20)));
        let store = CacheStore::new(Arc::new(backend), None);
        let fp = Fingerprint::from("a");
        store.put(fp.clone(), table(1.0)).await.unwrap();
        assert!(store.get(&fp).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(&fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_fingerprint() {
        let store = Arc::new(CacheStore::in_memory("secret"));
        let fp = Fingerprint::from("shared");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let fp = fp.clone();
                tokio::spawn(async move { store.put(fp, table(i as f64)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let entry = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.payload.row_count, 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    /// put 会停在闸门上，直到测试放行
    struct GatedBackend {
        inner: MemoryCacheBackend,
        entered: Arc<tokio::sync::Notify>,
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl CacheBackend for GatedBackend {
        fn name(&self) -> &str {
            "gated"
        }

        async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Arc<CacheEntry>>, CacheError> {
            self.inner.get(fingerprint).await
        }

        async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
            self.entered.notify_one();
            self.gate.acquire().await.unwrap().forget();
            self.inner.put(entry).await
        }

        async fn clear(&self) -> Result<usize, CacheError> {
            self.inner.clear().await
        }

        async fn len(&self) -> Result<usize, CacheError> {
            self.inner.len().await
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drop_all_waits_for_in_flight_put() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let backend = Arc::new(GatedBackend {
            inner: MemoryCacheBackend::default(),
            entered: entered.clone(),
            gate: gate.clone(),
        });
        let store = Arc::new(CacheStore::new(backend, Some("secret".to_string())));

        let s = store.clone();
        let put = tokio::spawn(async move { s.put(Fingerprint::from("a"), table(1.0)).await });
        entered.notified().await;

        let s = store.clone();
        let drop_all = tokio::spawn(async move { s.drop_all(Some("secret")).await });
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        // put 仍持有写屏障的读锁
        assert!(!drop_all.is_finished());
        assert!(!put.is_finished());

        gate.add_permits(1);
        put.await.unwrap().unwrap();
        match drop_all.await.unwrap().unwrap() {
            DropOutcome::Dropped { removed } => assert_eq!(removed, 1),
            other => panic!("expected drop, got {:?}", other),
        }
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(store.get(&Fingerprint::from("a")).await.unwrap().is_none());
    }
}
