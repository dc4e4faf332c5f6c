//! Prometheus 指标导出模块
//!
//! 提供引擎级监控指标，包括：
//! - 查询提交/完成数量与执行延迟
//! - 缓存命中、写入、清空
//! - 健康探测失败
//! - 物化表写入

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// 全局 Prometheus Registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ═══════════════════════════════════════════════════════════════════
    // 查询生命周期指标
    // ═══════════════════════════════════════════════════════════════════

    /// 提交的查询总数
    pub static ref QUERY_SUBMITTED_TOTAL: IntCounter = IntCounter::new(
        "mql_query_submitted_total", "Total number of submitted queries"
    ).expect("Failed to create QUERY_SUBMITTED_TOTAL metric");

    /// 完成的查询总数（按终态）
    pub static ref QUERY_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mql_query_completed_total", "Total number of queries reaching a terminal status"),
        &["status"]
    ).expect("Failed to create QUERY_COMPLETED_TOTAL metric");

    /// 查询执行延迟 (毫秒)
    pub static ref QUERY_EXECUTION_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new("mql_query_execution_latency_ms", "Query execution latency in milliseconds")
            .buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0, 120000.0])
    ).expect("Failed to create QUERY_EXECUTION_LATENCY metric");

    /// 当前 PENDING/RUNNING 查询数
    pub static ref ACTIVE_QUERIES: IntGauge = IntGauge::new(
        "mql_active_queries", "Number of pending or running queries"
    ).expect("Failed to create ACTIVE_QUERIES metric");

    /// 保留期内的查询记录数
    pub static ref RETAINED_QUERIES: IntGauge = IntGauge::new(
        "mql_retained_queries", "Number of query records held in memory"
    ).expect("Failed to create RETAINED_QUERIES metric");

    /// 过期清理的查询数
    pub static ref QUERY_EVICTED_TOTAL: IntCounter = IntCounter::new(
        "mql_query_evicted_total", "Total number of query records evicted after retention"
    ).expect("Failed to create QUERY_EVICTED_TOTAL metric");

    // ═══════════════════════════════════════════════════════════════════
    // 缓存指标
    // ═══════════════════════════════════════════════════════════════════

    /// 缓存查询（hit / miss / error）
    pub static ref CACHE_LOOKUP_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mql_cache_lookup_total", "Cache lookups by outcome"),
        &["result"]
    ).expect("Failed to create CACHE_LOOKUP_TOTAL metric");

    /// 缓存写入（ok / error）
    pub static ref CACHE_WRITE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mql_cache_write_total", "Cache writes by outcome"),
        &["result"]
    ).expect("Failed to create CACHE_WRITE_TOTAL metric");

    /// 缓存清空（dropped / rejected）
    pub static ref CACHE_DROP_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mql_cache_drop_total", "Cache drop requests by outcome"),
        &["result"]
    ).expect("Failed to create CACHE_DROP_TOTAL metric");

    /// 当前缓存条目数
    pub static ref CACHE_ENTRIES: IntGauge = IntGauge::new(
        "mql_cache_entries", "Current number of cache entries"
    ).expect("Failed to create CACHE_ENTRIES metric");

    // ═══════════════════════════════════════════════════════════════════
    // 健康检查 / 物化指标
    // ═══════════════════════════════════════════════════════════════════

    /// 健康探测失败次数
    pub static ref HEALTH_PROBE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("mql_health_probe_failures_total", "Health probe failures by component"),
        &["component"]
    ).expect("Failed to create HEALTH_PROBE_FAILURES metric");

    /// 物化请求（ok / error）
    pub static ref MATERIALIZE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mql_materialize_total", "Materialize requests by outcome"),
        &["result"]
    ).expect("Failed to create MATERIALIZE_TOTAL metric");
}

/// 初始化所有指标到 Registry
pub fn init_metrics() {
    // 查询指标
    REGISTRY.register(Box::new(QUERY_SUBMITTED_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(QUERY_COMPLETED_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(QUERY_EXECUTION_LATENCY.clone())).ok();
    REGISTRY.register(Box::new(ACTIVE_QUERIES.clone())).ok();
    REGISTRY.register(Box::new(RETAINED_QUERIES.clone())).ok();
    REGISTRY.register(Box::new(QUERY_EVICTED_TOTAL.clone())).ok();

    // 缓存指标
    REGISTRY.register(Box::new(CACHE_LOOKUP_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(CACHE_WRITE_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(CACHE_DROP_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(CACHE_ENTRIES.clone())).ok();

    // 健康 / 物化
    REGISTRY.register(Box::new(HEALTH_PROBE_FAILURES.clone())).ok();
    REGISTRY.register(Box::new(MATERIALIZE_TOTAL.clone())).ok();

    log::info!("Prometheus metrics initialized");
}

/// 导出指标为 Prometheus 文本格式
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        log::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// 毫秒计时器
pub struct Timer {
    start: std::time::Instant,
    histogram: Histogram,
}

impl Timer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: std::time::Instant::now(),
            histogram,
        }
    }

    pub fn observe(self) {
        let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
        self.histogram.observe(elapsed);
    }
}
