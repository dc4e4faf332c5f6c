//! # MQLSERVER-RS
//!
//! 指标查询（MQL）执行与缓存引擎
//!
//! ## 核心能力
//!
//! - **查询生命周期**: 提交/状态/结果/日志/列表，异步执行 + 轮询
//! - **结果缓存**: 基于查询指纹的缓存，READ/READWRITE/WRITE/IGNORE 四种模式
//! - **过滤条件树**: AND/OR 嵌套的 SET / RANGE 约束，规范化 + 求值
//! - **结果物化**: 时间序列视图、分页 base64 表格、外部表持久化
//! - **健康检查**: 各依赖子系统独立探测，带超时
//! - **对外服务**: HTTP API (基于 Actix-web)
//!
//! ## 架构设计
//!
//! ```text
//! 客户端 (HTTP)
//!     ↓
//! Service Layer (service/)
//!     ↓
//! MqlEngine (engine.rs)
//!     ↓
//! QueryManager (manager/) ──→ CacheStore (cache/) ←── Fingerprinter
//!     ↓                              ↑
//! QueryBackend (execution/)    ConstraintEvaluator (constraint/)
//!     ↓
//! ResultMaterializer (materialize/) ──→ TableStore
//! ```

// ============================================================================
// 内部模块
// ============================================================================

/// 数据模型（查询规格、生命周期记录、结果序列）
pub mod model;

/// 过滤条件树：校验 / 规范化 / 求值
pub mod constraint;

/// 结果缓存与查询指纹
pub mod cache;

/// 执行后端（外部协作者接口 + Parquet 参考实现）
pub mod execution;

/// 查询生命周期管理
pub mod manager;

/// 结果物化（序列 / 表格分页 / 外部表）
pub mod materialize;

/// 健康检查聚合
pub mod health;

/// 引擎门面
pub mod engine;

/// 对外服务层 (HTTP)
pub mod service;

/// 工具模块
pub mod utils;

/// 可观测性模块 (Prometheus)
pub mod observability;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use cache::{CacheMode, CacheStore, Fingerprint};
pub use constraint::{AtomicConstraint, AtomicConstraintType, ConstraintNode};
pub use engine::MqlEngine;
pub use manager::QueryManager;
pub use model::{
    ModelKey, MqlQuery, MqlQueryResultSeries, MqlQueryStatus, QueryId, QuerySpecification,
    ResultDatum, ResultTable,
};

// ============================================================================
// 全局错误类型
// ============================================================================

/// 引擎错误类型
///
/// 每个变体对调用方都是可区分的，HTTP 层按变体映射状态码。
#[derive(Debug, thiserror::Error)]
pub enum MqlError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query not found: {0}")]
    NotFound(String),

    #[error("Query expired: {0}")]
    Expired(String),

    #[error("Query {id} not ready (status {status})")]
    NotReady { id: String, status: MqlQueryStatus },

    #[error("Query {id} ended with {status}: {detail}")]
    QueryFailed {
        id: String,
        status: MqlQueryStatus,
        detail: String,
    },

    #[error("Cache drop rejected: {0}")]
    CacheRejected(String),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Table store error: {0}")]
    TableStore(#[from] materialize::TableStoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<constraint::ConstraintError> for MqlError {
    fn from(e: constraint::ConstraintError) -> Self {
        MqlError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MqlError>;
