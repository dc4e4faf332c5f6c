//! 执行后端接口
//!
//! 指标到数仓查询的编译/执行是外部协作者，这里只定义边界。

use super::log::QueryLog;
use crate::model::{QuerySpecification, ResultTable};
use async_trait::async_trait;
use thiserror::Error;

/// 执行错误
///
/// 三类错误对应三种不同的查询状态：
/// - `Query` → FAILED（预期内的失败，例如未知维度）
/// - `Unreachable` → UNKNOWN（后端不可达，需要对账）
/// - `Internal` → UNHANDLED_EXCEPTION（意外的内部故障）
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Query(String),

    #[error("execution backend unreachable: {0}")]
    Unreachable(String),

    #[error("internal execution fault: {0}")]
    Internal(String),
}

/// 执行后端
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// 后端名称（健康检查/日志）
    fn name(&self) -> &str;

    /// 执行查询，过程日志写入 `log`
    async fn execute(
        &self,
        spec: &QuerySpecification,
        log: &QueryLog,
    ) -> Result<ResultTable, ExecutionError>;

    /// 连通性探测
    async fn ping(&self) -> Result<(), ExecutionError>;
}
