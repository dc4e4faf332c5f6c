//! 查询生命周期模型

use super::key::ModelKey;
use super::result::ResultTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 一次性查询 ID（在保留期后失效）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    /// 生成新的查询 ID：`mql_` + uuid v4
    pub fn generate() -> Self {
        Self(format!("mql_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for QueryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 查询状态
///
/// ```text
/// PENDING ──→ RUNNING ──→ SUCCESSFUL
///    │           ├──────→ FAILED
///    │           └──────→ UNHANDLED_EXCEPTION
///    └─────┬─────┘
///          ↓ (后端不可达)
///       UNKNOWN ──→ FAILED (对账/超时)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MqlQueryStatus {
    Pending,
    Running,
    Successful,
    Failed,
    UnhandledException,
    Unknown,
}

impl MqlQueryStatus {
    /// 终态不可再迁移
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MqlQueryStatus::Successful | MqlQueryStatus::Failed | MqlQueryStatus::UnhandledException
        )
    }

    /// 活跃状态（list 的 active_only 过滤）
    pub fn is_active(&self) -> bool {
        matches!(self, MqlQueryStatus::Pending | MqlQueryStatus::Running)
    }

    /// 状态迁移是否合法
    pub fn can_transition_to(&self, next: MqlQueryStatus) -> bool {
        use MqlQueryStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Pending, Unknown) | (Running, Unknown) => true,
            (Running, Successful) | (Running, Failed) | (Running, UnhandledException) => true,
            // 失败可以发生在真正开始执行之前（例如 worker 池关闭）
            (Pending, Failed) | (Pending, UnhandledException) => true,
            (Unknown, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MqlQueryStatus::Pending => "PENDING",
            MqlQueryStatus::Running => "RUNNING",
            MqlQueryStatus::Successful => "SUCCESSFUL",
            MqlQueryStatus::Failed => "FAILED",
            MqlQueryStatus::UnhandledException => "UNHANDLED_EXCEPTION",
            MqlQueryStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MqlQueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 查询记录快照（对外只读视图）
#[derive(Debug, Clone, Serialize)]
pub struct MqlQuery {
    pub id: QueryId,
    pub model_key: ModelKey,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub status: MqlQueryStatus,
    #[serde(skip)]
    pub result: Option<Arc<ResultTable>>,
    pub logs: Vec<String>,
    pub error: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// 列表摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqlQuerySummary {
    pub id: QueryId,
    pub model_key: ModelKey,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub status: MqlQueryStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}
