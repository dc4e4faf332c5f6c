//! HTTP API 请求/响应模型

use crate::cache::CacheMode;
use crate::model::{MqlQueryStatus, QueryId, QuerySpecification};
use serde::{Deserialize, Serialize};

/// 通用响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// API 错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u32,
    pub message: String,
    /// 与查询状态相关的错误（未就绪 / 执行失败）附带当前状态
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_status: Option<MqlQueryStatus>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: u32, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message,
                query_status: None,
            }),
        }
    }

    pub fn query_error(code: u32, message: String, status: MqlQueryStatus) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message,
                query_status: Some(status),
            }),
        }
    }
}

/// 提交查询响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitQueryResponse {
    pub query_id: QueryId,
}

/// 查询状态响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStatusResponse {
    pub query_id: QueryId,
    pub status: MqlQueryStatus,
}

/// 查询列表参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQueriesParams {
    #[serde(default)]
    pub active_only: bool,
    pub limit: Option<usize>,
}

/// 表格结果参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TabularParams {
    pub cursor: Option<String>,
    pub orient: Option<String>,
}

/// 日志参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsParams {
    pub from_line: Option<usize>,
    pub max_lines: Option<usize>,
}

/// 日志响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub query_id: QueryId,
    pub logs: String,
}

/// 物化请求
#[derive(Debug, Clone, Deserialize)]
pub struct MaterializeRequest {
    pub spec: QuerySpecification,
    #[serde(default)]
    pub as_table: Option<String>,
    /// 不填则沿用 spec.cache_mode
    #[serde(default)]
    pub cache_mode: Option<CacheMode>,
}

/// 清空缓存请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DropCacheRequest {
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

/// 清空缓存响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropCacheResponse {
    pub success: bool,
    pub removed: usize,
}
