//! HTTP API 请求处理器

use actix_web::{web, HttpResponse, Result};
use std::sync::Arc;

use super::models::*;
use crate::engine::MqlEngine;
use crate::health::all_healthy;
use crate::materialize::Orient;
use crate::model::{QueryId, QuerySpecification};
use crate::observability::export_metrics;
use crate::MqlError;

/// 应用状态
pub struct AppState {
    pub engine: Arc<MqlEngine>,
}

/// 引擎错误 → HTTP 响应
///
/// 每类错误映射到不同的状态码，调用方可以区分。
pub fn error_response(e: &MqlError) -> HttpResponse {
    match e {
        MqlError::Validation(_) => {
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, e.to_string()))
        }
        MqlError::NotFound(_) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error(404, e.to_string()))
        }
        MqlError::Expired(_) => {
            HttpResponse::Gone().json(ApiResponse::<()>::error(410, e.to_string()))
        }
        MqlError::NotReady { status, .. } => HttpResponse::Accepted().json(
            ApiResponse::<()>::query_error(202, e.to_string(), *status),
        ),
        MqlError::QueryFailed { status, .. } => HttpResponse::UnprocessableEntity().json(
            ApiResponse::<()>::query_error(422, e.to_string(), *status),
        ),
        MqlError::CacheRejected(_) => {
            HttpResponse::Forbidden().json(ApiResponse::<()>::error(403, e.to_string()))
        }
        MqlError::Cache(_) => HttpResponse::ServiceUnavailable()
            .json(ApiResponse::<()>::error(503, e.to_string())),
        MqlError::TableStore(_) | MqlError::Config(_) | MqlError::Internal(_) => {
            log::error!("Internal error: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<()>::error(500, e.to_string()))
        }
    }
}

/// 健康检查
pub async fn health_check(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let items = state.engine.health_report().await;
    let healthy = all_healthy(&items);
    let body = ApiResponse::success(serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "service": "mql-server",
        "items": items,
    }));
    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Prometheus 指标
pub async fn metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(export_metrics())
}

/// 提交查询
pub async fn submit_query(
    req: web::Json<QuerySpecification>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    match state.engine.submit_query(req.into_inner()) {
        Ok(query_id) => {
            log::info!("Query submitted via HTTP: {}", query_id);
            Ok(HttpResponse::Ok().json(ApiResponse::success(SubmitQueryResponse { query_id })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// 查询列表
pub async fn list_queries(
    params: web::Query<ListQueriesParams>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    let summaries = state.engine.list_queries(params.active_only, params.limit);
    Ok(HttpResponse::Ok().json(ApiResponse::success(summaries)))
}

/// 查询状态
pub async fn query_status(
    path: web::Path<String>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    let query_id = QueryId::from(path.into_inner());
    match state.engine.get_query_status(&query_id) {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success(QueryStatusResponse {
            query_id,
            status,
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 查询结果（序列）
pub async fn query_result(
    path: web::Path<String>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    let query_id = QueryId::from(path.into_inner());
    match state.engine.get_query_result(&query_id) {
        Ok(series) => Ok(HttpResponse::Ok().json(ApiResponse::success(series))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 查询结果（分页表格）
pub async fn query_result_tabular(
    path: web::Path<String>,
    params: web::Query<TabularParams>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    let query_id = QueryId::from(path.into_inner());
    let orient = match params.orient.as_deref() {
        Some(raw) => match raw.parse::<Orient>() {
            Ok(orient) => orient,
            Err(e) => return Ok(error_response(&e)),
        },
        None => Orient::default(),
    };

    match state
        .engine
        .get_query_result_tabular(&query_id, params.cursor.as_deref(), orient)
    {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 查询日志
pub async fn query_logs(
    path: web::Path<String>,
    params: web::Query<LogsParams>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    let query_id = QueryId::from(path.into_inner());
    match state
        .engine
        .get_query_logs(&query_id, params.from_line, params.max_lines)
    {
        Ok(logs) => Ok(HttpResponse::Ok().json(ApiResponse::success(LogsResponse { query_id, logs }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 物化为外部表
pub async fn materialize(
    req: web::Json<MaterializeRequest>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let cache_mode = req.cache_mode.unwrap_or(req.spec.cache_mode);
    match state
        .engine
        .materialize(req.spec, req.as_table.as_deref(), cache_mode)
        .await
    {
        Ok(location) => Ok(HttpResponse::Ok().json(ApiResponse::success(location))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// 清空缓存
pub async fn drop_cache(
    req: web::Json<DropCacheRequest>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    match state
        .engine
        .drop_cache(req.confirmation_token.as_deref())
        .await
    {
        Ok(removed) => Ok(HttpResponse::Ok().json(ApiResponse::success(DropCacheResponse {
            success: true,
            removed,
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}
