//! HTTP API 路由配置

use super::handlers;
use actix_web::web;

/// 配置所有路由
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // 健康检查 / 指标
        .route("/health", web::get().to(handlers::health_check))
        .route("/metrics", web::get().to(handlers::metrics))
        // 查询
        .service(
            web::scope("/api/queries")
                .route("", web::post().to(handlers::submit_query))
                .route("", web::get().to(handlers::list_queries))
                .route("/{query_id}/status", web::get().to(handlers::query_status))
                .route("/{query_id}/result", web::get().to(handlers::query_result))
                .route(
                    "/{query_id}/result/tabular",
                    web::get().to(handlers::query_result_tabular),
                )
                .route("/{query_id}/logs", web::get().to(handlers::query_logs)),
        )
        // 物化
        .route("/api/materialize", web::post().to(handlers::materialize))
        // 缓存管理
        .route("/api/cache/drop", web::post().to(handlers::drop_cache));
}
