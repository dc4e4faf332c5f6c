//! HTTP API 服务模块
//!
//! 提供查询提交、状态/结果/日志轮询、物化、缓存管理与健康检查接口

pub mod handlers;
pub mod models;
pub mod routes;

use actix_web::{middleware, web, App, HttpServer as ActixHttpServer};
use std::io;
use std::sync::Arc;

use crate::engine::MqlEngine;
use handlers::AppState;

/// HTTP 服务器
pub struct HttpServer {
    /// 应用状态
    app_state: Arc<AppState>,

    /// 监听地址
    bind_address: String,
}

impl HttpServer {
    /// 创建新的 HTTP 服务器
    pub fn new(engine: Arc<MqlEngine>, bind_address: String) -> Self {
        Self {
            app_state: Arc::new(AppState { engine }),
            bind_address,
        }
    }

    /// 启动 HTTP 服务器
    pub async fn run(self) -> io::Result<()> {
        log::info!("Starting HTTP server at {}", self.bind_address);

        let app_state = self.app_state.clone();
        let bind_address = self.bind_address.clone();

        ActixHttpServer::new(move || {
            App::new()
                // 应用状态
                .app_data(web::Data::new(app_state.clone()))
                // 中间件
                .wrap(middleware::Logger::default())
                .wrap(middleware::Compress::default())
                // CORS 支持
                .wrap(
                    actix_cors::Cors::default()
                        .allow_any_origin()
                        .allow_any_method()
                        .allow_any_header()
                        .max_age(3600),
                )
                // 配置路由
                .configure(routes::configure)
        })
        .bind(&bind_address)?
        .run()
        .await
    }
}
