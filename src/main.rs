//! MQL 查询服务
//!
//! 集成功能：
//! 1. 查询生命周期管理 + 结果缓存
//! 2. Parquet 执行后端 / Parquet 物化表存储
//! 3. HTTP API（REST 接口）+ Prometheus 指标
//!
//! 运行: cargo run --bin mql-server -- --config config/mql.toml

use anyhow::Context;
use mqlserver::observability::init_metrics;
use mqlserver::service::http::HttpServer;
use mqlserver::utils::config::EngineConfig;
use mqlserver::MqlEngine;
use std::sync::Arc;

/// 命令行参数
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<String>,
    http_address: Option<String>,
    data_dir: Option<String>,
    table_dir: Option<String>,
    /// 无法识别的参数（日志初始化后再报告）
    ignored: Vec<String>,
}

impl CliArgs {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut cli = CliArgs::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--config" | "-c" => cli.config_path = value,
                "--http" | "-h" => cli.http_address = value,
                "--data-dir" | "-d" => cli.data_dir = value,
                "--table-dir" | "-t" => cli.table_dir = value,
                other => {
                    cli.ignored.push(other.to_string());
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }
        cli
    }
}

/// 加载配置
///
/// 返回配置以及回退到默认值时的原因（此时日志尚未初始化）。
fn load_config(cli: &CliArgs) -> anyhow::Result<(EngineConfig, Option<String>)> {
    let mut fallback = None;
    let mut config = match &cli.config_path {
        // 显式指定的配置文件必须可用
        Some(path) => EngineConfig::load_from_file(path)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading {}", path))?,
        None => match EngineConfig::load_default() {
            Ok(cfg) => cfg,
            Err(e) => {
                fallback = Some(e);
                EngineConfig::default()
            }
        },
    };

    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.table_dir {
        config.storage.table_dir = dir.clone();
    }
    Ok((config, fallback))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let (config, fallback) = load_config(&cli)?;

    // 初始化日志（RUST_LOG 优先于配置）
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.server.log_level.as_str()),
    )
    .init();

    for arg in &cli.ignored {
        log::warn!("Ignoring unknown argument: {}", arg);
    }
    if let Some(e) = fallback {
        log::warn!("Failed to load config file: {}, using defaults", e);
    }

    log::info!("Configuration loaded");
    log::info!("  Data dir: {}", config.storage.data_dir);
    log::info!("  Table dir: {}", config.storage.table_dir);
    log::info!(
        "  Workers: {}, retention: {}s",
        config.manager.max_concurrent_queries,
        config.manager.retention_secs
    );
    if config.cache.drop_confirmation_token.is_none() {
        log::warn!("No cache drop confirmation token configured, drop_cache is disabled");
    }

    init_metrics();

    let bind_address = cli
        .http_address
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.http.host, config.http.port));

    let engine = Arc::new(MqlEngine::from_config(config).context("building engine")?);
    engine.start();

    let server = HttpServer::new(engine.clone(), bind_address);
    let result = server.run().await;

    engine.shutdown();
    log::info!("Server stopped");
    result.context("HTTP server failed")
}
