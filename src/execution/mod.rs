//! 执行层
//!
//! - `QueryBackend`: 指标查询执行的外部协作者接口
//! - `ParquetBackend`: 基于 Polars 的参考实现
//! - `QueryLog`: 单个查询的追加式日志
//! - 后处理器：结果写入缓存前的变换

pub mod backend;
pub mod log;
pub mod parquet;
pub mod postprocess;

pub use backend::{ExecutionError, QueryBackend};
pub use log::{LogLevel, QueryLog};
pub use parquet::ParquetBackend;
pub use postprocess::apply_post_processors;
