//! 可观测性模块
//!
//! 提供 Prometheus 指标导出、执行延迟追踪等功能

pub mod metrics;

pub use metrics::*;
