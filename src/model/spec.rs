//! 查询规格（不可变输入）

use super::key::ModelKey;
use crate::cache::CacheMode;
use crate::constraint::ConstraintNode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 时间维度列名（add_time_series = true 时参与分组）
pub const METRIC_TIME: &str = "metric_time";

/// 查询规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpecification {
    /// 语义模型快照
    pub model_key: ModelKey,

    /// 指标列表（结果列顺序与之一致）
    pub metrics: Vec<String>,

    /// 分组维度
    #[serde(default)]
    pub group_by: Vec<String>,

    /// 过滤条件树
    #[serde(default, rename = "where")]
    pub where_constraint: Option<ConstraintNode>,

    /// 排序（`-` 前缀表示降序）
    #[serde(default)]
    pub order: Vec<String>,

    /// 限制返回行数
    #[serde(default)]
    pub limit: Option<usize>,

    /// 是否按 metric_time 输出时间序列
    #[serde(default)]
    pub add_time_series: bool,

    /// 缓存模式
    #[serde(default)]
    pub cache_mode: CacheMode,

    /// 后处理器名称
    #[serde(default)]
    pub post_processors: Vec<String>,
}

impl QuerySpecification {
    /// 最小规格：指定模型与指标，其余取默认值
    pub fn new(model_key: ModelKey, metrics: Vec<String>) -> Self {
        Self {
            model_key,
            metrics,
            group_by: Vec::new(),
            where_constraint: None,
            order: Vec::new(),
            limit: None,
            add_time_series: false,
            cache_mode: CacheMode::default(),
            post_processors: Vec::new(),
        }
    }

    pub fn with_group_by(mut self, dims: Vec<String>) -> Self {
        self.group_by = dims;
        self
    }

    pub fn with_where(mut self, node: ConstraintNode) -> Self {
        self.where_constraint = Some(node);
        self
    }

    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = order;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_time_series(mut self, enabled: bool) -> Self {
        self.add_time_series = enabled;
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn with_post_processors(mut self, names: Vec<String>) -> Self {
        self.post_processors = names;
        self
    }

    /// 解析排序项
    pub fn sort_keys(&self) -> Vec<SortKey> {
        self.order.iter().map(|s| SortKey::parse(s)).collect()
    }

    /// 解析后处理器（未知名称返回错误）
    pub fn parsed_post_processors(&self) -> Result<Vec<PostProcessor>, String> {
        self.post_processors.iter().map(|s| s.parse()).collect()
    }

    /// 参与分组的全部列（维度 + 可选时间列）
    pub fn grouping_columns(&self) -> Vec<String> {
        let mut cols = self.group_by.clone();
        if self.add_time_series && !cols.iter().any(|c| c == METRIC_TIME) {
            cols.push(METRIC_TIME.to_string());
        }
        cols
    }
}

/// 排序项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_prefix('-') {
            Some(column) => Self {
                column: column.to_string(),
                descending: true,
            },
            None => Self {
                column: raw.to_string(),
                descending: false,
            },
        }
    }
}

/// 后处理器（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessor {
    /// 每个切片内按时间顺序累加各指标
    CumulativeSum,
    /// 空指标值填 0
    FillNulls,
}

impl PostProcessor {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostProcessor::CumulativeSum => "cumulative_sum",
            PostProcessor::FillNulls => "fill_nulls",
        }
    }
}

impl FromStr for PostProcessor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cumulative_sum" | "cumsum" => Ok(PostProcessor::CumulativeSum),
            "fill_nulls" | "fillna" => Ok(PostProcessor::FillNulls),
            other => Err(format!("Unknown post processor: {}", other)),
        }
    }
}

impl fmt::Display for PostProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
