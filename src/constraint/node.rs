//! 条件树节点定义与校验

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 条件校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("constraint on '{dimension}': SET requires `values`")]
    MissingValues { dimension: String },

    #[error("constraint on '{dimension}': SET must not set `start`/`stop`")]
    UnexpectedBounds { dimension: String },

    #[error("constraint on '{dimension}': RANGE requires `start` and/or `stop`")]
    MissingBounds { dimension: String },

    #[error("constraint on '{dimension}': RANGE must not set `values`")]
    UnexpectedValues { dimension: String },

    #[error("constraint has an empty dimension name")]
    EmptyDimension,

    #[error("constraint dimension name '{dimension}' has leading or trailing whitespace")]
    UntrimmedDimension { dimension: String },
}

/// 原子约束类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AtomicConstraintType {
    Set,
    Range,
}

/// 叶子约束
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicConstraint {
    pub constraint_type: AtomicConstraintType,
    pub dimension_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
}

impl AtomicConstraint {
    /// SET 约束
    pub fn set<I, S>(dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            constraint_type: AtomicConstraintType::Set,
            dimension_name: dimension.into(),
            values: Some(values.into_iter().map(Into::into).collect()),
            start: None,
            stop: None,
        }
    }

    /// RANGE 约束（闭区间，缺省边界表示无界）
    pub fn range(
        dimension: impl Into<String>,
        start: Option<impl Into<String>>,
        stop: Option<impl Into<String>>,
    ) -> Self {
        Self {
            constraint_type: AtomicConstraintType::Range,
            dimension_name: dimension.into(),
            values: None,
            start: start.map(Into::into),
            stop: stop.map(Into::into),
        }
    }

    /// 校验字段组合
    pub fn validate(&self) -> Result<(), ConstraintError> {
        if self.dimension_name.trim().is_empty() {
            return Err(ConstraintError::EmptyDimension);
        }
        if self.dimension_name.trim() != self.dimension_name {
            return Err(ConstraintError::UntrimmedDimension {
                dimension: self.dimension_name.clone(),
            });
        }
        let dimension = self.dimension_name.clone();
        let has_bounds = self.start.is_some() || self.stop.is_some();

        match self.constraint_type {
            AtomicConstraintType::Set => {
                if has_bounds {
                    return Err(ConstraintError::UnexpectedBounds { dimension });
                }
                if self.values.is_none() {
                    return Err(ConstraintError::MissingValues { dimension });
                }
            }
            AtomicConstraintType::Range => {
                if self.values.is_some() {
                    return Err(ConstraintError::UnexpectedValues { dimension });
                }
                if !has_bounds {
                    return Err(ConstraintError::MissingBounds { dimension });
                }
            }
        }
        Ok(())
    }
}

/// 条件树节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintNode {
    And(Vec<ConstraintNode>),
    Or(Vec<ConstraintNode>),
    Leaf(AtomicConstraint),
}

impl ConstraintNode {
    pub fn leaf(constraint: AtomicConstraint) -> Self {
        ConstraintNode::Leaf(constraint)
    }

    /// 收集树中引用的全部维度名
    pub fn dimensions(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_dimensions(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_dimensions<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ConstraintNode::And(children) | ConstraintNode::Or(children) => {
                for child in children {
                    child.collect_dimensions(out);
                }
            }
            ConstraintNode::Leaf(leaf) => out.push(leaf.dimension_name.as_str()),
        }
    }
}

/// 递归校验整棵树
pub fn validate(node: &ConstraintNode) -> Result<(), ConstraintError> {
    match node {
        ConstraintNode::And(children) | ConstraintNode::Or(children) => {
            children.iter().try_for_each(validate)
        }
        ConstraintNode::Leaf(leaf) => leaf.validate(),
    }
}
