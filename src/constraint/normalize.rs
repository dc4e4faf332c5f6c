//! 条件树规范化
//!
//! 规范化规则：
//! 1. 叶子先校验，非法组合直接报错
//! 2. 同类嵌套展开：And(a, And(b, c)) → And(a, b, c)
//! 3. 单子节点的 And/Or 折叠为子节点本身
//! 4. 子节点排序并去重；SET 值排序去重
//!
//! 逻辑等价（仅子节点顺序不同）的树得到相同的规范形式。

use super::node::{AtomicConstraintType, ConstraintError, ConstraintNode};
use serde::Serialize;
use std::collections::BTreeSet;

/// 规范形式
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedConstraint {
    And(Vec<NormalizedConstraint>),
    Or(Vec<NormalizedConstraint>),
    Set {
        dimension: String,
        values: BTreeSet<String>,
    },
    Range {
        dimension: String,
        start: Option<String>,
        stop: Option<String>,
    },
}

/// 规范化条件树
pub fn normalize(node: &ConstraintNode) -> Result<NormalizedConstraint, ConstraintError> {
    match node {
        ConstraintNode::Leaf(leaf) => {
            leaf.validate()?;
            let dimension = leaf.dimension_name.clone();
            Ok(match leaf.constraint_type {
                AtomicConstraintType::Set => NormalizedConstraint::Set {
                    dimension,
                    values: leaf.values.iter().flatten().cloned().collect(),
                },
                AtomicConstraintType::Range => NormalizedConstraint::Range {
                    dimension,
                    start: leaf.start.clone(),
                    stop: leaf.stop.clone(),
                },
            })
        }
        ConstraintNode::And(children) => normalize_group(children, true),
        ConstraintNode::Or(children) => normalize_group(children, false),
    }
}

fn normalize_group(
    children: &[ConstraintNode],
    is_and: bool,
) -> Result<NormalizedConstraint, ConstraintError> {
    let mut flat = Vec::with_capacity(children.len());

    for child in children {
        match (normalize(child)?, is_and) {
            (NormalizedConstraint::And(inner), true) => flat.extend(inner),
            (NormalizedConstraint::Or(inner), false) => flat.extend(inner),
            (other, _) => flat.push(other),
        }
    }

    flat.sort();
    flat.dedup();

    if flat.len() == 1 {
        return Ok(flat.remove(0));
    }

    Ok(if is_and {
        NormalizedConstraint::And(flat)
    } else {
        NormalizedConstraint::Or(flat)
    })
}
