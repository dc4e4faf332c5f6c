//! 条件树求值

use super::node::{AtomicConstraint, AtomicConstraintType, ConstraintNode};
use crate::utils::time::parse_temporal;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// 按维度名读取一行的维度值
pub trait DimensionRow {
    fn dimension_value(&self, name: &str) -> Option<&str>;
}

impl DimensionRow for HashMap<String, String> {
    fn dimension_value(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl DimensionRow for BTreeMap<String, String> {
    fn dimension_value(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl DimensionRow for [(&str, &str)] {
    fn dimension_value(&self, name: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }
}

impl<const N: usize> DimensionRow for [(&str, &str); N] {
    fn dimension_value(&self, name: &str) -> Option<&str> {
        self.as_slice().dimension_value(name)
    }
}

/// 对一行求值
///
/// 调用方应先 `validate`/`normalize`；非法叶子在这里一律为假。
pub fn evaluate<R: DimensionRow + ?Sized>(node: &ConstraintNode, row: &R) -> bool {
    match node {
        ConstraintNode::And(children) => children.iter().all(|c| evaluate(c, row)),
        ConstraintNode::Or(children) => children.iter().any(|c| evaluate(c, row)),
        ConstraintNode::Leaf(leaf) => evaluate_leaf(leaf, row),
    }
}

fn evaluate_leaf<R: DimensionRow + ?Sized>(leaf: &AtomicConstraint, row: &R) -> bool {
    if leaf.validate().is_err() {
        return false;
    }
    let value = match row.dimension_value(&leaf.dimension_name) {
        Some(v) => v,
        None => return false,
    };

    match leaf.constraint_type {
        AtomicConstraintType::Set => leaf
            .values
            .as_ref()
            .map(|values| values.iter().any(|v| v == value))
            .unwrap_or(false),
        AtomicConstraintType::Range => {
            let above_start = leaf
                .start
                .as_deref()
                .map(|start| compare_values(value, start) != Ordering::Less)
                .unwrap_or(true);
            let below_stop = leaf
                .stop
                .as_deref()
                .map(|stop| compare_values(value, stop) != Ordering::Greater)
                .unwrap_or(true);
            above_start && below_stop
        }
    }
}

/// 比较两个维度值
///
/// 两边都是数值时按数值比较；都能解析为日期/时间时按时间先后；否则按字符串字典序。
pub fn compare_values(a: &str, b: &str) -> Ordering {
    if let (Some(x), Some(y)) = (parse_number(a), parse_number(b)) {
        if let Some(ord) = x.partial_cmp(&y) {
            return ord;
        }
    }
    if let (Some(x), Some(y)) = (parse_temporal(a), parse_temporal(b)) {
        return x.cmp(&y);
    }
    a.cmp(b)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
