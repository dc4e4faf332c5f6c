//! 查询指纹
//!
//! 指纹 = SHA-256( 域分隔前缀 || 长度前缀 || 规范化 JSON )
//!
//! 规范化文档包含所有影响结果语义的字段：模型键、指标、分组维度集合、
//! 规范化后的过滤条件、排序、limit、时间序列开关、后处理器。
//! 缓存模式不参与指纹（它只决定是否读写缓存，不影响结果）。

use crate::constraint::{normalize, ConstraintError, NormalizedConstraint};
use crate::model::{ModelKey, QuerySpecification};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;

const DOMAIN_TAG: &[u8] = b"MQL:query-fingerprint:v1";

/// 查询指纹（64 位十六进制字符串）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 日志里用的短形式
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 参与指纹计算的规范化文档
#[derive(Serialize)]
struct FingerprintDocument<'a> {
    model_key: &'a ModelKey,
    metrics: &'a [String],
    group_by: Vec<&'a str>,
    constraint: Option<NormalizedConstraint>,
    order: &'a [String],
    limit: Option<usize>,
    add_time_series: bool,
    post_processors: &'a [String],
}

/// 计算查询指纹
///
/// 过滤条件非法时返回校验错误。
pub fn fingerprint(spec: &QuerySpecification) -> Result<Fingerprint, ConstraintError> {
    let constraint = spec.where_constraint.as_ref().map(normalize).transpose()?;

    // 名称不做任何清洗：提交时已拒绝带空白或重复的名称，指纹与执行看到同一份输入
    let mut group_by: Vec<&str> = spec.group_by.iter().map(String::as_str).collect();
    group_by.sort_unstable();
    group_by.dedup();

    let doc = FingerprintDocument {
        model_key: &spec.model_key,
        metrics: &spec.metrics,
        group_by,
        constraint,
        order: &spec.order,
        limit: spec.limit,
        add_time_series: spec.add_time_series,
        post_processors: &spec.post_processors,
    };

    // 结构体只含字符串/数字/枚举，序列化不会失败
    let canonical = serde_json::to_vec(&doc).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);
    hasher.update((canonical.len() as u64).to_le_bytes());
    hasher.update(&canonical);
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(hex, "{:02x}", byte);
    }
    Ok(Fingerprint(hex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheMode;
    use crate::constraint::{AtomicConstraint, ConstraintNode};

    fn base() -> QuerySpecification {
        QuerySpecification::new(
            ModelKey::new("acme", "metrics", "main", "abc123"),
            vec!["revenue".to_string()],
        )
        .with_group_by(vec!["country".into(), "device".into()])
    }

    fn set(dim: &str, values: &[&str]) -> ConstraintNode {
        ConstraintNode::leaf(AtomicConstraint::set(dim, values.iter().copied()))
    }

    #[test]
    fn test_deterministic() {
        let fp = fingerprint(&base()).unwrap();
        assert_eq!(fp, fingerprint(&base()).unwrap());
        assert_eq!(fp.as_str().len(), 64);
    }

    #[test]
    fn test_constraint_order_irrelevant() {
        let a = base().with_where(ConstraintNode::And(vec![
            set("country", &["US"]),
            ConstraintNode::Or(vec![set("device", &["ios"]), set("device", &["web"])]),
        ]));
        let b = base().with_where(ConstraintNode::And(vec![
            ConstraintNode::Or(vec![set("device", &["web"]), set("device", &["ios"])]),
            set("country", &["US"]),
        ]));
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_group_by_is_a_set() {
        let a = base();
        let b = base().with_group_by(vec!["device".into(), "country".into()]);
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_every_semantic_field_changes_key() {
        let fp = fingerprint(&base()).unwrap();

        let mut other_commit = base();
        other_commit.model_key.commit = "def456".into();

        let variants = vec![
            other_commit,
            base().with_group_by(vec!["country".into()]),
            QuerySpecification {
                metrics: vec!["revenue".into(), "orders".into()],
                ..base()
            },
            base().with_where(set("country", &["US"])),
            base().with_order(vec!["-revenue".into()]),
            base().with_limit(10),
            base().with_time_series(true),
            base().with_post_processors(vec!["fill_nulls".into()]),
        ];
        for v in variants {
            assert_ne!(fingerprint(&v).unwrap(), fp, "{:?}", v);
        }
    }

    #[test]
    fn test_names_are_not_cleaned() {
        let fp = fingerprint(&base()).unwrap();
        let padded = base().with_group_by(vec![" country".into(), "device".into()]);
        assert_ne!(fingerprint(&padded).unwrap(), fp);

        let padded_leaf = base().with_where(set(" country", &["US"]));
        assert!(fingerprint(&padded_leaf).is_err());
    }

    #[test]
    fn test_cache_mode_not_part_of_key() {
        let read = base().with_cache_mode(CacheMode::Read);
        let write = base().with_cache_mode(CacheMode::Write);
        assert_eq!(fingerprint(&read).unwrap(), fingerprint(&write).unwrap());
    }

    #[test]
    fn test_invalid_constraint_rejected() {
        let mut leaf = AtomicConstraint::set("country", ["US"]);
        leaf.values = None;
        let spec = base().with_where(ConstraintNode::leaf(leaf));
        assert!(fingerprint(&spec).is_err());
    }
}
