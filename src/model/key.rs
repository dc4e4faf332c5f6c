//! 语义模型快照标识

use serde::{Deserialize, Serialize};
use std::fmt;

/// 模型键：organization / repo / branch / commit 唯一确定一个不可变的语义模型快照
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub organization: String,
    pub repo: String,
    pub branch: String,
    pub commit: String,
}

impl ModelKey {
    pub fn new(
        organization: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            repo: repo.into(),
            branch: branch.into(),
            commit: commit.into(),
        }
    }

    /// 返回第一个为空的字段名（用于校验）
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("organization", &self.organization),
            ("repo", &self.repo),
            ("branch", &self.branch),
            ("commit", &self.commit),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}:{}",
            self.organization, self.repo, self.branch, self.commit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let key = ModelKey::new("acme", "metrics", "main", "abc123");
        assert_eq!(key.to_string(), "acme/metrics@main:abc123");
    }

    #[test]
    fn test_missing_field() {
        let key = ModelKey::new("acme", "metrics", "main", "abc123");
        assert_eq!(key.missing_field(), None);

        let key = ModelKey::new("acme", "", "main", "  ");
        assert_eq!(key.missing_field(), Some("repo"));
    }
}
