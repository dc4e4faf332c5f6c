//! 查询结果缓存
//!
//! ```text
//! QuerySpecification ──normalize──→ Fingerprinter ──sha256──→ Fingerprint
//!                                                               │
//!                              CacheStore (写屏障 + 统计) ←─────┘
//!                                   │
//!                              CacheBackend (默认 DashMap 内存实现)
//! ```
//!
//! 缓存模式决定 QueryManager 执行时如何使用缓存：
//!
//! | 模式       | 执行前读缓存 | 执行后写缓存 |
//! |-----------|-------------|-------------|
//! | READ      | 是          | 否          |
//! | READWRITE | 是          | 是          |
//! | WRITE     | 否          | 是          |
//! | IGNORE    | 否          | 否          |

pub mod fingerprint;
pub mod store;

pub use fingerprint::{fingerprint, Fingerprint};
pub use store::{
    CacheBackend, CacheEntry, CacheError, CachePayload, CacheStatsSnapshot, CacheStore,
    DropOutcome, MemoryCacheBackend,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 缓存模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheMode {
    Read,
    #[default]
    #[serde(rename = "READWRITE", alias = "READ_WRITE")]
    ReadWrite,
    Write,
    Ignore,
}

impl CacheMode {
    /// 执行前是否查缓存
    pub fn reads(&self) -> bool {
        matches!(self, CacheMode::Read | CacheMode::ReadWrite)
    }

    /// 执行后是否写缓存
    pub fn writes(&self) -> bool {
        matches!(self, CacheMode::ReadWrite | CacheMode::Write)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Read => "READ",
            CacheMode::ReadWrite => "READWRITE",
            CacheMode::Write => "WRITE",
            CacheMode::Ignore => "IGNORE",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(CacheMode::Read),
            "READWRITE" | "READ_WRITE" => Ok(CacheMode::ReadWrite),
            "WRITE" => Ok(CacheMode::Write),
            "IGNORE" => Ok(CacheMode::Ignore),
            other => Err(format!("Unknown cache mode: {}", other)),
        }
    }
}
