//! 查询日志（追加写、并发可读）
//!
//! 执行上下文是唯一写入者，API 读者可以在执行过程中增量读取。
//! 只追加、不修改，后一次读取看到的永远是前一次读取的超集。

use chrono::Utc;
use parking_lot::RwLock;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// 单个查询的日志缓冲
#[derive(Debug)]
pub struct QueryLog {
    query_id: String,
    lines: RwLock<Vec<String>>,
}

impl QueryLog {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            lines: RwLock::new(Vec::new()),
        }
    }

    /// 追加一行（带时间戳和级别）
    pub fn append(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        let line = format!(
            "{} {:<5} {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            level.as_str(),
            message
        );
        log::debug!("[{}] {}", self.query_id, message);
        self.lines.write().push(line);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.append(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.append(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.append(LogLevel::Error, message);
    }

    pub fn len(&self) -> usize {
        self.lines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.read().is_empty()
    }

    /// 读取 `[from_line, from_line + max_lines)` 区间
    pub fn slice(&self, from_line: usize, max_lines: Option<usize>) -> Vec<String> {
        let lines = self.lines.read();
        let start = from_line.min(lines.len());
        let end = match max_lines {
            Some(max) => start.saturating_add(max).min(lines.len()),
            None => lines.len(),
        };
        lines[start..end].to_vec()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.read().clone()
    }

    /// 最后一条 ERROR 行（失败详情）
    pub fn last_error(&self) -> Option<String> {
        self.lines
            .read()
            .iter()
            .rev()
            .find(|l| l.contains(" ERROR "))
            .cloned()
    }
}
