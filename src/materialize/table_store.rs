//! 外部表存储
//!
//! 物化结果通过 `TableStore` 写出；引擎只负责请求写入，不关心存储格式。
//! `ParquetTableStore` 是默认实现：`<base_dir>/<schema>/<table>.parquet`。

use crate::model::{ColumnKind, ResultTable};
use async_trait::async_trait;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// 表存储错误
#[derive(Debug, Error)]
pub enum TableStoreError {
    #[error("invalid table name: {0}")]
    InvalidName(String),

    #[error("table store unavailable: {0}")]
    Unavailable(String),

    #[error("table write failed: {0}")]
    Write(String),
}

/// 物化表位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLocation {
    pub schema: String,
    pub table: String,
}

impl TableLocation {
    /// 解析 `schema.table` 或 `table`
    pub fn parse(raw: &str, default_schema: &str) -> Result<Self, TableStoreError> {
        let raw = raw.trim();
        let (schema, table) = match raw.split_once('.') {
            Some((schema, table)) => (schema, table),
            None => (default_schema, raw),
        };
        validate_identifier(schema)?;
        validate_identifier(table)?;
        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }
}

impl fmt::Display for TableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// 标识符只允许字母、数字、下划线（同时保证路径安全）
fn validate_identifier(name: &str) -> Result<(), TableStoreError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TableStoreError::InvalidName(name.to_string()))
    }
}

/// 表存储接口
#[async_trait]
pub trait TableStore: Send + Sync {
    fn name(&self) -> &str;

    /// 写入（覆盖同名表）
    async fn write_table(
        &self,
        location: &TableLocation,
        table: Arc<ResultTable>,
    ) -> Result<(), TableStoreError>;

    async fn ping(&self) -> Result<(), TableStoreError>;
}

/// Parquet 表存储
pub struct ParquetTableStore {
    base_dir: PathBuf,
}

impl ParquetTableStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn table_path(&self, location: &TableLocation) -> PathBuf {
        self.base_dir
            .join(&location.schema)
            .join(format!("{}.parquet", location.table))
    }
}

#[async_trait]
impl TableStore for ParquetTableStore {
    fn name(&self) -> &str {
        "parquet"
    }

    async fn write_table(
        &self,
        location: &TableLocation,
        table: Arc<ResultTable>,
    ) -> Result<(), TableStoreError> {
        let path = self.table_path(location);
        let join = tokio::task::spawn_blocking(move || -> Result<(), TableStoreError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| TableStoreError::Unavailable(e.to_string()))?;
            }
            let mut df = table_to_dataframe(&table)?;

            // 先写临时文件再改名，读者不会看到半张表
            let tmp = path.with_extension("parquet.tmp");
            let file = std::fs::File::create(&tmp)
                .map_err(|e| TableStoreError::Write(format!("{}: {}", tmp.display(), e)))?;
            ParquetWriter::new(file)
                .finish(&mut df)
                .map_err(|e| TableStoreError::Write(e.to_string()))?;
            std::fs::rename(&tmp, &path)
                .map_err(|e| TableStoreError::Write(e.to_string()))?;
            Ok(())
        })
        .await;

        join.map_err(|e| TableStoreError::Write(format!("write task failed: {}", e)))??;
        log::info!("Materialized table {} written", location);
        Ok(())
    }

    async fn ping(&self) -> Result<(), TableStoreError> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| TableStoreError::Unavailable(format!("{}: {}", self.base_dir.display(), e)))
    }
}

/// ResultTable → DataFrame（指标列为 f64，其余为字符串）
pub fn table_to_dataframe(table: &ResultTable) -> Result<DataFrame, TableStoreError> {
    let columns: Vec<Column> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| match c.kind {
            ColumnKind::Metric => {
                let values: Vec<Option<f64>> = table.rows.iter().map(|r| r[i].as_f64()).collect();
                Column::new(c.name.as_str().into(), values)
            }
            ColumnKind::Dimension | ColumnKind::Time => {
                let values: Vec<Option<String>> = table
                    .rows
                    .iter()
                    .map(|r| match &r[i] {
                        serde_json::Value::Null => None,
                        serde_json::Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    })
                    .collect();
                Column::new(c.name.as_str().into(), values)
            }
        })
        .collect();

    DataFrame::new(columns).map_err(|e| TableStoreError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResultColumn;
    use serde_json::json;

    #[test]
    fn test_location_parse() {
        let loc = TableLocation::parse("analytics.daily_revenue", "mql").unwrap();
        assert_eq!(loc.schema, "analytics");
        assert_eq!(loc.table, "daily_revenue");

        let loc = TableLocation::parse("daily_revenue", "mql").unwrap();
        assert_eq!(loc.schema, "mql");
        assert_eq!(loc.to_string(), "mql.daily_revenue");

        assert!(TableLocation::parse("../etc.passwd", "mql").is_err());
        assert!(TableLocation::parse("a.b.c", "mql").is_err());
        assert!(TableLocation::parse("", "mql").is_err());
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(tmp.path());
        store.ping().await.unwrap();

        let mut table = ResultTable::new(vec![
            ResultColumn::dimension("country"),
            ResultColumn::metric("revenue"),
        ]);
        table.push_row(vec![json!("US"), json!(1.5)]).unwrap();
        table.push_row(vec![json!("CA"), serde_json::Value::Null]).unwrap();

        let loc = TableLocation::parse("analytics.revenue", "mql").unwrap();
        store.write_table(&loc, Arc::new(table)).await.unwrap();

        let path = store.table_path(&loc);
        let file = std::fs::File::open(&path).unwrap();
        let df = ParquetReader::new(file).finish().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names().len(), 2);
    }
}
