//! 查询结果表示
//!
//! - `ResultTable`: 执行后端返回的原始表格（缓存 / 分页 / 物化都基于它）
//! - `MqlQueryResultSeries`: 按维度切片分组后的强类型序列
//! - `ResultDatum`: 封闭的数据点变体集合，所有变体都有 `y`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 列类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// 分组维度（字符串）
    Dimension,
    /// 时间维度（RFC3339 / ISO 日期字符串）
    Time,
    /// 指标（数值）
    Metric,
}

/// 列描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl ResultColumn {
    pub fn dimension(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Dimension,
        }
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Time,
        }
    }

    pub fn metric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Metric,
        }
    }
}

/// 原始结果表
///
/// 单元格是 JSON 标量：维度为字符串，指标为数值，空值为 null。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: Vec<ResultColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// 追加一行（列数不匹配时返回错误）
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "Row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// 校验表格形状：每行单元格数都等于列数
    ///
    /// `rows` 是公开字段，后端可以绕过 `push_row` 直接填充。
    pub fn validate(&self) -> Result<(), String> {
        let width = self.columns.len();
        match self.rows.iter().position(|row| row.len() != width) {
            Some(i) => Err(format!(
                "Row {} has {} cells, table has {} columns",
                i,
                self.rows[i].len(),
                width
            )),
            None => Ok(()),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// 指定类型列的下标
    pub fn indices_of(&self, kind: ColumnKind) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn time_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.kind == ColumnKind::Time)
    }
}

/// 结果数据点
///
/// 封闭的标签联合，消费者可以穷举处理全部变体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultDatum {
    /// 时间序列点
    TimeSeries { x_date: DateTime<Utc>, y: f64 },
    /// 无时间轴的聚合值
    Scalar { y: f64 },
}

impl ResultDatum {
    pub fn y(&self) -> f64 {
        match self {
            ResultDatum::TimeSeries { y, .. } => *y,
            ResultDatum::Scalar { y } => *y,
        }
    }

    pub fn x_date(&self) -> Option<DateTime<Utc>> {
        match self {
            ResultDatum::TimeSeries { x_date, .. } => Some(*x_date),
            ResultDatum::Scalar { .. } => None,
        }
    }
}

/// 一个维度切片上的一条指标序列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqlQueryResultSeries {
    /// 切片值（无切片维度时为 "ALL"）
    pub series_value: String,
    /// 指标名
    pub metric_name: String,
    pub data: Vec<ResultDatum>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_row_checks_width() {
        let mut table = ResultTable::new(vec![
            ResultColumn::dimension("country"),
            ResultColumn::metric("revenue"),
        ]);
        assert!(table.push_row(vec![json!("US"), json!(10.0)]).is_ok());
        assert!(table.push_row(vec![json!("US")]).is_err());
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.indices_of(ColumnKind::Metric), vec![1]);
    }

    #[test]
    fn test_validate_reports_first_ragged_row() {
        let mut table = ResultTable::new(vec![
            ResultColumn::dimension("country"),
            ResultColumn::metric("revenue"),
        ]);
        table.push_row(vec![json!("US"), json!(10.0)]).unwrap();
        assert!(table.validate().is_ok());

        table.rows.push(vec![json!("CA")]);
        table.rows.push(vec![json!("MX"), json!(1.0), json!(2.0)]);
        let err = table.validate().unwrap_err();
        assert!(err.contains("Row 1 has 1 cells"), "{}", err);

        assert!(ResultTable::new(vec![]).validate().is_ok());
    }

    #[test]
    fn test_datum_tagged_serde() {
        let datum = ResultDatum::Scalar { y: 1.5 };
        let json = serde_json::to_value(&datum).unwrap();
        assert_eq!(json, json!({"type": "scalar", "y": 1.5}));

        let back: ResultDatum = serde_json::from_value(json).unwrap();
        assert_eq!(back.y(), 1.5);
        assert!(back.x_date().is_none());
    }
}
