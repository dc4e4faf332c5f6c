//! 结果表 → 强类型序列

use crate::model::{ColumnKind, MqlQueryResultSeries, ResultDatum, ResultTable};
use crate::utils::time::parse_temporal;
use serde_json::Value;
use std::collections::HashMap;

/// 没有切片维度时的序列值
pub const ALL_SERIES: &str = "ALL";

/// 按维度切片分组，每个（指标, 切片）生成一条序列
///
/// - 有时间列时生成 `TimeSeries` 数据点，否则生成 `Scalar`
/// - 空指标值不生成数据点
/// - 序列按指标声明顺序、切片首次出现顺序排列
pub fn to_series(table: &ResultTable) -> Vec<MqlQueryResultSeries> {
    let dim_cols = table.indices_of(ColumnKind::Dimension);
    let metric_cols = table.indices_of(ColumnKind::Metric);
    let time_col = table.time_index();

    let mut cut_order: Vec<String> = Vec::new();
    let mut cut_rows: HashMap<String, Vec<usize>> = HashMap::new();
    for (row_idx, row) in table.rows.iter().enumerate() {
        let cut = if dim_cols.is_empty() {
            ALL_SERIES.to_string()
        } else {
            dim_cols
                .iter()
                .map(|&i| cell_text(&row[i]))
                .collect::<Vec<_>>()
                .join(", ")
        };
        cut_rows
            .entry(cut.clone())
            .or_insert_with(|| {
                cut_order.push(cut);
                Vec::new()
            })
            .push(row_idx);
    }

    let mut out = Vec::with_capacity(metric_cols.len() * cut_order.len());
    for &m in &metric_cols {
        let metric_name = table.columns[m].name.clone();
        for cut in &cut_order {
            let rows = cut_rows.get(cut).map(Vec::as_slice).unwrap_or(&[]);
            let data = rows
                .iter()
                .filter_map(|&r| datum(&table.rows[r], m, time_col))
                .collect();
            out.push(MqlQueryResultSeries {
                series_value: cut.clone(),
                metric_name: metric_name.clone(),
                data,
            });
        }
    }
    out
}

fn datum(row: &[Value], metric_col: usize, time_col: Option<usize>) -> Option<ResultDatum> {
    let y = row[metric_col].as_f64()?;
    match time_col {
        Some(t) => {
            let raw = cell_text(&row[t]);
            match parse_temporal(&raw) {
                Some(x_date) => Some(ResultDatum::TimeSeries { x_date, y }),
                None => {
                    log::warn!("Skipping datum with unparseable time value: {}", raw);
                    None
                }
            }
        }
        None => Some(ResultDatum::Scalar { y }),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
