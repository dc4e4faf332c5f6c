//! 结果后处理器
//!
//! 在执行结果进入缓存之前按声明顺序依次应用。

use crate::model::{ColumnKind, PostProcessor, ResultTable};
use crate::utils::time::parse_temporal;
use serde_json::Value;
use std::collections::HashMap;

/// 依次应用后处理器
pub fn apply_post_processors(table: &mut ResultTable, processors: &[PostProcessor]) {
    for processor in processors {
        match processor {
            PostProcessor::FillNulls => fill_nulls(table),
            PostProcessor::CumulativeSum => cumulative_sum(table),
        }
    }
}

/// 空指标值填 0
fn fill_nulls(table: &mut ResultTable) {
    let metric_cols = table.indices_of(ColumnKind::Metric);
    for row in table.rows.iter_mut() {
        for &i in &metric_cols {
            if row[i].is_null() {
                row[i] = Value::from(0.0);
            }
        }
    }
}

/// 每个维度切片内按时间顺序累加
///
/// 没有时间列时按行的原始顺序累加。空值不参与累加，保持为空。
/// 调用前表格形状需已校验（见 `ResultTable::validate`）。
fn cumulative_sum(table: &mut ResultTable) {
    let metric_cols = table.indices_of(ColumnKind::Metric);
    let dim_cols = table.indices_of(ColumnKind::Dimension);
    let time_col = table.time_index();

    // 切片 -> 行下标
    let mut groups: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    let mut group_order: Vec<Vec<String>> = Vec::new();
    for (row_idx, row) in table.rows.iter().enumerate() {
        let cut: Vec<String> = dim_cols.iter().map(|&i| cell_key(&row[i])).collect();
        groups
            .entry(cut.clone())
            .or_insert_with(|| {
                group_order.push(cut);
                Vec::new()
            })
            .push(row_idx);
    }

    for cut in &group_order {
        let Some(indices) = groups.get_mut(cut) else {
            continue;
        };
        if let Some(t) = time_col {
            // (解析后的时间, 原始文本) 构成全序；无法解析的值排在前面并按字典序
            let rows = &table.rows;
            indices.sort_by_cached_key(|&i| {
                let raw = cell_key(&rows[i][t]);
                (parse_temporal(&raw), raw)
            });
        }

        for &m in &metric_cols {
            let mut running = 0.0;
            for &row_idx in indices.iter() {
                let cell = &mut table.rows[row_idx][m];
                if let Some(v) = cell.as_f64() {
                    running += v;
                    *cell = Value::from(running);
                }
            }
        }
    }
}

fn cell_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResultColumn;
    use serde_json::json;

    fn table() -> ResultTable {
        let mut t = ResultTable::new(vec![
            ResultColumn::dimension("country"),
            ResultColumn::time("metric_time"),
            ResultColumn::metric("revenue"),
        ]);
        t.push_row(vec![json!("US"), json!("2024-01-02"), json!(2.0)]).unwrap();
        t.push_row(vec![json!("CA"), json!("2024-01-01"), json!(5.0)]).unwrap();
        t.push_row(vec![json!("US"), json!("2024-01-01"), json!(1.0)]).unwrap();
        t.push_row(vec![json!("US"), json!("2024-01-03"), Value::Null]).unwrap();
        t.push_row(vec![json!("CA"), json!("2024-01-02"), json!(1.5)]).unwrap();
        t
    }

    #[test]
    fn test_fill_nulls() {
        let mut t = table();
        apply_post_processors(&mut t, &[PostProcessor::FillNulls]);
        assert_eq!(t.rows[3][2], json!(0.0));
        assert_eq!(t.rows[0][2], json!(2.0));
    }

    #[test]
    fn test_cumulative_sum_per_cut_in_time_order() {
        let mut t = table();
        apply_post_processors(&mut t, &[PostProcessor::CumulativeSum]);
        // US: 01-01 -> 1, 01-02 -> 3, 01-03 stays null
        assert_eq!(t.rows[2][2], json!(1.0));
        assert_eq!(t.rows[0][2], json!(3.0));
        assert!(t.rows[3][2].is_null());
        // CA: 01-01 -> 5, 01-02 -> 6.5
        assert_eq!(t.rows[1][2], json!(5.0));
        assert_eq!(t.rows[4][2], json!(6.5));
    }

    #[test]
    fn test_cumulative_sum_with_unparseable_times() {
        let mut t = ResultTable::new(vec![
            ResultColumn::time("metric_time"),
            ResultColumn::metric("revenue"),
        ]);
        for (time, v) in [("10a", 1.0), ("9", 2.0), ("10", 4.0), ("2024-01-01", 8.0)] {
            t.push_row(vec![json!(time), json!(v)]).unwrap();
        }
        apply_post_processors(&mut t, &[PostProcessor::CumulativeSum]);
        // 无法解析的按字典序在前："10" -> "10a" -> "9"，之后是日期
        assert_eq!(t.rows[2][1], json!(4.0));
        assert_eq!(t.rows[0][1], json!(5.0));
        assert_eq!(t.rows[1][1], json!(7.0));
        assert_eq!(t.rows[3][1], json!(15.0));
    }

    #[test]
    fn test_processors_apply_in_order() {
        let mut t = table();
        apply_post_processors(
            &mut t,
            &[PostProcessor::FillNulls, PostProcessor::CumulativeSum],
        );
        assert_eq!(t.rows[3][2], json!(3.0));
    }
}
