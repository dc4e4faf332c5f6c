// Parquet 执行后端 - 基于 Polars DataFrame

use super::backend::{ExecutionError, QueryBackend};
use super::log::QueryLog;
use crate::constraint::{evaluate, ConstraintNode};
use crate::model::{
    ColumnKind, ModelKey, QuerySpecification, ResultColumn, ResultTable, METRIC_TIME,
};
use crate::utils::time::parse_temporal;
use async_trait::async_trait;
use polars::prelude::*;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Parquet 执行后端
///
/// 数据目录布局：
///
/// ```text
/// <data_dir>/<organization>/<repo>/<branch>/<commit>/*.parquet
/// ```
///
/// 每个模型快照目录下的 parquet 文件合并成一张事实表：
/// 维度列为字符串/日期，指标列为数值，`metric_time` 为时间列。
/// 指标按分组维度做 sum 聚合。
pub struct ParquetBackend {
    data_dir: PathBuf,
}

impl ParquetBackend {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 模型快照对应的目录
    pub fn model_dir(&self, key: &ModelKey) -> PathBuf {
        self.data_dir
            .join(&key.organization)
            .join(&key.repo)
            .join(&key.branch)
            .join(&key.commit)
    }
}

#[async_trait]
impl QueryBackend for ParquetBackend {
    fn name(&self) -> &str {
        "parquet"
    }

    async fn execute(
        &self,
        spec: &QuerySpecification,
        log: &QueryLog,
    ) -> Result<ResultTable, ExecutionError> {
        if !self.data_dir.is_dir() {
            return Err(ExecutionError::Unreachable(format!(
                "data directory {} is not available",
                self.data_dir.display()
            )));
        }

        let model_dir = self.model_dir(&spec.model_key);
        let files = parquet_files(&model_dir)?;
        log.info(format!(
            "Scanning {} parquet file(s) for model {}",
            files.len(),
            spec.model_key
        ));

        let spec_owned = spec.clone();
        let (table, scanned) = tokio::task::spawn_blocking(move || run_query(&files, &spec_owned))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                ExecutionError::Internal(format!("Execution task cancelled: {}", e))
            })??;

        log.info(format!(
            "Aggregated {} input row(s) into {} result row(s)",
            scanned,
            table.row_count()
        ));
        Ok(table)
    }

    async fn ping(&self) -> Result<(), ExecutionError> {
        if self.data_dir.is_dir() {
            Ok(())
        } else {
            Err(ExecutionError::Unreachable(format!(
                "data directory {} is not available",
                self.data_dir.display()
            )))
        }
    }
}

/// 列出模型目录下的 parquet 文件（按文件名排序）
fn parquet_files(dir: &Path) -> Result<Vec<PathBuf>, ExecutionError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ExecutionError::Query(format!("No data for model at {}: {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(ExecutionError::Query(format!(
            "No parquet files found in {}",
            dir.display()
        )));
    }
    Ok(files)
}

fn polars_err(context: &str) -> impl Fn(PolarsError) -> ExecutionError + '_ {
    move |e| ExecutionError::Query(format!("{}: {}", context, e))
}

/// 扫描并合并全部 parquet 文件
fn scan_all(files: &[PathBuf]) -> Result<LazyFrame, ExecutionError> {
    let mut frames = Vec::with_capacity(files.len());
    for path in files {
        let path_str = path.to_str().ok_or_else(|| {
            ExecutionError::Internal(format!("Non UTF-8 path: {}", path.display()))
        })?;
        let lf = LazyFrame::scan_parquet(PlPath::new(path_str), ScanArgsParquet::default())
            .map_err(polars_err("Scan parquet failed"))?;
        frames.push(lf);
    }

    if frames.len() == 1 {
        return Ok(frames.remove(0));
    }
    concat(frames, UnionArgs::default()).map_err(polars_err("Concat failed"))
}

/// 同步执行（运行在阻塞线程池）
///
/// 返回结果表和扫描的输入行数。
fn run_query(
    files: &[PathBuf],
    spec: &QuerySpecification,
) -> Result<(ResultTable, usize), ExecutionError> {
    let df = scan_all(files)?
        .collect()
        .map_err(polars_err("Collect failed"))?;
    let scanned = df.height();

    check_columns(&df, spec)?;

    let df = match &spec.where_constraint {
        Some(node) => apply_constraint(df, node)?,
        None => df,
    };

    let grouping = spec.grouping_columns();
    let aggs: Vec<Expr> = spec
        .metrics
        .iter()
        .map(|m| col(m.as_str()).sum().alias(m.as_str()))
        .collect();

    let mut lf = df.lazy();
    lf = if grouping.is_empty() {
        lf.select(aggs)
    } else {
        let keys: Vec<Expr> = grouping.iter().map(|g| col(g.as_str())).collect();
        lf.group_by(keys).agg(aggs)
    };

    // 未显式排序时按分组列排序，保证结果确定
    let sort_keys = spec.sort_keys();
    if !sort_keys.is_empty() {
        let by: Vec<String> = sort_keys.iter().map(|k| k.column.clone()).collect();
        let descending: Vec<bool> = sort_keys.iter().map(|k| k.descending).collect();
        lf = lf.sort(
            by,
            SortMultipleOptions::default()
                .with_order_descending_multi(descending)
                .with_nulls_last(true)
                .with_maintain_order(true),
        );
    } else if !grouping.is_empty() {
        lf = lf.sort(
            grouping.clone(),
            SortMultipleOptions::default()
                .with_nulls_last(true)
                .with_maintain_order(true),
        );
    }

    if let Some(limit) = spec.limit {
        lf = lf.limit(limit as IdxSize);
    }

    let out = lf.collect().map_err(polars_err("Aggregation failed"))?;
    let table = dataframe_to_table(&out, &grouping, &spec.metrics)?;
    Ok((table, scanned))
}

/// 所有引用到的列都必须存在于事实表中
fn check_columns(df: &DataFrame, spec: &QuerySpecification) -> Result<(), ExecutionError> {
    let available: HashSet<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    for metric in &spec.metrics {
        if !available.contains(metric) {
            return Err(ExecutionError::Query(format!("Unknown metric: {}", metric)));
        }
    }
    for dim in spec.grouping_columns() {
        if !available.contains(&dim) {
            return Err(ExecutionError::Query(format!("Unknown dimension: {}", dim)));
        }
    }
    if let Some(node) = &spec.where_constraint {
        for dim in node.dimensions() {
            if !available.contains(dim) {
                return Err(ExecutionError::Query(format!(
                    "Unknown dimension in where constraint: {}",
                    dim
                )));
            }
        }
    }

    let grouping = spec.grouping_columns();
    for key in spec.sort_keys() {
        if !spec.metrics.contains(&key.column) && !grouping.contains(&key.column) {
            return Err(ExecutionError::Query(format!(
                "Cannot order by {}: not a requested metric or dimension",
                key.column
            )));
        }
    }
    Ok(())
}

/// 按过滤条件树逐行求值得到掩码
fn apply_constraint(df: DataFrame, node: &ConstraintNode) -> Result<DataFrame, ExecutionError> {
    let dims = node.dimensions();

    let columns = dims
        .iter()
        .map(|d| df.column(d).map(|c| (*d, c)))
        .collect::<PolarsResult<Vec<_>>>()
        .map_err(polars_err("Filter column lookup failed"))?;

    let mut mask = Vec::with_capacity(df.height());
    let mut row: HashMap<String, String> = HashMap::with_capacity(columns.len());
    for i in 0..df.height() {
        row.clear();
        for (name, column) in &columns {
            let value = column.get(i).map_err(polars_err("Filter value read failed"))?;
            if let Some(s) = any_value_to_string(&value) {
                row.insert((*name).to_string(), s);
            }
        }
        mask.push(evaluate(node, &row));
    }

    let mask = BooleanChunked::from_slice("mask".into(), &mask);
    df.filter(&mask).map_err(polars_err("Filter failed"))
}

fn any_value_to_string(value: &AnyValue) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::String(s) => Some((*s).to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        other => Some(other.to_string()),
    }
}

/// DataFrame → ResultTable
fn dataframe_to_table(
    df: &DataFrame,
    grouping: &[String],
    metrics: &[String],
) -> Result<ResultTable, ExecutionError> {
    let mut columns: Vec<ResultColumn> = grouping
        .iter()
        .map(|g| {
            if g == METRIC_TIME {
                ResultColumn::time(g.as_str())
            } else {
                ResultColumn::dimension(g.as_str())
            }
        })
        .collect();
    columns.extend(metrics.iter().map(|m| ResultColumn::metric(m.as_str())));

    let sources = columns
        .iter()
        .map(|c| df.column(&c.name))
        .collect::<PolarsResult<Vec<_>>>()
        .map_err(polars_err("Result column lookup failed"))?;

    let mut table = ResultTable::new(columns);
    for i in 0..df.height() {
        let mut cells = Vec::with_capacity(sources.len());
        for (col_idx, source) in sources.iter().enumerate() {
            let value = source.get(i).map_err(polars_err("Result value read failed"))?;
            let cell = match table.columns[col_idx].kind {
                ColumnKind::Metric => value
                    .extract::<f64>()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                ColumnKind::Time => match any_value_to_string(&value) {
                    Some(s) => match parse_temporal(&s) {
                        Some(t) => Value::String(t.to_rfc3339()),
                        None => Value::String(s),
                    },
                    None => Value::Null,
                },
                ColumnKind::Dimension => any_value_to_string(&value)
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            };
            cells.push(cell);
        }
        table.push_row(cells).map_err(ExecutionError::Internal)?;
    }
    Ok(table)
}
