//! 分页表格编码
//!
//! 每页：按 `Orient` 组织成 JSON，再做标准 base64 编码。
//! 游标是 URL 安全的 base64(JSON{v, query_id, offset})，只对签发它的查询有效。

use crate::model::{ColumnKind, QueryId, ResultTable};
use crate::{MqlError, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

const CURSOR_VERSION: u8 = 1;

/// 表格方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orient {
    /// `{"columns": [..], "index": [..], "data": [[..]]}`
    Split,
    /// `[{col: val, ..}, ..]`
    #[default]
    Records,
    /// `{"<row>": {col: val}}`
    Index,
    /// `{col: {"<row>": val}}`
    Columns,
    /// `[[..], ..]`
    Values,
    /// `{"schema": {"fields": [..], "primary_key": ["index"]}, "data": [..]}`
    Table,
}

impl Orient {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orient::Split => "split",
            Orient::Records => "records",
            Orient::Index => "index",
            Orient::Columns => "columns",
            Orient::Values => "values",
            Orient::Table => "table",
        }
    }
}

impl FromStr for Orient {
    type Err = MqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(Orient::Split),
            "records" => Ok(Orient::Records),
            "index" => Ok(Orient::Index),
            "columns" => Ok(Orient::Columns),
            "values" => Ok(Orient::Values),
            "table" => Ok(Orient::Table),
            other => Err(MqlError::Validation(format!("Unknown orient: {}", other))),
        }
    }
}

impl fmt::Display for Orient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一页表格数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularPage {
    /// base64(JSON)
    pub data: String,
    /// 下一页游标（最后一页为 None）
    pub next_cursor: Option<String>,
}

impl TabularPage {
    /// 解码 data 字段
    pub fn decode_data(&self) -> Result<Value> {
        let bytes = STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| MqlError::Internal(format!("page base64 decode failed: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| MqlError::Internal(format!("page json decode failed: {}", e)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorToken {
    v: u8,
    query_id: String,
    offset: usize,
}

pub fn encode_cursor(query_id: &QueryId, offset: usize) -> String {
    let token = CursorToken {
        v: CURSOR_VERSION,
        query_id: query_id.as_str().to_string(),
        offset,
    };
    // 只含字符串和整数，序列化不会失败
    let bytes = serde_json::to_vec(&token).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 解析游标，返回起始行
pub fn decode_cursor(cursor: &str, query_id: &QueryId) -> Result<usize> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.as_bytes())
        .map_err(|e| MqlError::Validation(format!("cursor base64 decode failed: {}", e)))?;
    let token: CursorToken = serde_json::from_slice(&bytes)
        .map_err(|e| MqlError::Validation(format!("cursor json decode failed: {}", e)))?;
    if token.v != CURSOR_VERSION {
        return Err(MqlError::Validation(format!(
            "unsupported cursor version: {}",
            token.v
        )));
    }
    if token.query_id != query_id.as_str() {
        return Err(MqlError::Validation(
            "cursor was issued for a different query".to_string(),
        ));
    }
    Ok(token.offset)
}

/// 生成一页表格
///
/// 依次跟随 `next_cursor` 会恰好覆盖每一行一次。
pub fn to_tabular(
    query_id: &QueryId,
    table: &ResultTable,
    cursor: Option<&str>,
    orient: Orient,
    page_size: usize,
) -> Result<TabularPage> {
    if page_size == 0 {
        return Err(MqlError::Config("tabular page size must be > 0".to_string()));
    }

    let offset = match cursor {
        Some(c) if !c.is_empty() => decode_cursor(c, query_id)?,
        _ => 0,
    };
    let total = table.row_count();
    if offset > total {
        return Err(MqlError::Validation(format!(
            "cursor offset {} beyond result of {} rows",
            offset, total
        )));
    }

    let end = offset.saturating_add(page_size).min(total);
    let page = render(table, offset, end, orient);
    let bytes = serde_json::to_vec(&page)
        .map_err(|e| MqlError::Internal(format!("page serialization failed: {}", e)))?;

    Ok(TabularPage {
        data: STANDARD.encode(bytes),
        next_cursor: (end < total).then(|| encode_cursor(query_id, end)),
    })
}

fn render(table: &ResultTable, start: usize, end: usize, orient: Orient) -> Value {
    let names = table.column_names();
    let rows = &table.rows[start..end];
    let row_object = |row: &Vec<Value>| -> Map<String, Value> {
        names
            .iter()
            .zip(row.iter())
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    };

    match orient {
        Orient::Split => json!({
            "columns": names,
            "index": (start..end).collect::<Vec<_>>(),
            "data": rows,
        }),
        Orient::Records => Value::Array(rows.iter().map(|r| Value::Object(row_object(r))).collect()),
        Orient::Index => {
            let map: Map<String, Value> = rows
                .iter()
                .enumerate()
                .map(|(i, r)| ((start + i).to_string(), Value::Object(row_object(r))))
                .collect();
            Value::Object(map)
        }
        Orient::Columns => {
            let map: Map<String, Value> = names
                .iter()
                .enumerate()
                .map(|(c, name)| {
                    let column: Map<String, Value> = rows
                        .iter()
                        .enumerate()
                        .map(|(i, r)| ((start + i).to_string(), r[c].clone()))
                        .collect();
                    (name.to_string(), Value::Object(column))
                })
                .collect();
            Value::Object(map)
        }
        Orient::Values => json!(rows),
        Orient::Table => {
            let index_key = index_key(&names);
            let mut fields = vec![json!({"name": index_key, "type": "integer"})];
            fields.extend(table.columns.iter().map(|c| {
                let ty = match c.kind {
                    ColumnKind::Dimension => "string",
                    ColumnKind::Time => "datetime",
                    ColumnKind::Metric => "number",
                };
                json!({"name": c.name, "type": ty})
            }));
            let data: Vec<Value> = rows
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    let mut obj = row_object(r);
                    obj.insert(index_key.clone(), json!(start + i));
                    Value::Object(obj)
                })
                .collect();
            json!({
                "schema": {"fields": fields, "primary_key": [index_key]},
                "data": data,
            })
        }
    }
}

/// 行号列名：与结果列重名时依次改用 `level_0`、`level_1` …
fn index_key(names: &[&str]) -> String {
    std::iter::once("index".to_string())
        .chain((0..).map(|i| format!("level_{}", i)))
        .find(|candidate| !names.contains(&candidate.as_str()))
        .unwrap_or_else(|| "index".to_string())
}
