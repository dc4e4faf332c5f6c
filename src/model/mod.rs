//! 数据模型
//!
//! - `ModelKey`: 语义模型快照标识
//! - `QuerySpecification`: 不可变的查询输入
//! - `MqlQuery` / `MqlQueryStatus`: 查询生命周期记录
//! - `ResultTable` / `MqlQueryResultSeries` / `ResultDatum`: 结果表示

pub mod key;
pub mod query;
pub mod result;
pub mod spec;

pub use key::ModelKey;
pub use query::{MqlQuery, MqlQueryStatus, MqlQuerySummary, QueryId};
pub use result::{ColumnKind, MqlQueryResultSeries, ResultColumn, ResultDatum, ResultTable};
pub use spec::{PostProcessor, QuerySpecification, SortKey, METRIC_TIME};
