//! 结果物化
//!
//! - `to_series`: 按维度切片生成强类型序列
//! - `to_tabular`: 分页、可选方向的 base64 表格
//! - `ResultMaterializer::materialize`: 执行并写出外部表

pub mod materializer;
pub mod series;
pub mod table_store;
pub mod tabular;

pub use materializer::ResultMaterializer;
pub use series::{to_series, ALL_SERIES};
pub use table_store::{ParquetTableStore, TableLocation, TableStore, TableStoreError};
pub use tabular::{decode_cursor, encode_cursor, to_tabular, Orient, TabularPage};
