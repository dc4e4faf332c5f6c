//! 结果物化器

use super::series::to_series;
use super::table_store::{TableLocation, TableStore};
use super::tabular::{to_tabular, Orient, TabularPage};
use crate::cache::CacheMode;
use crate::manager::QueryManager;
use crate::model::{MqlQueryResultSeries, QueryId, QuerySpecification};
use crate::observability::MATERIALIZE_TOTAL;
use crate::{MqlError, Result};
use std::sync::Arc;

/// 结果物化器
///
/// 把已完成查询的结果转成序列 / 分页表格，或写成外部表。
pub struct ResultMaterializer {
    manager: Arc<QueryManager>,
    store: Arc<dyn TableStore>,
    default_schema: String,
    page_size: usize,
}

impl ResultMaterializer {
    pub fn new(
        manager: Arc<QueryManager>,
        store: Arc<dyn TableStore>,
        default_schema: impl Into<String>,
        page_size: usize,
    ) -> Self {
        Self {
            manager,
            store,
            default_schema: default_schema.into(),
            page_size,
        }
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    /// 序列视图
    pub fn series(&self, id: &QueryId) -> Result<Vec<MqlQueryResultSeries>> {
        let table = self.manager.result(id)?;
        Ok(to_series(&table))
    }

    /// 分页表格视图
    pub fn tabular(&self, id: &QueryId, cursor: Option<&str>, orient: Orient) -> Result<TabularPage> {
        let table = self.manager.result(id)?;
        to_tabular(id, &table, cursor, orient, self.page_size)
    }

    /// 执行（或复用缓存）并写成外部表
    ///
    /// `as_table` 为 `schema.table` 或 `table`；缺省为 `mql_<查询 id>`。
    pub async fn materialize(
        &self,
        mut spec: QuerySpecification,
        as_table: Option<&str>,
        cache_mode: CacheMode,
    ) -> Result<TableLocation> {
        // 表名在提交前校验，非法名称不会触发执行
        let requested = as_table
            .filter(|t| !t.trim().is_empty())
            .map(|t| TableLocation::parse(t, &self.default_schema))
            .transpose()
            .map_err(|e| MqlError::Validation(e.to_string()))?;

        spec.cache_mode = cache_mode;
        let id = self.manager.submit(spec)?;
        let status = self.manager.wait(&id).await?;
        log::info!("Materialize query {} finished with {}", id, status);

        let table = match self.manager.result(&id) {
            Ok(table) => table,
            Err(e) => {
                MATERIALIZE_TOTAL.with_label_values(&["error"]).inc();
                return Err(e);
            }
        };

        let location = match requested {
            Some(loc) => loc,
            None => TableLocation {
                schema: self.default_schema.clone(),
                table: id.as_str().to_string(),
            },
        };

        if let Err(e) = self.store.write_table(&location, table).await {
            MATERIALIZE_TOTAL.with_label_values(&["error"]).inc();
            return Err(e.into());
        }
        MATERIALIZE_TOTAL.with_label_values(&["ok"]).inc();
        log::info!("Query {} materialized as {}", id, location);
        Ok(location)
    }
}
