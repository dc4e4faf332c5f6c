//! 单个查询的生命周期记录

use crate::cache::Fingerprint;
use crate::execution::QueryLog;
use crate::model::{
    MqlQuery, MqlQueryStatus, MqlQuerySummary, QueryId, QuerySpecification, ResultTable,
};
use crate::observability::{ACTIVE_QUERIES, QUERY_COMPLETED_TOTAL};
use crate::utils::time::now_millis;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// 非法状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: MqlQueryStatus,
    pub to: MqlQueryStatus,
}

#[derive(Debug)]
struct RecordState {
    status: MqlQueryStatus,
    result: Option<Arc<ResultTable>>,
    error: Option<String>,
    completed_at: Option<i64>,
    completed_instant: Option<Instant>,
}

/// 查询记录
///
/// 状态只能通过 `transition` 修改；终态之后记录只读。
#[derive(Debug)]
pub struct QueryRecord {
    pub id: QueryId,
    pub spec: Arc<QuerySpecification>,
    pub fingerprint: Fingerprint,
    pub log: Arc<QueryLog>,
    /// 提交序号（同一毫秒内提交的查询按它排序）
    pub seq: u64,
    pub created_at: i64,
    state: RwLock<RecordState>,
    status_tx: watch::Sender<MqlQueryStatus>,
}

impl QueryRecord {
    pub fn new(
        id: QueryId,
        spec: QuerySpecification,
        fingerprint: Fingerprint,
        seq: u64,
    ) -> Self {
        let (status_tx, _) = watch::channel(MqlQueryStatus::Pending);
        Self {
            log: Arc::new(QueryLog::new(id.as_str())),
            id,
            spec: Arc::new(spec),
            fingerprint,
            seq,
            created_at: now_millis(),
            state: RwLock::new(RecordState {
                status: MqlQueryStatus::Pending,
                result: None,
                error: None,
                completed_at: None,
                completed_instant: None,
            }),
            status_tx,
        }
    }

    pub fn status(&self) -> MqlQueryStatus {
        self.state.read().status
    }

    pub fn result(&self) -> Option<Arc<ResultTable>> {
        self.state.read().result.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<MqlQueryStatus> {
        self.status_tx.subscribe()
    }

    /// 进入终态后经过的时间
    pub fn terminal_age(&self, now: Instant) -> Option<std::time::Duration> {
        self.state
            .read()
            .completed_instant
            .map(|t| now.saturating_duration_since(t))
    }

    /// 状态迁移（唯一入口）
    pub fn transition(&self, next: MqlQueryStatus) -> Result<(), InvalidTransition> {
        self.transition_with(next, None, None)
    }

    /// 成功完成并附带结果
    pub fn succeed(&self, table: Arc<ResultTable>) -> Result<(), InvalidTransition> {
        self.transition_with(MqlQueryStatus::Successful, Some(table), None)
    }

    /// 以失败类终态结束并记录原因
    pub fn fail(&self, status: MqlQueryStatus, detail: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition_with(status, None, Some(detail.into()))
    }

    fn transition_with(
        &self,
        next: MqlQueryStatus,
        result: Option<Arc<ResultTable>>,
        error: Option<String>,
    ) -> Result<(), InvalidTransition> {
        let mut state = self.state.write();
        let from = state.status;
        if !from.can_transition_to(next) {
            log::warn!(
                "[{}] Rejected status transition {} -> {}",
                self.id,
                from,
                next
            );
            return Err(InvalidTransition { from, to: next });
        }

        state.status = next;
        if result.is_some() {
            state.result = result;
        }
        if error.is_some() {
            state.error = error;
        }
        if next.is_terminal() {
            state.completed_at = Some(now_millis());
            state.completed_instant = Some(Instant::now());
            QUERY_COMPLETED_TOTAL.with_label_values(&[next.as_str()]).inc();
        }
        if from.is_active() && !next.is_active() {
            ACTIVE_QUERIES.dec();
        }
        drop(state);

        log::info!("[{}] {} -> {}", self.id, from, next);
        self.status_tx.send_replace(next);
        Ok(())
    }

    /// 对外只读视图
    pub fn snapshot(&self) -> MqlQuery {
        let state = self.state.read();
        MqlQuery {
            id: self.id.clone(),
            model_key: self.spec.model_key.clone(),
            metrics: self.spec.metrics.clone(),
            dimensions: self.spec.group_by.clone(),
            status: state.status,
            result: state.result.clone(),
            logs: self.log.snapshot(),
            error: state.error.clone(),
            created_at: self.created_at,
            completed_at: state.completed_at,
        }
    }

    pub fn summary(&self) -> MqlQuerySummary {
        let state = self.state.read();
        MqlQuerySummary {
            id: self.id.clone(),
            model_key: self.spec.model_key.clone(),
            metrics: self.spec.metrics.clone(),
            dimensions: self.spec.group_by.clone(),
            status: state.status,
            created_at: self.created_at,
            completed_at: state.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKey;

    fn record() -> QueryRecord {
        let spec = QuerySpecification::new(
            ModelKey::new("acme", "metrics", "main", "abc123"),
            vec!["revenue".into()],
        );
        QueryRecord::new(QueryId::from("mql_test"), spec, Fingerprint::from("fp"), 0)
    }

    #[test]
    fn test_happy_path() {
        let r = record();
        assert_eq!(r.status(), MqlQueryStatus::Pending);
        r.transition(MqlQueryStatus::Running).unwrap();
        r.succeed(Arc::new(ResultTable::default())).unwrap();
        assert_eq!(r.status(), MqlQueryStatus::Successful);
        assert!(r.result().is_some());
        assert!(r.snapshot().completed_at.is_some());
        assert!(r.terminal_age(Instant::now()).is_some());
    }

    #[test]
    fn test_terminal_is_final() {
        let r = record();
        r.transition(MqlQueryStatus::Running).unwrap();
        r.fail(MqlQueryStatus::Failed, "boom").unwrap();
        let err = r.transition(MqlQueryStatus::Running).unwrap_err();
        assert_eq!(err.from, MqlQueryStatus::Failed);
        assert!(r.succeed(Arc::new(ResultTable::default())).is_err());
        assert_eq!(r.status(), MqlQueryStatus::Failed);
        assert_eq!(r.error().as_deref(), Some("boom"));
        assert!(r.result().is_none());
    }

    #[test]
    fn test_unknown_only_reconciles_to_failed() {
        let r = record();
        r.transition(MqlQueryStatus::Running).unwrap();
        r.transition(MqlQueryStatus::Unknown).unwrap();
        assert!(r.transition(MqlQueryStatus::Successful).is_err());
        r.transition(MqlQueryStatus::Failed).unwrap();
    }

    #[tokio::test]
    async fn test_watch_sees_transitions() {
        let r = record();
        let mut rx = r.subscribe();
        r.transition(MqlQueryStatus::Running).unwrap();
        r.succeed(Arc::new(ResultTable::default())).unwrap();
        let status = *rx.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(status, MqlQueryStatus::Successful);
    }
}
