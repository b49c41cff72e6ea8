//! In-memory execution store.
//!
//! A single `tokio::sync::Mutex` around the map makes `insert_active` and
//! `update` atomic, which is all the executor needs for its guards.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::errors::ExecutionStoreError;
use crate::traits::{ExecutionFilter, ExecutionPage, ExecutionStore};
use crate::types::{ExecutionStatus, FlowExecution};

#[derive(Clone, Default)]
pub struct InMemoryExecutionStore {
    executions: Arc<Mutex<BTreeMap<String, FlowExecution>>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn claim_expired(exec: &FlowExecution, now: DateTime<Utc>) -> bool {
    exec.claimed_until.is_none_or(|until| until <= now)
}

fn is_due(exec: &FlowExecution, now: DateTime<Utc>) -> bool {
    match exec.status {
        ExecutionStatus::Waiting => exec.resume_at.is_some_and(|at| at <= now) && claim_expired(exec, now),
        ExecutionStatus::Running => claim_expired(exec, now),
        _ => false,
    }
}

fn due_key(exec: &FlowExecution) -> DateTime<Utc> {
    exec.resume_at
        .or(exec.claimed_until)
        .unwrap_or(exec.started_at)
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn insert_active(&self, execution: &FlowExecution) -> Result<(), ExecutionStoreError> {
        let mut map = self.executions.lock().await;
        if let Some(existing) = map.values().find(|e| {
            e.is_active() && e.flow_id == execution.flow_id && e.contact_id == execution.contact_id
        }) {
            return Err(ExecutionStoreError::AlreadyActive {
                flow_id: execution.flow_id.clone(),
                contact_id: execution.contact_id.clone(),
                existing_id: existing.id.clone(),
            });
        }
        map.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<Option<FlowExecution>, ExecutionStoreError> {
        Ok(self.executions.lock().await.get(execution_id).cloned())
    }

    async fn update(
        &self,
        execution: &FlowExecution,
        expected_revision: u64,
    ) -> Result<FlowExecution, ExecutionStoreError> {
        let mut map = self.executions.lock().await;
        let stored = map
            .get_mut(&execution.id)
            .ok_or_else(|| ExecutionStoreError::NotFound {
                id: execution.id.clone(),
            })?;
        if stored.revision != expected_revision {
            return Err(ExecutionStoreError::Conflict {
                id: execution.id.clone(),
                expected: expected_revision,
                actual: stored.revision,
            });
        }
        let mut next = execution.clone();
        next.revision = expected_revision + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn find_active(
        &self,
        flow_id: &str,
        contact_id: &str,
    ) -> Result<Option<FlowExecution>, ExecutionStoreError> {
        Ok(self
            .executions
            .lock()
            .await
            .values()
            .find(|e| e.is_active() && e.flow_id == flow_id && e.contact_id == contact_id)
            .cloned())
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<ExecutionPage, ExecutionStoreError> {
        let map = self.executions.lock().await;
        let mut matching: Vec<&FlowExecution> = map.values().filter(|e| filter.matches(e)).collect();
        // Newest first, id as tiebreaker.
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        let total = matching.len();
        let executions = matching
            .into_iter()
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(ExecutionPage { executions, total })
    }

    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FlowExecution>, ExecutionStoreError> {
        let map = self.executions.lock().await;
        let mut due: Vec<&FlowExecution> = map.values().filter(|e| is_due(e, now)).collect();
        due.sort_by_key(|e| due_key(e));
        Ok(due.into_iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn exec(flow: &str, contact: &str) -> FlowExecution {
        FlowExecution::new(flow, "t1", contact, "n1", BTreeMap::new())
    }

    #[tokio::test]
    async fn insert_active_enforces_one_live_run() {
        let store = InMemoryExecutionStore::new();
        let first = exec("f1", "c1");
        store.insert_active(&first).await.unwrap();

        let err = store.insert_active(&exec("f1", "c1")).await.unwrap_err();
        assert!(matches!(err, ExecutionStoreError::AlreadyActive { existing_id, .. } if existing_id == first.id));

        // Other contacts and other flows are independent.
        store.insert_active(&exec("f1", "c2")).await.unwrap();
        store.insert_active(&exec("f2", "c1")).await.unwrap();
    }

    #[tokio::test]
    async fn terminal_runs_do_not_block_new_ones() {
        let store = InMemoryExecutionStore::new();
        let mut first = exec("f1", "c1");
        store.insert_active(&first).await.unwrap();
        first.finish(ExecutionStatus::Completed);
        store.update(&first, 0).await.unwrap();

        store.insert_active(&exec("f1", "c1")).await.unwrap();
    }

    #[tokio::test]
    async fn update_is_revision_guarded() {
        let store = InMemoryExecutionStore::new();
        let e = exec("f1", "c1");
        store.insert_active(&e).await.unwrap();

        let stored = store.update(&e, 0).await.unwrap();
        assert_eq!(stored.revision, 1);

        let err = store.update(&e, 0).await.unwrap_err();
        assert!(matches!(err, ExecutionStoreError::Conflict { expected: 0, actual: 1, .. }));
    }

    #[tokio::test]
    async fn due_selects_elapsed_waits_and_expired_leases() {
        let store = InMemoryExecutionStore::new();
        let now = Utc::now();

        let mut ready = exec("f1", "c1");
        ready.status = ExecutionStatus::Waiting;
        ready.resume_at = Some(now - Duration::seconds(5));

        let mut early = exec("f1", "c2");
        early.status = ExecutionStatus::Waiting;
        early.resume_at = Some(now + Duration::seconds(60));

        let mut claimed = exec("f1", "c3");
        claimed.status = ExecutionStatus::Waiting;
        claimed.resume_at = Some(now - Duration::seconds(10));
        claimed.claimed_until = Some(now + Duration::seconds(60));

        let mut stale = exec("f1", "c4");
        stale.claimed_until = Some(now - Duration::seconds(1));

        let mut leased = exec("f1", "c5");
        leased.claimed_until = Some(now + Duration::seconds(60));

        for e in [&ready, &early, &claimed, &stale, &leased] {
            store.insert_active(e).await.unwrap();
        }

        let due = store.due(now, 10).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|e| e.contact_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c4"]);
        assert_eq!(store.due(now, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let store = InMemoryExecutionStore::new();
        for c in ["c1", "c2", "c3"] {
            store.insert_active(&exec("f1", c)).await.unwrap();
        }
        store.insert_active(&exec("f2", "c1")).await.unwrap();

        let page = store
            .list(&ExecutionFilter {
                limit: Some(2),
                ..ExecutionFilter::for_flow("f1")
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.executions.len(), 2);
    }
}
