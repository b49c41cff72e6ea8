//! Resume scheduler: the periodic scan that wakes due Waiting executions
//! and recovers Running ones whose worker lease expired.
//!
//! Each candidate is claimed with a guarded update before it is touched,
//! so several scheduler instances may scan the same store. Losing a claim
//! is a silent skip.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::errors::ExecutionStoreError;
use crate::executor::{Executor, ExecutorError};
use crate::types::{ExecutionStatus, FlowExecution};

/// Outcome counts for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub scanned: usize,
    pub claimed: usize,
    pub resumed: usize,
    pub recovered: usize,
    /// Claims or resumes lost to another worker.
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

pub struct ResumeScheduler {
    executor: Arc<Executor>,
}

impl ResumeScheduler {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }

    /// Scan once: claim every due execution and drive it forward, at most
    /// `max_concurrent_resumes` at a time.
    pub async fn tick(&self) -> TickReport {
        let config = self.executor.config();
        let store = self.executor.execution_store();
        let now = Utc::now();
        let mut report = TickReport::default();

        let due = match store.due(now, config.scan_batch_size).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "resume scan failed");
                report.errors.push(e.to_string());
                return report;
            }
        };
        report.scanned = due.len();

        let mut claimed = Vec::with_capacity(due.len());
        for exec in due {
            let mut claim = exec.clone();
            claim.claimed_until = Some(now + config.claim_ttl());
            match store.update(&claim, exec.revision).await {
                Ok(stored) => claimed.push(stored),
                Err(ExecutionStoreError::Conflict { id, .. }) => {
                    tracing::debug!(execution_id = %id, "claim lost to another worker");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(execution_id = %exec.id, error = %e, "claim failed");
                    report.errors.push(e.to_string());
                }
            }
        }
        report.claimed = claimed.len();

        let results: Vec<_> = stream::iter(claimed)
            .map(|exec| drive(self.executor.clone(), exec))
            .buffer_unordered(config.max_concurrent_resumes.max(1))
            .collect()
            .await;

        for (status, result) in results {
            match result {
                Ok(_) if status == ExecutionStatus::Waiting => report.resumed += 1,
                Ok(_) => report.recovered += 1,
                Err(ExecutorError::AlreadyProcessing { execution_id }) => {
                    tracing::debug!(execution_id = %execution_id, "resume lost to another worker");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "resume failed");
                    report.failed += 1;
                    report.errors.push(e.to_string());
                }
            }
        }

        if report.claimed > 0 {
            tracing::info!(
                scanned = report.scanned,
                resumed = report.resumed,
                recovered = report.recovered,
                skipped = report.skipped,
                failed = report.failed,
                "resume scan finished"
            );
        }
        report
    }

    /// Tick every `scheduler_interval_ms` until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.executor.config().scheduler_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.executor.config().scheduler_interval_ms,
            "resume scheduler started"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("resume scheduler stopped");
                    return;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

async fn drive(
    executor: Arc<Executor>,
    exec: FlowExecution,
) -> (ExecutionStatus, Result<FlowExecution, ExecutorError>) {
    let status = exec.status;
    let result = match status {
        ExecutionStatus::Waiting => executor.resume_loaded(exec).await,
        _ => executor.recover_claimed(exec).await,
    };
    (status, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::test_support::*;
    use crate::traits::{ExecutionStore, FlowStore};
    use std::collections::BTreeMap;
    use std::time::Duration;

    async fn waiting_execution(h: &Harness, executor: &Executor) -> FlowExecution {
        h.flows.put(&drip_flow("drip", 60)).await.unwrap();
        let exec = executor.start("drip", "c1", BTreeMap::new()).await.unwrap();
        // Pretend the wait already elapsed.
        let mut due = exec.clone();
        due.resume_at = Some(Utc::now() - chrono::Duration::seconds(1));
        h.executions.update(&due, exec.revision).await.unwrap()
    }

    #[tokio::test]
    async fn tick_resumes_due_waits() {
        let h = Harness::new();
        let executor = Arc::new(h.executor(EngineConfig::default()));
        let exec = waiting_execution(&h, &executor).await;

        let report = ResumeScheduler::new(executor.clone()).tick().await;
        assert_eq!(report.scanned, 1);
        assert_eq!(report.claimed, 1);
        assert_eq!(report.resumed, 1);
        assert!(report.errors.is_empty());

        let stored = h.executions.get(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);

        // Nothing left to do.
        let report = ResumeScheduler::new(executor).tick().await;
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn tick_ignores_waits_not_yet_due() {
        let h = Harness::new();
        let executor = Arc::new(h.executor(EngineConfig::default()));
        h.flows.put(&drip_flow("drip", 60)).await.unwrap();
        executor.start("drip", "c1", BTreeMap::new()).await.unwrap();

        let report = ResumeScheduler::new(executor).tick().await;
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn claimed_execution_is_not_rescanned() {
        let h = Harness::new();
        let executor = Arc::new(h.executor(EngineConfig::default()));
        let exec = waiting_execution(&h, &executor).await;

        // Another worker holds a live claim.
        let mut claim = exec.clone();
        claim.claimed_until = Some(Utc::now() + chrono::Duration::seconds(60));
        h.executions.update(&claim, exec.revision).await.unwrap();

        let report = ResumeScheduler::new(executor).tick().await;
        assert_eq!(report.scanned, 0);
        let stored = h.executions.get(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Waiting);
    }

    #[tokio::test]
    async fn expired_lease_is_recovered() {
        let h = Harness::new();
        let executor = Arc::new(h.executor(EngineConfig::default()));
        h.flows.put(&welcome_flow("welcome")).await.unwrap();

        // A worker died right after persisting entry into "welcome".
        let mut orphan = FlowExecution::new("welcome", "team-1", "c1", "welcome", BTreeMap::new());
        orphan.claimed_until = Some(Utc::now() - chrono::Duration::seconds(1));
        h.executions.insert_active(&orphan).await.unwrap();

        let report = ResumeScheduler::new(executor).tick().await;
        assert_eq!(report.recovered, 1);
        let stored = h.executions.get(&orphan.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert_eq!(h.messaging.sent().len(), 1);
    }

    #[tokio::test]
    async fn slow_step_keeps_its_lease() {
        let h = Harness::new();
        let def = FlowBuilder::new("slow")
            .node("t", "trigger")
            .node_with(
                "call",
                "http_request",
                serde_json::json!({"url": "https://crm.test/slow", "method": "POST", "timeout_ms": 10_000}),
            )
            .node("e", "end")
            .edge("t", "call")
            .edge("call", "e")
            .build();
        h.flows.put(&def).await.unwrap();

        let http = Arc::new(SlowHttpCaller::new(Duration::from_millis(2500)));
        let config = EngineConfig {
            claim_ttl_secs: 1,
            ..EngineConfig::default()
        };
        let services = crate::executor::Services {
            http: http.clone(),
            ..h.services()
        };
        let executor = Arc::new(h.executor_with(config, services));

        let worker = tokio::spawn({
            let executor = Arc::clone(&executor);
            async move { executor.start("slow", "c1", BTreeMap::new()).await }
        });
        // Past the original lease, while the call is still in flight.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let report = ResumeScheduler::new(Arc::clone(&executor)).tick().await;
        assert_eq!(report.claimed, 0, "{report:?}");
        assert_eq!(report.recovered, 0);

        let exec = worker.await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let h = Harness::new();
        let config = EngineConfig {
            scheduler_interval_ms: 10,
            ..EngineConfig::default()
        };
        let executor = Arc::new(h.executor(config));
        let exec = waiting_execution(&h, &executor).await;

        let (tx, rx) = broadcast::channel(1);
        let handle = ResumeScheduler::new(executor).spawn(rx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();

        let stored = h.executions.get(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
    }
}
