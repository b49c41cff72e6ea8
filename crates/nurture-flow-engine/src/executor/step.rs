//! The step loop and the per-step context handed to node handlers.

use chrono::Utc;

use super::{edges, Executor, ExecutorError, Services};
use crate::config::EngineConfig;
use crate::errors::ExecutionStoreError;
use crate::graph::FlowGraph;
use crate::handlers;
use crate::types::*;

/// What a node handler decided.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StepOutcome {
    Advance(String),
    Suspend(chrono::DateTime<Utc>),
    Complete,
    Fail(ExecutionFailure),
}

impl StepOutcome {
    pub(crate) fn fail(kind: FailureKind, message: impl Into<String>, node_id: &str) -> Self {
        StepOutcome::Fail(ExecutionFailure::new(kind, message).at(node_id))
    }
}

/// Borrowed view of everything a handler may touch for one step.
pub(crate) struct StepCtx<'a> {
    pub config: &'a EngineConfig,
    pub services: &'a Services,
    pub graph: &'a FlowGraph<'a>,
    pub exec: &'a mut FlowExecution,
    /// Overrides the history outcome text for this step.
    pub note: Option<String>,
}

impl StepCtx<'_> {
    pub fn test_mode(&self) -> bool {
        self.exec.test_mode
    }

    pub fn skip(&mut self) {
        self.note = Some("skipped (test mode)".to_string());
    }

    /// Follow the success-path edge out of `node_id`.
    pub fn advance(&self, node_id: &str) -> StepOutcome {
        match edges::default_successor(self.graph, node_id) {
            Some(next) => StepOutcome::Advance(next.to_string()),
            None => StepOutcome::fail(
                FailureKind::MalformedNodeConfig,
                "no outgoing edge to follow",
                node_id,
            ),
        }
    }

    pub fn follow(&self, node_id: &str, label: &str) -> Option<StepOutcome> {
        edges::labeled_successor(self.graph, node_id, label).map(|next| StepOutcome::Advance(next.to_string()))
    }
}

impl Executor {
    /// Run nodes from `exec.current_node_id` until suspension, a terminal
    /// state, or the step limit. Every transition is persisted through the
    /// guarded update; losing the guard aborts with `AlreadyProcessing`.
    pub(super) async fn run_steps(
        &self,
        mut exec: FlowExecution,
        def: &FlowDefinition,
    ) -> Result<FlowExecution, ExecutorError> {
        let graph = FlowGraph::new(def);
        let mut steps: u32 = 0;

        loop {
            if steps >= self.config.step_limit {
                let failure = ExecutionFailure::new(
                    FailureKind::StepLimitExceeded,
                    format!("exceeded {} steps in one invocation", self.config.step_limit),
                )
                .at(exec.current_node_id.clone());
                return self.fail(exec, failure).await;
            }
            steps += 1;

            let node_id = exec.current_node_id.clone();
            let Some(node) = graph.node(&node_id) else {
                let failure = ExecutionFailure::new(
                    FailureKind::MalformedNodeConfig,
                    format!("node {node_id} does not exist"),
                );
                return self.fail(exec, failure).await;
            };
            let spec = match node.spec() {
                Ok(spec) => spec,
                Err(problems) => {
                    let failure = ExecutionFailure::new(FailureKind::MalformedNodeConfig, problems.join("; "))
                        .at(node_id);
                    return self.fail(exec, failure).await;
                }
            };

            // The stored record as of this step; lease renewals write it
            // back with only `claimed_until` changed.
            let mut leased = exec.clone();
            let mut ctx = StepCtx {
                config: &self.config,
                services: &self.services,
                graph: &graph,
                exec: &mut exec,
                note: None,
            };
            let outcome = {
                let handler = dispatch(&mut ctx, node, &spec);
                tokio::pin!(handler);
                let period = self.config.lease_renewal_interval();
                let mut renew = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    tokio::select! {
                        outcome = &mut handler => break outcome,
                        _ = renew.tick() => self.renew_lease(&mut leased).await?,
                    }
                }
            };
            let note = ctx.note.take();
            exec.revision = leased.revision;
            exec.claimed_until = leased.claimed_until;

            let kind = spec.kind();
            let expected = exec.revision;
            match outcome {
                StepOutcome::Advance(next) => {
                    exec.record(&node_id, kind.as_str(), note.unwrap_or_else(|| "advanced".to_string()));
                    tracing::debug!(execution_id = %exec.id, node_id = %node_id, next = %next, "step");
                    exec.current_node_id = next;
                    exec.claimed_until = Some(self.lease_until(Utc::now()));
                    exec = self.executions.update(&exec, expected).await?;
                }
                StepOutcome::Suspend(resume_at) => {
                    exec.record(&node_id, kind.as_str(), note.unwrap_or_else(|| "suspended".to_string()));
                    exec.status = ExecutionStatus::Waiting;
                    exec.resume_at = Some(resume_at);
                    exec.claimed_until = None;
                    let stored = self.executions.update(&exec, expected).await?;
                    tracing::info!(
                        execution_id = %stored.id,
                        flow_id = %stored.flow_id,
                        node_id = %node_id,
                        resume_at = %resume_at,
                        "execution suspended"
                    );
                    self.services
                        .notifier
                        .notify(ExecutionEvent::Suspended {
                            execution_id: stored.id.clone(),
                            flow_id: stored.flow_id.clone(),
                            node_id,
                            resume_at,
                        })
                        .await;
                    return Ok(stored);
                }
                StepOutcome::Complete => {
                    exec.record(&node_id, kind.as_str(), note.unwrap_or_else(|| "completed".to_string()));
                    exec.finish(ExecutionStatus::Completed);
                    let stored = self.executions.update(&exec, expected).await?;
                    tracing::info!(execution_id = %stored.id, flow_id = %stored.flow_id, "execution completed");
                    self.services
                        .notifier
                        .notify(ExecutionEvent::Completed {
                            execution_id: stored.id.clone(),
                            flow_id: stored.flow_id.clone(),
                            contact_id: stored.contact_id.clone(),
                        })
                        .await;
                    return Ok(stored);
                }
                StepOutcome::Fail(failure) => {
                    exec.record(&node_id, kind.as_str(), format!("failed: {}", failure.message));
                    return self.fail(exec, failure).await;
                }
            }
        }
    }
}

impl Executor {
    /// Push the worker lease forward while a handler is still running, so
    /// the scheduler does not take a live step for an orphaned one. Losing
    /// the guard means another worker owns the execution; the in-flight
    /// handler is dropped.
    async fn renew_lease(&self, leased: &mut FlowExecution) -> Result<(), ExecutorError> {
        leased.claimed_until = Some(self.lease_until(Utc::now()));
        match self.executions.update(leased, leased.revision).await {
            Ok(stored) => {
                tracing::debug!(execution_id = %stored.id, node_id = %stored.current_node_id, "lease renewed");
                *leased = stored;
                Ok(())
            }
            Err(ExecutionStoreError::Conflict { id, .. }) => {
                tracing::warn!(execution_id = %id, "lease lost mid-step, abandoning step");
                Err(ExecutorError::AlreadyProcessing { execution_id: id })
            }
            Err(e) => {
                tracing::warn!(execution_id = %leased.id, error = %e, "lease renewal failed");
                Ok(())
            }
        }
    }
}

async fn dispatch(ctx: &mut StepCtx<'_>, node: &NodeInstance, spec: &NodeSpec) -> StepOutcome {
    let id = node.id.as_str();
    match spec {
        NodeSpec::Trigger | NodeSpec::Join => ctx.advance(id),
        NodeSpec::End => StepOutcome::Complete,
        NodeSpec::Wait(cfg) => handlers::wait::run(cfg, Utc::now()),
        NodeSpec::SendMessage(cfg) => handlers::message::run(ctx, id, cfg).await,
        NodeSpec::Condition(cfg) => handlers::routing::condition(ctx, id, cfg),
        NodeSpec::Branch(cfg) => handlers::routing::branch(ctx, id, cfg),
        NodeSpec::AddTag(cfg) => handlers::contact::add_tag(ctx, id, cfg).await,
        NodeSpec::RemoveTag(cfg) => handlers::contact::remove_tag(ctx, id, cfg).await,
        NodeSpec::UpdateField(cfg) => handlers::contact::update_field(ctx, id, cfg).await,
        NodeSpec::HttpRequest(cfg) => handlers::http::run(ctx, id, cfg).await,
        NodeSpec::AiChatbot(cfg) => handlers::ai_chatbot::run(ctx, id, cfg).await,
    }
}
