//! Execution state machine: the core of the flow engine.
//!
//! Walks a flow graph for one contact, one node at a time, until the run
//! suspends at a Wait node or reaches a terminal state. Progress is persisted
//! after every step through the execution store's revision-guarded update,
//! which is the only mutual exclusion between workers. A worker that loses
//! the guard stops and reports [`ExecutorError::AlreadyProcessing`].

pub(crate) mod edges;
mod step;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::errors::{ContactStoreError, ExecutionStoreError, FlowStoreError};
use crate::graph::FlowGraph;
use crate::traits::{AiCompletion, ContactStore, ExecutionStore, FlowStore, HttpCaller, MessagingGateway, NotificationSink};
use crate::types::*;

pub(crate) use step::{StepCtx, StepOutcome};

/// Attempts made to land a cancel or an event merge against concurrent
/// writers before giving up.
const GUARD_RETRIES: usize = 3;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Errors from the executor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    #[error("flow not found: {flow_id}")]
    FlowNotFound { flow_id: String },
    #[error("flow is inactive: {flow_id}")]
    FlowInactive { flow_id: String },
    /// The at-most-one invariant: a live execution already exists.
    #[error("flow {flow_id} is already running for contact {contact_id} (execution {execution_id})")]
    AlreadyRunning {
        flow_id: String,
        contact_id: String,
        execution_id: String,
    },
    #[error("execution not found: {execution_id}")]
    ExecutionNotFound { execution_id: String },
    /// Another worker advanced the execution first.
    #[error("execution {execution_id} is already being processed")]
    AlreadyProcessing { execution_id: String },
    #[error("flow {flow_id} has no trigger node")]
    MissingTrigger { flow_id: String },
    #[error(transparent)]
    FlowStore(#[from] FlowStoreError),
    #[error(transparent)]
    ExecutionStore(ExecutionStoreError),
    #[error(transparent)]
    ContactStore(#[from] ContactStoreError),
}

impl From<ExecutionStoreError> for ExecutorError {
    fn from(e: ExecutionStoreError) -> Self {
        match e {
            ExecutionStoreError::Conflict { id, .. } => ExecutorError::AlreadyProcessing { execution_id: id },
            ExecutionStoreError::NotFound { id } => ExecutorError::ExecutionNotFound { execution_id: id },
            ExecutionStoreError::AlreadyActive {
                flow_id,
                contact_id,
                existing_id,
            } => ExecutorError::AlreadyRunning {
                flow_id,
                contact_id,
                execution_id: existing_id,
            },
            other => ExecutorError::ExecutionStore(other),
        }
    }
}

/// External collaborators used by node handlers.
#[derive(Clone)]
pub struct Services {
    pub contacts: Arc<dyn ContactStore>,
    pub messaging: Arc<dyn MessagingGateway>,
    pub ai: Option<Arc<dyn AiCompletion>>,
    pub http: Arc<dyn HttpCaller>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// The execution state machine.
pub struct Executor {
    config: EngineConfig,
    flows: Arc<dyn FlowStore>,
    executions: Arc<dyn ExecutionStore>,
    services: Services,
}

impl Executor {
    pub fn new(
        config: EngineConfig,
        flows: Arc<dyn FlowStore>,
        executions: Arc<dyn ExecutionStore>,
        services: Services,
    ) -> Self {
        Self {
            config,
            flows,
            executions,
            services,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn execution_store(&self) -> &Arc<dyn ExecutionStore> {
        &self.executions
    }

    fn lease_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.config.claim_ttl()
    }

    // -----------------------------------------------------------------------
    // start
    // -----------------------------------------------------------------------

    /// Create an execution for (flow, contact) and run it to its first
    /// suspension or terminal state.
    pub async fn start(
        &self,
        flow_id: &str,
        contact_id: &str,
        initial_data: BTreeMap<String, Value>,
    ) -> Result<FlowExecution, ExecutorError> {
        self.start_with(flow_id, contact_id, initial_data, false).await
    }

    /// Like [`start`](Self::start) but with `testMode` set: collaborator side
    /// effects are skipped and inactive flows are allowed.
    pub async fn start_test(
        &self,
        flow_id: &str,
        contact_id: &str,
        initial_data: BTreeMap<String, Value>,
    ) -> Result<FlowExecution, ExecutorError> {
        self.start_with(flow_id, contact_id, initial_data, true).await
    }

    async fn start_with(
        &self,
        flow_id: &str,
        contact_id: &str,
        initial_data: BTreeMap<String, Value>,
        test_mode: bool,
    ) -> Result<FlowExecution, ExecutorError> {
        let def = self
            .flows
            .get(flow_id)
            .await?
            .ok_or_else(|| ExecutorError::FlowNotFound {
                flow_id: flow_id.to_string(),
            })?;
        if !def.is_active && !test_mode {
            return Err(ExecutorError::FlowInactive {
                flow_id: flow_id.to_string(),
            });
        }

        // Cheap pre-check; insert_active below is the authoritative one.
        if let Some(existing) = self.executions.find_active(flow_id, contact_id).await? {
            return Err(ExecutorError::AlreadyRunning {
                flow_id: flow_id.to_string(),
                contact_id: contact_id.to_string(),
                execution_id: existing.id,
            });
        }

        let graph = FlowGraph::new(&def);
        let trigger = graph
            .trigger_nodes()
            .first()
            .map(|n| n.id.clone())
            .ok_or_else(|| ExecutorError::MissingTrigger {
                flow_id: flow_id.to_string(),
            })?;
        let entry = edges::default_successor(&graph, &trigger)
            .map(str::to_string)
            .unwrap_or(trigger);

        let snapshot = self
            .services
            .contacts
            .snapshot(&def.team_id, contact_id)
            .await?
            .unwrap_or_else(|| json!({ "id": contact_id }));
        let mut variables = def.variables.clone();
        variables.insert(CONTACT_VARIABLE.to_string(), snapshot);
        variables.extend(initial_data);
        if test_mode {
            variables.insert(TEST_MODE_VARIABLE.to_string(), Value::Bool(true));
        }

        let now = Utc::now();
        let mut exec = FlowExecution::new(&def.id, &def.team_id, contact_id, entry, variables);
        exec.definition_hash = def.definition_hash.clone();
        exec.test_mode = test_mode;
        exec.claimed_until = Some(self.lease_until(now));
        self.executions.insert_active(&exec).await?;

        tracing::info!(
            execution_id = %exec.id,
            flow_id = %exec.flow_id,
            contact_id = %exec.contact_id,
            test_mode,
            "execution started"
        );
        self.services
            .notifier
            .notify(ExecutionEvent::Started {
                execution_id: exec.id.clone(),
                flow_id: exec.flow_id.clone(),
                contact_id: exec.contact_id.clone(),
            })
            .await;

        self.run_steps(exec, &def).await
    }

    // -----------------------------------------------------------------------
    // resume / recover
    // -----------------------------------------------------------------------

    /// Continue a Waiting execution past its Wait node once `resume_at` has
    /// elapsed. Premature calls and non-Waiting executions are no-ops that
    /// return the execution unchanged.
    pub async fn resume(&self, execution_id: &str) -> Result<FlowExecution, ExecutorError> {
        let exec = self.load(execution_id).await?;
        self.resume_loaded(exec).await
    }

    pub(crate) async fn resume_loaded(&self, mut exec: FlowExecution) -> Result<FlowExecution, ExecutorError> {
        let now = Utc::now();
        if exec.status != ExecutionStatus::Waiting {
            tracing::debug!(execution_id = %exec.id, status = %exec.status, "resume ignored: not waiting");
            return Ok(exec);
        }
        if exec.resume_at.is_some_and(|at| at > now) {
            tracing::debug!(execution_id = %exec.id, resume_at = ?exec.resume_at, "resume ignored: too early");
            return Ok(exec);
        }

        let Some(def) = self.flows.get(&exec.flow_id).await? else {
            let failure = ExecutionFailure::new(
                FailureKind::MalformedNodeConfig,
                format!("flow {} no longer exists", exec.flow_id),
            );
            return self.fail(exec, failure).await;
        };
        let graph = FlowGraph::new(&def);
        let wait_node = exec.current_node_id.clone();
        let Some(next) = edges::default_successor(&graph, &wait_node).map(str::to_string) else {
            let failure = ExecutionFailure::new(FailureKind::MalformedNodeConfig, "Wait node has no outgoing edge")
                .at(wait_node);
            return self.fail(exec, failure).await;
        };

        let expected = exec.revision;
        exec.status = ExecutionStatus::Running;
        exec.resume_at = None;
        exec.current_node_id = next;
        exec.claimed_until = Some(self.lease_until(now));
        let exec = self.executions.update(&exec, expected).await?;

        tracing::info!(execution_id = %exec.id, flow_id = %exec.flow_id, node_id = %wait_node, "execution resumed");
        self.services
            .notifier
            .notify(ExecutionEvent::Resumed {
                execution_id: exec.id.clone(),
                flow_id: exec.flow_id.clone(),
            })
            .await;

        self.run_steps(exec, &def).await
    }

    /// Re-enter a Running execution whose previous worker died, at its
    /// persisted `current_node_id`. The caller must already hold the lease.
    pub(crate) async fn recover_claimed(&self, exec: FlowExecution) -> Result<FlowExecution, ExecutorError> {
        if exec.status != ExecutionStatus::Running {
            return Ok(exec);
        }
        let Some(def) = self.flows.get(&exec.flow_id).await? else {
            let failure = ExecutionFailure::new(
                FailureKind::MalformedNodeConfig,
                format!("flow {} no longer exists", exec.flow_id),
            );
            return self.fail(exec, failure).await;
        };
        tracing::warn!(
            execution_id = %exec.id,
            flow_id = %exec.flow_id,
            node_id = %exec.current_node_id,
            "recovering execution with expired lease"
        );
        self.run_steps(exec, &def).await
    }

    // -----------------------------------------------------------------------
    // cancel
    // -----------------------------------------------------------------------

    /// Move a Running or Waiting execution to Cancelled. Idempotent on
    /// terminal executions.
    pub async fn cancel(&self, execution_id: &str) -> Result<FlowExecution, ExecutorError> {
        for _ in 0..GUARD_RETRIES {
            let mut exec = self.load(execution_id).await?;
            if exec.status.is_terminal() {
                return Ok(exec);
            }
            let expected = exec.revision;
            exec.finish(ExecutionStatus::Cancelled);
            match self.executions.update(&exec, expected).await {
                Ok(stored) => {
                    tracing::info!(execution_id = %stored.id, flow_id = %stored.flow_id, "execution cancelled");
                    self.services
                        .notifier
                        .notify(ExecutionEvent::Cancelled {
                            execution_id: stored.id.clone(),
                            flow_id: stored.flow_id.clone(),
                        })
                        .await;
                    return Ok(stored);
                }
                Err(ExecutionStoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ExecutorError::AlreadyProcessing {
            execution_id: execution_id.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // continuation
    // -----------------------------------------------------------------------

    /// Merge an inbound event's data into a live execution's variables
    /// without stepping it.
    pub async fn absorb_event(
        &self,
        execution_id: &str,
        data: BTreeMap<String, Value>,
    ) -> Result<FlowExecution, ExecutorError> {
        for _ in 0..GUARD_RETRIES {
            let mut exec = self.load(execution_id).await?;
            if exec.status.is_terminal() {
                return Ok(exec);
            }
            let expected = exec.revision;
            exec.variables.extend(data.clone());
            match self.executions.update(&exec, expected).await {
                Ok(stored) => {
                    tracing::debug!(execution_id = %stored.id, "event routed to live execution");
                    return Ok(stored);
                }
                Err(ExecutionStoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ExecutorError::AlreadyProcessing {
            execution_id: execution_id.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // helpers
    // -----------------------------------------------------------------------

    async fn load(&self, execution_id: &str) -> Result<FlowExecution, ExecutorError> {
        self.executions
            .get(execution_id)
            .await?
            .ok_or_else(|| ExecutorError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })
    }

    /// Persist a Failed transition outside the step loop.
    async fn fail(&self, mut exec: FlowExecution, failure: ExecutionFailure) -> Result<FlowExecution, ExecutorError> {
        let expected = exec.revision;
        exec.last_error = Some(failure.clone());
        exec.finish(ExecutionStatus::Failed);
        let stored = self.executions.update(&exec, expected).await?;
        self.announce_failure(&stored, failure).await;
        Ok(stored)
    }

    async fn announce_failure(&self, exec: &FlowExecution, failure: ExecutionFailure) {
        if failure.kind == FailureKind::MalformedNodeConfig {
            tracing::error!(
                execution_id = %exec.id,
                flow_id = %exec.flow_id,
                error = %failure,
                "execution failed on an invalid definition"
            );
        } else {
            tracing::warn!(
                execution_id = %exec.id,
                flow_id = %exec.flow_id,
                error = %failure,
                "execution failed"
            );
        }
        self.services
            .notifier
            .notify(ExecutionEvent::Failed {
                execution_id: exec.id.clone(),
                flow_id: exec.flow_id.clone(),
                failure,
            })
            .await;
    }
}
