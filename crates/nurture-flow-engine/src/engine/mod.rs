//! The engine facade: the single entry point for hosts.
//!
//! [`FlowEngine`] owns the trigger registry, the executor and the resume
//! scheduler, and keeps the registry in step with every definition write.
//! Construct via [`FlowEngine::builder()`].
//!
//! ```rust,ignore
//! let engine = FlowEngine::builder()
//!     .config(EngineConfig::from_env()?)
//!     .messaging(MyGateway::new())
//!     .build()
//!     .await?;
//! engine.start_scheduler().await;
//!
//! let event = TriggerEvent::new("team-1", "contact-9", TriggerPayload::Message { text: "pricing?".into() });
//! engine.fire_trigger(TriggerType::Keyword, event).await?;
//! ```

mod builder;
pub mod error;

pub use builder::FlowEngineBuilder;
pub use error::EngineError;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::defaults::BroadcastNotifier;
use crate::executor::{Executor, ExecutorError};
use crate::scheduler::{ResumeScheduler, TickReport};
use crate::traits::{ExecutionFilter, ExecutionPage, ExecutionStore, FlowStore};
use crate::triggers::{TriggerRegistration, TriggerRegistry};
use crate::types::{ExecutionEvent, FlowDefinition, FlowExecution, TriggerEvent, TriggerType};
use crate::validate::{validate_flow, ValidationReport};
use crate::versioning::compute_definition_hash;

/// What [`FlowEngine::fire_trigger`] did with an event.
#[derive(Debug, Clone)]
pub enum FireOutcome {
    /// A fresh execution was started.
    Started(FlowExecution),
    /// The event was merged into a live execution inside its
    /// continuation window.
    Continued(FlowExecution),
}

impl FireOutcome {
    pub fn execution(&self) -> &FlowExecution {
        match self {
            FireOutcome::Started(e) | FireOutcome::Continued(e) => e,
        }
    }
}

struct SchedulerHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

pub struct FlowEngine {
    config: EngineConfig,
    flows: Arc<dyn FlowStore>,
    executions: Arc<dyn ExecutionStore>,
    executor: Arc<Executor>,
    registry: Arc<TriggerRegistry>,
    events: BroadcastNotifier,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl FlowEngine {
    pub fn builder() -> FlowEngineBuilder {
        FlowEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    pub fn flow_store(&self) -> &Arc<dyn FlowStore> {
        &self.flows
    }

    /// Lifecycle events for every execution driven by this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Validate without saving.
    pub fn validate(&self, definition: &FlowDefinition) -> ValidationReport {
        validate_flow(definition)
    }

    /// Validate, stamp and persist a definition, then sync its trigger
    /// registration with `is_active`. Invalid definitions are rejected
    /// whole and nothing is written.
    pub async fn create_or_update_flow(&self, mut definition: FlowDefinition) -> Result<FlowDefinition, EngineError> {
        validate_flow(&definition)
            .into_result()
            .map_err(|errors| EngineError::InvalidDefinition { errors })?;

        definition.definition_hash = Some(compute_definition_hash(&definition));
        definition.updated_at = Some(Utc::now());
        self.flows.put(&definition).await?;
        self.sync_registration(&definition);

        tracing::info!(
            flow_id = %definition.id,
            team_id = %definition.team_id,
            active = definition.is_active,
            hash = definition.definition_hash.as_deref().unwrap_or_default(),
            "flow saved"
        );
        Ok(definition)
    }

    /// Mark a flow active and register its trigger. The stored definition
    /// is re-validated first.
    pub async fn activate_flow(&self, flow_id: &str) -> Result<FlowDefinition, EngineError> {
        let mut definition = self.load_flow(flow_id).await?;
        validate_flow(&definition)
            .into_result()
            .map_err(|errors| EngineError::InvalidDefinition { errors })?;
        definition.is_active = true;
        self.save_activation(definition).await
    }

    /// Mark a flow inactive and unregister it. In-flight executions keep
    /// running.
    pub async fn deactivate_flow(&self, flow_id: &str) -> Result<FlowDefinition, EngineError> {
        let mut definition = self.load_flow(flow_id).await?;
        definition.is_active = false;
        self.save_activation(definition).await
    }

    /// Remove a definition and its registration. Executions are retained.
    /// Returns whether anything was deleted.
    pub async fn delete_flow(&self, flow_id: &str) -> Result<bool, EngineError> {
        self.registry.unregister_flow(flow_id);
        let deleted = self.flows.delete(flow_id).await?;
        if deleted {
            tracing::info!(flow_id = %flow_id, "flow deleted");
        }
        Ok(deleted)
    }

    pub async fn get_flow(&self, flow_id: &str) -> Result<Option<FlowDefinition>, EngineError> {
        Ok(self.flows.get(flow_id).await?)
    }

    /// Rebuild the trigger registry from the flow store.
    pub async fn reload_triggers(&self) -> Result<usize, EngineError> {
        let active = self.flows.list_active().await?;
        Ok(self.registry.reload(&active))
    }

    async fn load_flow(&self, flow_id: &str) -> Result<FlowDefinition, EngineError> {
        self.flows
            .get(flow_id)
            .await?
            .ok_or_else(|| EngineError::FlowNotFound {
                flow_id: flow_id.to_string(),
            })
    }

    async fn save_activation(&self, mut definition: FlowDefinition) -> Result<FlowDefinition, EngineError> {
        definition.updated_at = Some(Utc::now());
        self.flows.put(&definition).await?;
        self.sync_registration(&definition);
        tracing::info!(flow_id = %definition.id, active = definition.is_active, "flow activation changed");
        Ok(definition)
    }

    fn sync_registration(&self, definition: &FlowDefinition) {
        if !definition.is_active {
            self.registry.unregister_flow(&definition.id);
            return;
        }
        match TriggerRegistration::from_definition(definition) {
            Ok(registration) => self.registry.register(registration),
            Err(errors) => {
                self.registry.unregister_flow(&definition.id);
                tracing::warn!(flow_id = %definition.id, errors = ?errors, "trigger not registered");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Manual entry point with the same semantics as a matched trigger.
    pub async fn trigger_flow(
        &self,
        flow_id: &str,
        contact_id: &str,
        data: BTreeMap<String, Value>,
    ) -> Result<FlowExecution, EngineError> {
        Ok(self.executor.start(flow_id, contact_id, data).await?)
    }

    /// Run a flow with `testMode` set. Side-effecting steps are skipped
    /// and inactive flows are allowed.
    pub async fn test_flow(&self, flow_id: &str, contact_id: &str) -> Result<FlowExecution, EngineError> {
        Ok(self.executor.start_test(flow_id, contact_id, BTreeMap::new()).await?)
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<Option<FlowExecution>, EngineError> {
        Ok(self.executions.get(execution_id).await?)
    }

    /// Executions of one flow, newest first. `filter.flow_id` is overridden.
    pub async fn list_executions(
        &self,
        flow_id: &str,
        mut filter: ExecutionFilter,
    ) -> Result<ExecutionPage, EngineError> {
        filter.flow_id = Some(flow_id.to_string());
        Ok(self.executions.list(&filter).await?)
    }

    pub async fn resume_execution(&self, execution_id: &str) -> Result<FlowExecution, EngineError> {
        Ok(self.executor.resume(execution_id).await?)
    }

    pub async fn cancel_execution(&self, execution_id: &str) -> Result<FlowExecution, EngineError> {
        Ok(self.executor.cancel(execution_id).await?)
    }

    /// Route an inbound event. A live execution of a candidate flow for
    /// this contact that started inside the flow's continuation window
    /// absorbs the event; otherwise the first registration whose predicate
    /// matches starts a new execution. `Ok(None)` means nothing matched, or
    /// the execution was lost to a concurrent worker.
    pub async fn fire_trigger(
        &self,
        trigger_type: TriggerType,
        event: TriggerEvent,
    ) -> Result<Option<FireOutcome>, EngineError> {
        let now = Utc::now();
        let data = event.initial_data();

        for candidate in self.registry.candidates(&event.team_id, trigger_type) {
            let Some(live) = self
                .executions
                .find_active(&candidate.flow_id, &event.contact_id)
                .await?
            else {
                continue;
            };
            let window_secs = match self.flows.get(&candidate.flow_id).await? {
                Some(def) => def
                    .continuation_window_secs
                    .unwrap_or(self.config.default_continuation_window_secs),
                None => continue,
            };
            let age = now.signed_duration_since(live.started_at);
            let window = chrono::Duration::try_seconds(i64::try_from(window_secs).unwrap_or(i64::MAX))
                .unwrap_or(chrono::Duration::MAX);
            if window_secs > 0 && age < window {
                let merged = match self.executor.absorb_event(&live.id, data).await {
                    Ok(merged) => merged,
                    Err(ExecutorError::AlreadyProcessing { execution_id }) => {
                        tracing::debug!(execution_id = %execution_id, "event dropped: execution moved concurrently");
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                };
                tracing::info!(
                    execution_id = %merged.id,
                    flow_id = %merged.flow_id,
                    contact_id = %merged.contact_id,
                    "event continued live execution"
                );
                return Ok(Some(FireOutcome::Continued(merged)));
            }
        }

        let Some(flow_id) = self.registry.match_event(trigger_type, &event, now) else {
            tracing::debug!(
                team_id = %event.team_id,
                contact_id = %event.contact_id,
                trigger_type = %trigger_type,
                "no flow matched event"
            );
            return Ok(None);
        };
        match self.executor.start(&flow_id, &event.contact_id, data).await {
            Ok(exec) => Ok(Some(FireOutcome::Started(exec))),
            // Another worker took the execution over mid-run; the event
            // has been handled as far as this caller is concerned.
            Err(ExecutorError::AlreadyProcessing { execution_id }) => {
                tracing::debug!(execution_id = %execution_id, flow_id = %flow_id, "event dropped: lost the execution guard");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    /// Run one resume scan now.
    pub async fn tick(&self) -> TickReport {
        ResumeScheduler::new(Arc::clone(&self.executor)).tick().await
    }

    /// Start the background resume scheduler. No-op if already running.
    pub async fn start_scheduler(&self) {
        let mut slot = self.scheduler.lock().await;
        if slot.is_some() {
            return;
        }
        let (shutdown, rx) = broadcast::channel(1);
        let task = ResumeScheduler::new(Arc::clone(&self.executor)).spawn(rx);
        *slot = Some(SchedulerHandle { shutdown, task });
    }

    /// Stop the background scheduler and wait for the in-progress scan.
    pub async fn shutdown(&self) {
        let Some(handle) = self.scheduler.lock().await.take() else {
            return;
        };
        let _ = handle.shutdown.send(());
        if let Err(e) = handle.task.await {
            tracing::warn!(error = %e, "resume scheduler task ended abnormally");
        }
    }
}
