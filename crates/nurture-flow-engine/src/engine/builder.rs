//! Engine builder: assembles stores, collaborators and the executor.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::error::EngineError;
use super::FlowEngine;
use crate::config::EngineConfig;
use crate::defaults::{
    BroadcastNotifier, FileFlowStore, InMemoryContactStore, InMemoryExecutionStore, InMemoryFlowStore,
    ReqwestHttpCaller, TracingMessagingGateway,
};
use crate::executor::{Executor, Services};
use crate::traits::{
    AiCompletion, ContactStore, ExecutionFilter, ExecutionStore, FlowStore, HttpCaller, MessagingGateway,
    NotificationSink,
};
use crate::triggers::TriggerRegistry;
use crate::types::{ExecutionEvent, ExecutionStatus};

/// Builder for [`FlowEngine`].
///
/// Every seam is optional; [`build()`](FlowEngineBuilder::build) fills the
/// gaps with the in-process defaults from [`crate::defaults`].
pub struct FlowEngineBuilder {
    config: EngineConfig,
    flow_store: Option<Arc<dyn FlowStore>>,
    flow_dir: Option<PathBuf>,
    execution_store: Option<Arc<dyn ExecutionStore>>,
    contacts: Option<Arc<dyn ContactStore>>,
    messaging: Option<Arc<dyn MessagingGateway>>,
    ai: Option<Arc<dyn AiCompletion>>,
    http: Option<Arc<dyn HttpCaller>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    crash_recovery: bool,
}

impl Default for FlowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            flow_store: None,
            flow_dir: None,
            execution_store: None,
            contacts: None,
            messaging: None,
            ai: None,
            http: None,
            notifier: None,
            crash_recovery: false,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the flow store. Default: [`InMemoryFlowStore`].
    pub fn flow_store(mut self, store: impl FlowStore + 'static) -> Self {
        self.flow_store = Some(Arc::new(store));
        self
    }

    /// Use a [`FileFlowStore`] rooted at `dir`. Ignored if
    /// [`flow_store`](Self::flow_store) is also set.
    pub fn flow_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.flow_dir = Some(dir.into());
        self
    }

    /// Set the execution store. Default: [`InMemoryExecutionStore`].
    pub fn execution_store(mut self, store: impl ExecutionStore + 'static) -> Self {
        self.execution_store = Some(Arc::new(store));
        self
    }

    /// Set the contact store. Default: [`InMemoryContactStore`].
    pub fn contact_store(mut self, store: impl ContactStore + 'static) -> Self {
        self.contacts = Some(Arc::new(store));
        self
    }

    /// Set the messaging gateway. Default: [`TracingMessagingGateway`].
    pub fn messaging(mut self, gateway: impl MessagingGateway + 'static) -> Self {
        self.messaging = Some(Arc::new(gateway));
        self
    }

    /// Set the AI provider. Without one, AiChatbot steps fail.
    pub fn ai(mut self, provider: Arc<dyn AiCompletion>) -> Self {
        self.ai = Some(provider);
        self
    }

    /// Set the HTTP client. Default: [`ReqwestHttpCaller`].
    pub fn http(mut self, caller: impl HttpCaller + 'static) -> Self {
        self.http = Some(Arc::new(caller));
        self
    }

    /// Extra sink for lifecycle events, alongside the engine's own
    /// broadcast channel.
    pub fn notifier(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(sink);
        self
    }

    /// Expire the leases of every Running execution at build so the first
    /// scheduler tick recovers them instead of waiting out `claim_ttl`.
    /// Default: disabled. Only enable it when this process is the sole
    /// writer of the execution store; a lease held by a live worker in
    /// another process would be taken over.
    pub fn crash_recovery(mut self, enabled: bool) -> Self {
        self.crash_recovery = enabled;
        self
    }

    pub async fn build(self) -> Result<FlowEngine, EngineError> {
        let flows: Arc<dyn FlowStore> = match (self.flow_store, self.flow_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => {
                let store = FileFlowStore::new(dir).map_err(|e| EngineError::Build {
                    message: format!("failed to open flow directory: {e}"),
                })?;
                Arc::new(store)
            }
            (None, None) => Arc::new(InMemoryFlowStore::new()),
        };
        let executions: Arc<dyn ExecutionStore> = self
            .execution_store
            .unwrap_or_else(|| Arc::new(InMemoryExecutionStore::new()));

        let events = BroadcastNotifier::default();
        let notifier: Arc<dyn NotificationSink> = Arc::new(EngineNotifier {
            events: events.clone(),
            sink: self.notifier,
        });
        let services = Services {
            contacts: self
                .contacts
                .unwrap_or_else(|| Arc::new(InMemoryContactStore::new())),
            messaging: self
                .messaging
                .unwrap_or_else(|| Arc::new(TracingMessagingGateway)),
            ai: self.ai,
            http: self.http.unwrap_or_else(|| Arc::new(ReqwestHttpCaller::new())),
            notifier,
        };

        // The registry must be loaded before any trigger is served.
        let registry = Arc::new(TriggerRegistry::new());
        let active = flows.list_active().await?;
        let registered = registry.reload(&active);
        tracing::info!(active = active.len(), registered, "trigger registry loaded");

        if self.crash_recovery {
            expire_orphaned_leases(executions.as_ref()).await;
        }

        let executor = Arc::new(Executor::new(
            self.config.clone(),
            Arc::clone(&flows),
            Arc::clone(&executions),
            services,
        ));

        Ok(FlowEngine {
            config: self.config,
            flows,
            executions,
            executor,
            registry,
            events,
            scheduler: Mutex::new(None),
        })
    }
}

/// Clear the lease on every Running execution so the scheduler treats
/// them as orphaned.
async fn expire_orphaned_leases(store: &dyn ExecutionStore) {
    let filter = ExecutionFilter {
        status: Some(ExecutionStatus::Running),
        ..Default::default()
    };
    let page = match store.list(&filter).await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(error = %e, "crash recovery scan failed");
            return;
        }
    };
    if page.executions.is_empty() {
        return;
    }
    tracing::warn!(count = page.executions.len(), "recovering executions from previous session");
    for exec in page.executions {
        if exec.claimed_until.is_none() {
            continue;
        }
        let mut orphan = exec.clone();
        orphan.claimed_until = None;
        if let Err(e) = store.update(&orphan, exec.revision).await {
            tracing::error!(execution_id = %exec.id, error = %e, "failed to expire lease");
        }
    }
}

/// Fans lifecycle events out to the engine's broadcast channel and the
/// host's sink, if any.
struct EngineNotifier {
    events: BroadcastNotifier,
    sink: Option<Arc<dyn NotificationSink>>,
}

#[async_trait]
impl NotificationSink for EngineNotifier {
    async fn notify(&self, event: ExecutionEvent) {
        if let Some(sink) = &self.sink {
            sink.notify(event.clone()).await;
        }
        self.events.notify(event).await;
    }
}
