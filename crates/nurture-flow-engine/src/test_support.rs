//! Fixtures and fake collaborators for tests.
//!
//! Compiled for this crate's tests and for hosts that enable the
//! `test-support` feature.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::defaults::{InMemoryContactStore, InMemoryExecutionStore, InMemoryFlowStore};
use crate::errors::{AiError, HttpCallError, MessagingError};
use crate::executor::{Executor, Services};
use crate::traits::{
    AiCompletion, AiRequest, HttpCall, HttpCaller, HttpReply, MessagingGateway, NotificationSink, OutboundMessage,
};
use crate::types::{Edge, ExecutionEvent, FlowDefinition, NodeInstance, DEFINITION_SCHEMA_VERSION};

// ---------------------------------------------------------------------------
// FlowBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`FlowDefinition`] fixtures.
///
/// Defaults: team `team-1`, name `Test flow`, a keyword trigger on
/// `hello`, active. Edge ids are `e1`, `e2`, ... in insertion order.
pub struct FlowBuilder {
    def: FlowDefinition,
}

impl FlowBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            def: FlowDefinition {
                schema_version: DEFINITION_SCHEMA_VERSION,
                id: id.into(),
                team_id: "team-1".to_string(),
                name: "Test flow".to_string(),
                trigger_type: "keyword".to_string(),
                trigger_config: json!({"keywords": ["hello"]}),
                nodes: Vec::new(),
                edges: Vec::new(),
                variables: BTreeMap::new(),
                is_active: true,
                continuation_window_secs: None,
                definition_hash: None,
                updated_at: None,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.def.name = name.into();
        self
    }

    pub fn team(mut self, team_id: impl Into<String>) -> Self {
        self.def.team_id = team_id.into();
        self
    }

    pub fn trigger(mut self, trigger_type: impl Into<String>, config: Value) -> Self {
        self.def.trigger_type = trigger_type.into();
        self.def.trigger_config = config;
        self
    }

    pub fn node(self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.node_with(id, node_type, json!({}))
    }

    pub fn node_with(mut self, id: impl Into<String>, node_type: impl Into<String>, config: Value) -> Self {
        self.def.nodes.push(NodeInstance {
            id: id.into(),
            node_type: node_type.into(),
            config,
            position: None,
        });
        self
    }

    pub fn edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.push_edge(from.into(), to.into(), None)
    }

    pub fn labeled(self, from: impl Into<String>, to: impl Into<String>, label: impl Into<String>) -> Self {
        self.push_edge(from.into(), to.into(), Some(label.into()))
    }

    fn push_edge(mut self, from: String, to: String, label: Option<String>) -> Self {
        let id = format!("e{}", self.def.edges.len() + 1);
        self.def.edges.push(Edge {
            id,
            source_node_id: from,
            target_node_id: to,
            label,
        });
        self
    }

    pub fn inactive(mut self) -> Self {
        self.def.is_active = false;
        self
    }

    pub fn continuation_window(mut self, secs: u64) -> Self {
        self.def.continuation_window_secs = Some(secs);
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.def.variables.insert(key.into(), value);
        self
    }

    pub fn build(self) -> FlowDefinition {
        self.def
    }
}

// ---------------------------------------------------------------------------
// Scenario flows
// ---------------------------------------------------------------------------

/// Trigger -> SendMessage "Welcome!" -> End.
pub fn welcome_flow(id: &str) -> FlowDefinition {
    FlowBuilder::new(id)
        .node("trigger", "trigger")
        .node_with("welcome", "send_message", json!({"message": "Welcome!"}))
        .node("end", "end")
        .edge("trigger", "welcome")
        .edge("welcome", "end")
        .build()
}

/// Trigger -> Wait `seconds` -> End.
pub fn drip_flow(id: &str, seconds: u64) -> FlowDefinition {
    FlowBuilder::new(id)
        .node("trigger", "trigger")
        .node_with("wait", "wait", json!({"duration": seconds, "unit": "seconds"}))
        .node("end", "end")
        .edge("trigger", "wait")
        .edge("wait", "end")
        .build()
}

/// Trigger -> Condition(contact.first_name == "Node") -> end_a | end_b.
pub fn qualify_flow(id: &str) -> FlowDefinition {
    FlowBuilder::new(id)
        .node("trigger", "trigger")
        .node_with(
            "check",
            "condition",
            json!({"rules": [{"field": "contact.first_name", "operator": "equals", "value": "Node"}]}),
        )
        .node("end_a", "end")
        .node("end_b", "end")
        .edge("trigger", "check")
        .labeled("check", "end_a", "true")
        .labeled("check", "end_b", "false")
        .build()
}

/// Trigger -> HttpRequest(url, retry budget) -> End, no error edge.
pub fn webhook_flow(id: &str, url: &str, max_attempts: u32) -> FlowDefinition {
    FlowBuilder::new(id)
        .node("trigger", "trigger")
        .node_with(
            "call",
            "http_request",
            json!({
                "url": url,
                "method": "POST",
                "body": {"contact": "{{contact.id}}"},
                "timeout_ms": 1000,
                "retry": {"max_attempts": max_attempts, "backoff_ms": 1}
            }),
        )
        .node("end", "end")
        .edge("trigger", "call")
        .edge("call", "end")
        .build()
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Records every message; optionally fails every send.
#[derive(Default)]
pub struct RecordingMessagingGateway {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: bool,
}

impl RecordingMessagingGateway {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessagingGateway for RecordingMessagingGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MessagingError> {
        if self.fail {
            return Err(MessagingError::Send {
                message: "gateway unavailable".to_string(),
            });
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Replays queued replies in order, then echoes the last user turn.
#[derive(Default)]
pub struct ScriptedAi {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    requests: Mutex<Vec<AiRequest>>,
}

impl ScriptedAi {
    pub fn new(replies: impl IntoIterator<Item = Result<String, AiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<AiRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AiCompletion for ScriptedAi {
    async fn complete(&self, request: AiRequest) -> Result<String, AiError> {
        let echo = request
            .messages
            .last()
            .map(|t| format!("echo: {}", t.content))
            .unwrap_or_default();
        self.requests.lock().push(request);
        self.replies.lock().pop_front().unwrap_or(Ok(echo))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Replays queued results in order, then answers `200 {}`.
#[derive(Default)]
pub struct ScriptedHttpCaller {
    replies: Mutex<VecDeque<Result<HttpReply, HttpCallError>>>,
    calls: Mutex<Vec<HttpCall>>,
}

impl ScriptedHttpCaller {
    pub fn new(replies: impl IntoIterator<Item = Result<HttpReply, HttpCallError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::default(),
        }
    }

    pub fn status(status: u16, body: Value) -> Result<HttpReply, HttpCallError> {
        Ok(HttpReply { status, body })
    }

    pub fn calls(&self) -> Vec<HttpCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HttpCaller for ScriptedHttpCaller {
    async fn call(&self, request: HttpCall) -> Result<HttpReply, HttpCallError> {
        self.calls.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Self::status(200, json!({})))
    }
}

/// Every call fails with a transport error, as an unreachable host would.
#[derive(Default)]
pub struct FailingHttpCaller {
    attempts: AtomicU32,
}

impl FailingHttpCaller {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpCaller for FailingHttpCaller {
    async fn call(&self, request: HttpCall) -> Result<HttpReply, HttpCallError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(HttpCallError::Transport {
            message: format!("connection refused: {}", request.url),
        })
    }
}

/// Answers 200 after sleeping, like an upstream that is slow but healthy.
pub struct SlowHttpCaller {
    delay: std::time::Duration,
    calls: AtomicU32,
}

impl SlowHttpCaller {
    pub fn new(delay: std::time::Duration) -> Self {
        Self {
            delay,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpCaller for SlowHttpCaller {
    async fn call(&self, _request: HttpCall) -> Result<HttpReply, HttpCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(HttpReply {
            status: 200,
            body: json!({"ok": true}),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, event: ExecutionEvent) {
        self.events.lock().push(event);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// In-memory stores plus fakes, with handles kept for assertions.
pub struct Harness {
    pub flows: InMemoryFlowStore,
    pub executions: InMemoryExecutionStore,
    pub contacts: InMemoryContactStore,
    pub messaging: Arc<RecordingMessagingGateway>,
    pub ai: Arc<ScriptedAi>,
    pub http: Arc<ScriptedHttpCaller>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self {
            flows: InMemoryFlowStore::new(),
            executions: InMemoryExecutionStore::new(),
            contacts: InMemoryContactStore::new(),
            messaging: Arc::new(RecordingMessagingGateway::default()),
            ai: Arc::new(ScriptedAi::default()),
            http: Arc::new(ScriptedHttpCaller::default()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            contacts: Arc::new(self.contacts.clone()),
            messaging: self.messaging.clone(),
            ai: Some(self.ai.clone()),
            http: self.http.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn executor(&self, config: EngineConfig) -> Executor {
        self.executor_with(config, self.services())
    }

    pub fn executor_with(&self, config: EngineConfig, services: Services) -> Executor {
        Executor::new(
            config,
            Arc::new(self.flows.clone()),
            Arc::new(self.executions.clone()),
            services,
        )
    }
}
