//! Collaborator trait interfaces for the flow engine.
//!
//! Everything the engine does not own (durable storage, the contact store,
//! message delivery, AI completion, outbound HTTP, lifecycle notification)
//! sits behind an async trait here. Default implementations live in
//! `defaults/`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::*;
use super::types::*;

// ---------------------------------------------------------------------------
// FlowStore
// ---------------------------------------------------------------------------

/// Durable storage for flow definitions.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Insert or replace a definition by id.
    async fn put(&self, flow: &FlowDefinition) -> Result<(), FlowStoreError>;

    async fn get(&self, flow_id: &str) -> Result<Option<FlowDefinition>, FlowStoreError>;

    /// Remove a definition. Returns whether it existed.
    async fn delete(&self, flow_id: &str) -> Result<bool, FlowStoreError>;

    /// List definitions, optionally restricted to one team.
    async fn list(&self, team_id: Option<&str>) -> Result<Vec<FlowDefinition>, FlowStoreError>;

    /// All active definitions. Used to rebuild the trigger registry.
    async fn list_active(&self) -> Result<Vec<FlowDefinition>, FlowStoreError> {
        Ok(self
            .list(None)
            .await?
            .into_iter()
            .filter(|f| f.is_active)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ExecutionStore
// ---------------------------------------------------------------------------

/// Durable storage for executions.
///
/// Implementations must make [`insert_active`](Self::insert_active) and
/// [`update`](Self::update) atomic with respect to each other: they are the
/// only mutual exclusion between workers, which may live in different
/// processes.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a new execution unless a non-terminal one already exists for
    /// the same (flow, contact), in which case `AlreadyActive` is returned.
    async fn insert_active(&self, execution: &FlowExecution) -> Result<(), ExecutionStoreError>;

    async fn get(&self, execution_id: &str) -> Result<Option<FlowExecution>, ExecutionStoreError>;

    /// Replace the stored execution only if its revision still equals
    /// `expected_revision`. On success the stored copy (with the bumped
    /// revision) is returned; otherwise `Conflict`.
    async fn update(
        &self,
        execution: &FlowExecution,
        expected_revision: u64,
    ) -> Result<FlowExecution, ExecutionStoreError>;

    /// The non-terminal execution for (flow, contact), if any.
    async fn find_active(
        &self,
        flow_id: &str,
        contact_id: &str,
    ) -> Result<Option<FlowExecution>, ExecutionStoreError>;

    async fn list(&self, filter: &ExecutionFilter) -> Result<ExecutionPage, ExecutionStoreError>;

    /// Executions needing scheduler attention at `now`: Waiting ones whose
    /// `resume_at` has elapsed and whose claim (if any) has expired, and
    /// Running ones whose worker lease has expired. Oldest first.
    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FlowExecution>, ExecutionStoreError>;
}

/// Filter criteria for listing executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub flow_id: Option<String>,
    pub team_id: Option<String>,
    pub contact_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ExecutionFilter {
    pub fn for_flow(flow_id: impl Into<String>) -> Self {
        Self {
            flow_id: Some(flow_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, exec: &FlowExecution) -> bool {
        self.flow_id.as_deref().is_none_or(|f| exec.flow_id == f)
            && self.team_id.as_deref().is_none_or(|t| exec.team_id == t)
            && self.contact_id.as_deref().is_none_or(|c| exec.contact_id == c)
            && self.status.is_none_or(|s| exec.status == s)
    }
}

/// Paginated execution listing result.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPage {
    pub executions: Vec<FlowExecution>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// ContactStore
// ---------------------------------------------------------------------------

/// Read and mutate CRM contacts.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// JSON snapshot of the contact (fields, tags). `None` if unknown.
    async fn snapshot(&self, team_id: &str, contact_id: &str) -> Result<Option<Value>, ContactStoreError>;

    async fn add_tag(&self, team_id: &str, contact_id: &str, tag_id: &str) -> Result<(), ContactStoreError>;

    async fn remove_tag(&self, team_id: &str, contact_id: &str, tag_id: &str) -> Result<(), ContactStoreError>;

    async fn set_field(
        &self,
        team_id: &str,
        contact_id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), ContactStoreError>;
}

// ---------------------------------------------------------------------------
// MessagingGateway
// ---------------------------------------------------------------------------

/// Rendered content handed to the messaging transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub team_id: String,
    pub contact_id: String,
    pub flow_id: String,
    pub execution_id: String,
    pub node_id: String,
    pub content: String,
}

/// Delivers messages to end users. Fire-and-forget: `Ok` means accepted,
/// not delivered. May be invoked more than once for the same node.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MessagingError>;
}

// ---------------------------------------------------------------------------
// AiCompletion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// A turn-based completion request. `messages` ends with the new user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// AI completion provider.
#[async_trait]
pub trait AiCompletion: Send + Sync {
    /// Return the assistant reply text.
    async fn complete(&self, request: AiRequest) -> Result<String, AiError>;

    /// Provider name for diagnostics.
    fn name(&self) -> &str {
        "ai"
    }
}

// ---------------------------------------------------------------------------
// HttpCaller
// ---------------------------------------------------------------------------

/// A fully rendered outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Raw response. Non-2xx statuses are not errors at this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpReply {
    pub status: u16,
    /// Parsed JSON when possible, otherwise the body as a string.
    pub body: Value,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx and 429 are retried; other non-success statuses are final.
    pub fn is_retryable(&self) -> bool {
        self.status >= 500 || self.status == 429
    }
}

/// Generic outbound HTTP client.
#[async_trait]
pub trait HttpCaller: Send + Sync {
    async fn call(&self, request: HttpCall) -> Result<HttpReply, HttpCallError>;
}

// ---------------------------------------------------------------------------
// NotificationSink
// ---------------------------------------------------------------------------

/// Receives execution lifecycle events. Must not block the step loop.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: ExecutionEvent);
}

/// Sink that drops every event.
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn notify(&self, _event: ExecutionEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_filter_defaults() {
        let f = ExecutionFilter::default();
        assert!(f.flow_id.is_none());
        assert!(f.status.is_none());
        assert!(f.limit.is_none());
    }

    #[test]
    fn execution_filter_matches_fields() {
        let exec = FlowExecution::new("f1", "t1", "c1", "n1", BTreeMap::new());
        assert!(ExecutionFilter::for_flow("f1").matches(&exec));
        assert!(!ExecutionFilter::for_flow("f2").matches(&exec));
        let waiting = ExecutionFilter {
            status: Some(ExecutionStatus::Waiting),
            ..Default::default()
        };
        assert!(!waiting.matches(&exec));
    }

    #[test]
    fn http_reply_classification() {
        let ok = HttpReply {
            status: 204,
            body: Value::Null,
        };
        assert!(ok.is_success());
        let busy = HttpReply {
            status: 503,
            body: Value::Null,
        };
        assert!(!busy.is_success());
        assert!(busy.is_retryable());
        let bad = HttpReply {
            status: 404,
            body: Value::Null,
        };
        assert!(!bad.is_retryable());
    }
}
