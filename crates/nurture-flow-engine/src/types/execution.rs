//! Execution records: one run of a flow against one contact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Completed, Failed and Cancelled executions never step again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Classification of a step failure recorded on a Failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FailureKind {
    HttpRequestFailed,
    AiCompletionFailed,
    StepLimitExceeded,
    MalformedNodeConfig,
    NoMatchingBranch,
    MessagingFailed,
    ContactStoreFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HttpRequestFailed => "HttpRequestFailed",
            Self::AiCompletionFailed => "AiCompletionFailed",
            Self::StepLimitExceeded => "StepLimitExceeded",
            Self::MalformedNodeConfig => "MalformedNodeConfig",
            Self::NoMatchingBranch => "NoMatchingBranch",
            Self::MessagingFailed => "MessagingFailed",
            Self::ContactStoreFailed => "ContactStoreFailed",
        };
        f.write_str(s)
    }
}

/// Why an execution failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_id: None,
        }
    }

    pub fn at(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_id {
            Some(node) => write!(f, "{} at node {}: {}", self.kind, node, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One visited node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StepRecord {
    pub node_id: String,
    pub node_type: String,
    pub entered_at: DateTime<Utc>,
    /// Short human-readable outcome, e.g. `advanced`, `suspended`,
    /// `skipped (test mode)`.
    pub outcome: String,
}

// ---------------------------------------------------------------------------
// Execution record
// ---------------------------------------------------------------------------

/// Persisted continuation of a flow run for one contact.
///
/// `current_node_id` + `resume_at` + `variables` is everything needed to
/// continue on any worker after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FlowExecution {
    pub id: String,
    pub flow_id: String,
    pub team_id: String,
    pub contact_id: String,
    pub status: ExecutionStatus,
    pub current_node_id: String,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Set only while Waiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ExecutionFailure>,
    /// Hash of the definition this execution started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_hash: Option<String>,
    #[serde(default)]
    pub test_mode: bool,
    /// Optimistic guard, bumped by the store on every successful update.
    #[serde(default)]
    pub revision: u64,
    /// Scheduler claim while Waiting, worker lease while Running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_until: Option<DateTime<Utc>>,
}

impl FlowExecution {
    /// New Running execution positioned at `current_node_id`.
    pub fn new(
        flow_id: impl Into<String>,
        team_id: impl Into<String>,
        contact_id: impl Into<String>,
        current_node_id: impl Into<String>,
        variables: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            flow_id: flow_id.into(),
            team_id: team_id.into(),
            contact_id: contact_id.into(),
            status: ExecutionStatus::Running,
            current_node_id: current_node_id.into(),
            variables,
            resume_at: None,
            started_at: Utc::now(),
            completed_at: None,
            history: Vec::new(),
            last_error: None,
            definition_hash: None,
            test_mode: false,
            revision: 0,
            claimed_until: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub(crate) fn record(&mut self, node_id: &str, node_type: &str, outcome: impl Into<String>) {
        self.history.push(StepRecord {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            entered_at: Utc::now(),
            outcome: outcome.into(),
        });
    }

    pub(crate) fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.resume_at = None;
        self.claimed_until = None;
        self.completed_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Lifecycle events
// ---------------------------------------------------------------------------

/// Lifecycle notifications delivered to the notification sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
#[non_exhaustive]
pub enum ExecutionEvent {
    Started {
        execution_id: String,
        flow_id: String,
        contact_id: String,
    },
    Suspended {
        execution_id: String,
        flow_id: String,
        node_id: String,
        resume_at: DateTime<Utc>,
    },
    Resumed {
        execution_id: String,
        flow_id: String,
    },
    Completed {
        execution_id: String,
        flow_id: String,
        contact_id: String,
    },
    Failed {
        execution_id: String,
        flow_id: String,
        failure: ExecutionFailure,
    },
    Cancelled {
        execution_id: String,
        flow_id: String,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            Self::Started { execution_id, .. }
            | Self::Suspended { execution_id, .. }
            | Self::Resumed { execution_id, .. }
            | Self::Completed { execution_id, .. }
            | Self::Failed { execution_id, .. }
            | Self::Cancelled { execution_id, .. } => execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Waiting.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn finish_clears_suspension() {
        let mut exec = FlowExecution::new("f", "t", "c", "n1", BTreeMap::new());
        exec.status = ExecutionStatus::Waiting;
        exec.resume_at = Some(Utc::now());
        exec.finish(ExecutionStatus::Cancelled);
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert!(exec.resume_at.is_none());
        assert!(exec.completed_at.is_some());
    }

    #[test]
    fn failure_display_names_node() {
        let f = ExecutionFailure::new(FailureKind::HttpRequestFailed, "503").at("http1");
        assert_eq!(f.to_string(), "HttpRequestFailed at node http1: 503");
    }

    #[test]
    fn event_serializes_with_tag() {
        let ev = ExecutionEvent::Resumed {
            execution_id: "e1".into(),
            flow_id: "f1".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "resumed");
        assert_eq!(ev.execution_id(), "e1");
    }
}
