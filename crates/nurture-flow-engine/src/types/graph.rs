//! Flow definition schema: the contract between the definition API and the
//! engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::nodes::NodeSpec;
use super::triggers::{TriggerSpec, TriggerType};
use super::{normalize_kind, DEFINITION_SCHEMA_VERSION};

/// A tenant-defined automation graph.
///
/// `trigger_type` and each node's `node_type` stay as raw strings; typed
/// views come from [`FlowDefinition::trigger_spec`] and [`NodeInstance::spec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FlowDefinition {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: Value,
    pub nodes: Vec<NodeInstance>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Default variables seeded into every execution.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub is_active: bool,
    /// How long (seconds) after start a live execution keeps absorbing new
    /// trigger events for the same contact. `None` falls back to the engine
    /// default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_window_secs: Option<u64>,
    /// SHA-256 of the graph content, set on save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_schema_version() -> u16 {
    DEFINITION_SCHEMA_VERSION
}

impl FlowDefinition {
    /// Parse the trigger type, if known.
    pub fn trigger_kind(&self) -> Option<TriggerType> {
        self.trigger_type.parse().ok()
    }

    /// Typed trigger configuration.
    pub fn trigger_spec(&self) -> Result<TriggerSpec, Vec<String>> {
        let kind = self
            .trigger_kind()
            .ok_or_else(|| vec![format!("Unknown trigger type: {}", self.trigger_type)])?;
        TriggerSpec::parse(kind, &self.trigger_config)
    }

    pub fn node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A typed step within a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeInstance {
    pub id: String,
    /// References [`NodeType`] by name.
    pub node_type: String,
    #[serde(default)]
    pub config: Value,
    /// Canvas position, carried for the editor only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(f64, f64)>,
}

impl NodeInstance {
    pub fn kind(&self) -> Option<NodeType> {
        self.node_type.parse().ok()
    }

    /// Parse the node's config into its typed form.
    pub fn spec(&self) -> Result<NodeSpec, Vec<String>> {
        let kind = self
            .kind()
            .ok_or_else(|| vec![format!("unknown node type: {}", self.node_type)])?;
        NodeSpec::parse(kind, &self.config)
    }
}

/// A directed, optionally labeled transition between two nodes.
///
/// Labels disambiguate Condition (`true`/`false`), Branch (named arms,
/// `default`/`else`) and HttpRequest (`error`) outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Edge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Case-insensitive label comparison; unlabeled edges never match.
    pub fn has_label(&self, label: &str) -> bool {
        self.label
            .as_deref()
            .is_some_and(|l| l.trim().eq_ignore_ascii_case(label))
    }

    pub fn is_unlabeled(&self) -> bool {
        self.label.as_deref().is_none_or(|l| l.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Node kinds
// ---------------------------------------------------------------------------

/// The closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Wait,
    SendMessage,
    Condition,
    AddTag,
    RemoveTag,
    UpdateField,
    HttpRequest,
    AiChatbot,
    Branch,
    Join,
    End,
}

impl NodeType {
    pub const ALL: [NodeType; 12] = [
        NodeType::Trigger,
        NodeType::Wait,
        NodeType::SendMessage,
        NodeType::Condition,
        NodeType::AddTag,
        NodeType::RemoveTag,
        NodeType::UpdateField,
        NodeType::HttpRequest,
        NodeType::AiChatbot,
        NodeType::Branch,
        NodeType::Join,
        NodeType::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Wait => "wait",
            Self::SendMessage => "send_message",
            Self::Condition => "condition",
            Self::AddTag => "add_tag",
            Self::RemoveTag => "remove_tag",
            Self::UpdateField => "update_field",
            Self::HttpRequest => "http_request",
            Self::AiChatbot => "ai_chatbot",
            Self::Branch => "branch",
            Self::Join => "join",
            Self::End => "end",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_kind(s);
        Self::ALL
            .into_iter()
            .find(|t| normalize_kind(t.as_str()) == wanted)
            .ok_or_else(|| format!("unknown node type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_type_parses_any_casing() {
        assert_eq!("SendMessage".parse::<NodeType>(), Ok(NodeType::SendMessage));
        assert_eq!("send_message".parse::<NodeType>(), Ok(NodeType::SendMessage));
        assert_eq!("AI_CHATBOT".parse::<NodeType>(), Ok(NodeType::AiChatbot));
        assert!("teleport".parse::<NodeType>().is_err());
    }

    #[test]
    fn node_type_names_round_trip() {
        for t in NodeType::ALL {
            assert_eq!(t.as_str().parse::<NodeType>(), Ok(t));
        }
    }

    #[test]
    fn edge_label_matching() {
        let edge = Edge {
            id: "e1".into(),
            source_node_id: "a".into(),
            target_node_id: "b".into(),
            label: Some(" True ".into()),
        };
        assert!(edge.has_label("true"));
        assert!(!edge.has_label("false"));
        assert!(!edge.is_unlabeled());

        let blank = Edge {
            label: Some("  ".into()),
            ..edge
        };
        assert!(blank.is_unlabeled());
    }

    #[test]
    fn definition_deserializes_with_defaults() {
        let def: FlowDefinition = serde_json::from_value(json!({
            "id": "f1",
            "team_id": "t1",
            "name": "Welcome",
            "trigger_type": "keyword",
            "nodes": [{"id": "n1", "node_type": "trigger"}]
        }))
        .unwrap();
        assert_eq!(def.schema_version, DEFINITION_SCHEMA_VERSION);
        assert!(!def.is_active);
        assert!(def.edges.is_empty());
        assert!(def.variables.is_empty());
        assert_eq!(def.trigger_kind(), Some(TriggerType::Keyword));
    }
}
