//! Content-addressed definition hashes.
//!
//! Same graph = same hash. `BTreeMap` variables and `serde_json::to_vec`
//! give canonical bytes. Activation state, timestamps and the hash itself
//! are excluded so toggling a flow does not change its identity.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::types::{Edge, FlowDefinition, NodeInstance};

#[derive(Serialize)]
struct HashedContent<'a> {
    schema_version: u16,
    id: &'a str,
    team_id: &'a str,
    name: &'a str,
    trigger_type: &'a str,
    trigger_config: &'a Value,
    nodes: &'a [NodeInstance],
    edges: &'a [Edge],
    variables: &'a BTreeMap<String, Value>,
    continuation_window_secs: Option<u64>,
}

/// Lowercase hex SHA-256 of the definition's graph content.
pub fn compute_definition_hash(def: &FlowDefinition) -> String {
    let content = HashedContent {
        schema_version: def.schema_version,
        id: &def.id,
        team_id: &def.team_id,
        name: &def.name,
        trigger_type: &def.trigger_type,
        trigger_config: &def.trigger_config,
        nodes: &def.nodes,
        edges: &def.edges,
        variables: &def.variables,
        continuation_window_secs: def.continuation_window_secs,
    };
    let bytes = serde_json::to_vec(&content).unwrap_or_default();
    let hash = Sha256::digest(&bytes);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FlowBuilder;
    use serde_json::json;

    fn flow() -> FlowDefinition {
        FlowBuilder::new("f1")
            .node("t", "trigger")
            .node_with("m", "send_message", json!({"message": "Hi"}))
            .node("e", "end")
            .edge("t", "m")
            .edge("m", "e")
            .build()
    }

    #[test]
    fn same_graph_same_hash() {
        let h = compute_definition_hash(&flow());
        assert_eq!(h.len(), 64);
        assert_eq!(h, compute_definition_hash(&flow()));
    }

    #[test]
    fn activation_does_not_change_hash() {
        let mut a = flow();
        let before = compute_definition_hash(&a);
        a.is_active = !a.is_active;
        a.definition_hash = Some("stale".into());
        assert_eq!(before, compute_definition_hash(&a));
    }

    #[test]
    fn config_change_changes_hash() {
        let mut a = flow();
        let before = compute_definition_hash(&a);
        a.nodes[1].config = json!({"message": "Hello"});
        assert_ne!(before, compute_definition_hash(&a));
    }
}
