//! Static validation of flow definitions.
//!
//! Every check runs and every problem is reported, so a caller sees the full
//! list at once. Validation is pure: no I/O, no mutation of the input.

use std::collections::HashSet;

use serde::Serialize;

use crate::graph::FlowGraph;
use crate::types::{FlowDefinition, NodeSpec, NodeType, TriggerType};

/// Result of [`validate_flow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn into_result(self) -> Result<(), Vec<String>> {
        if self.valid {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Validate a flow definition for structural correctness.
pub fn validate_flow(def: &FlowDefinition) -> ValidationReport {
    let mut errors = Vec::new();
    let graph = FlowGraph::new(def);

    // 1. Top-level fields.
    if def.name.trim().is_empty() {
        errors.push("Flow name is required".to_string());
    }
    let trigger_type = def.trigger_type.parse::<TriggerType>();
    if trigger_type.is_err() {
        errors.push(format!("Unknown trigger type: {}", def.trigger_type));
    }
    if def.nodes.is_empty() {
        errors.push("Flow has no nodes".to_string());
    }

    // 2. Per node: unique ids, known type, complete config.
    let mut seen_ids = HashSet::new();
    let mut specs: Vec<Option<NodeSpec>> = Vec::with_capacity(def.nodes.len());
    for node in &def.nodes {
        if node.id.trim().is_empty() {
            errors.push("Node id is required".to_string());
        } else if !seen_ids.insert(node.id.as_str()) {
            errors.push(format!("Duplicate node ID: {}", node.id));
        }
        match node.kind() {
            None => {
                errors.push(format!("Node {} has unknown type: {}", node.id, node.node_type));
                specs.push(None);
            }
            Some(kind) => match NodeSpec::parse(kind, &node.config) {
                Ok(spec) => specs.push(Some(spec)),
                Err(problems) => {
                    errors.extend(problems.into_iter().map(|p| format!("Node {}: {p}", node.id)));
                    specs.push(None);
                }
            },
        }
    }

    // 3. Edge endpoints.
    let mut seen_edges = HashSet::new();
    for edge in &def.edges {
        if !seen_edges.insert(edge.id.as_str()) {
            errors.push(format!("Duplicate edge ID: {}", edge.id));
        }
        if !graph.contains(&edge.source_node_id) {
            errors.push(format!(
                "Edge {} references unknown source node: {}",
                edge.id, edge.source_node_id
            ));
        }
        if !graph.contains(&edge.target_node_id) {
            errors.push(format!(
                "Edge {} references unknown target node: {}",
                edge.id, edge.target_node_id
            ));
        }
    }

    // 4. Cycles.
    for path in graph.find_cycles() {
        errors.push(format!("Cycle detected: {}", path.join(" -> ")));
    }

    // 5. Degrees.
    for node in &def.nodes {
        let (inn, out) = (graph.in_degree(&node.id), graph.out_degree(&node.id));
        match node.kind() {
            None => {}
            Some(NodeType::Trigger) => {
                if out == 0 {
                    errors.push(format!("Trigger node {} has no outgoing edge", node.id));
                }
            }
            Some(NodeType::End) => {
                if inn == 0 {
                    errors.push(format!("End node {} has no incoming edge", node.id));
                }
            }
            Some(_) => match (inn, out) {
                (0, 0) => errors.push(format!("Node {} is orphaned (no incoming or outgoing edges)", node.id)),
                (0, _) => errors.push(format!("Node {} has no incoming edge", node.id)),
                (_, 0) => errors.push(format!("Node {} has no outgoing edge", node.id)),
                _ => {}
            },
        }
    }

    // 6. Exactly one trigger node.
    match graph.trigger_nodes().len() {
        0 => errors.push("Flow has no trigger node".to_string()),
        1 => {}
        n => errors.push(format!("Flow has {n} trigger nodes; exactly one is required")),
    }

    // 7. Trigger config.
    if let Ok(kind) = trigger_type {
        if let Err(problems) = crate::types::TriggerSpec::parse(kind, &def.trigger_config) {
            errors.extend(problems);
        }
    }

    // 8. Routing labels.
    for (node, spec) in def.nodes.iter().zip(&specs) {
        let Some(spec) = spec else { continue };
        check_routing(&graph, &node.id, spec, &mut errors);
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn check_routing(graph: &FlowGraph<'_>, node_id: &str, spec: &NodeSpec, errors: &mut Vec<String>) {
    let edges = graph.outgoing(node_id);
    if edges.is_empty() {
        return;
    }
    let has = |label: &str| edges.iter().any(|e| e.has_label(label));
    match spec {
        NodeSpec::Condition(_) => {
            for label in ["true", "false"] {
                if !has(label) {
                    errors.push(format!(
                        "Condition node {node_id} requires an outgoing edge labeled '{label}'"
                    ));
                }
            }
        }
        NodeSpec::Branch(branch) => {
            for arm in &branch.branches {
                if !has(&arm.label) {
                    errors.push(format!(
                        "Branch node {node_id} has no outgoing edge labeled '{}'",
                        arm.label
                    ));
                }
            }
            if let Some(default) = &branch.default_label {
                if !has(default) {
                    errors.push(format!(
                        "Branch node {node_id} has no outgoing edge for default label '{default}'"
                    ));
                }
            }
        }
        NodeSpec::HttpRequest(_) => {
            let error_edges = edges.iter().filter(|e| e.has_label("error")).count();
            if error_edges > 1 {
                errors.push(format!("HttpRequest node {node_id} has more than one 'error' edge"));
            }
            if edges.len() - error_edges > 1 {
                errors.push(format!(
                    "HttpRequest node {node_id} has more than one success edge"
                ));
            }
        }
        NodeSpec::End => {}
        _ => {
            if edges.len() > 1 {
                errors.push(format!(
                    "Node {node_id} has {} outgoing edges but only routes along one",
                    edges.len()
                ));
            }
        }
    }
}
