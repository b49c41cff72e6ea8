//! Edge resolution for the step loop.
//!
//! A node with several outgoing edges always routes by label, never by
//! position. Single-path nodes follow their only non-`error` edge, or the
//! unlabeled / `default` one when there are several.

use crate::graph::FlowGraph;

pub(crate) const ERROR_LABEL: &str = "error";
pub(crate) const DEFAULT_LABELS: [&str; 2] = ["default", "else"];

/// The success-path successor of `node_id`.
pub(crate) fn default_successor<'a>(graph: &FlowGraph<'a>, node_id: &str) -> Option<&'a str> {
    let edges: Vec<_> = graph
        .outgoing(node_id)
        .into_iter()
        .filter(|e| !e.has_label(ERROR_LABEL))
        .collect();
    if let [only] = edges.as_slice() {
        return Some(only.target_node_id.as_str());
    }
    edges
        .iter()
        .find(|e| e.is_unlabeled() || DEFAULT_LABELS.iter().any(|l| e.has_label(l)))
        .map(|e| e.target_node_id.as_str())
}

/// Successor along the edge labeled `label` (case-insensitive).
pub(crate) fn labeled_successor<'a>(graph: &FlowGraph<'a>, node_id: &str, label: &str) -> Option<&'a str> {
    graph
        .outgoing(node_id)
        .into_iter()
        .find(|e| e.has_label(label))
        .map(|e| e.target_node_id.as_str())
}

/// Fallback for a Branch with no matching arm: the configured default
/// label, then `default` / `else`, then an unlabeled edge.
pub(crate) fn fallback_successor<'a>(
    graph: &FlowGraph<'a>,
    node_id: &str,
    default_label: Option<&str>,
) -> Option<&'a str> {
    if let Some(target) = default_label.and_then(|l| labeled_successor(graph, node_id, l)) {
        return Some(target);
    }
    let edges = graph.outgoing(node_id);
    edges
        .iter()
        .find(|e| DEFAULT_LABELS.iter().any(|l| e.has_label(l)))
        .or_else(|| edges.iter().find(|e| e.is_unlabeled()))
        .map(|e| e.target_node_id.as_str())
}
