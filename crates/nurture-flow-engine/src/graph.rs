//! Arena-indexed view of a flow definition.
//!
//! Nodes are addressed by position in `FlowDefinition::nodes`; adjacency is
//! stored as edge indices per node. Edges with an unknown endpoint are left
//! out of the adjacency (the validator reports them separately).

use std::collections::HashMap;

use crate::types::{Edge, FlowDefinition, NodeInstance, NodeType};

pub struct FlowGraph<'a> {
    def: &'a FlowDefinition,
    index: HashMap<&'a str, usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

impl<'a> FlowGraph<'a> {
    pub fn new(def: &'a FlowDefinition) -> Self {
        let mut index = HashMap::with_capacity(def.nodes.len());
        for (i, node) in def.nodes.iter().enumerate() {
            // First occurrence wins on duplicate ids.
            index.entry(node.id.as_str()).or_insert(i);
        }
        let mut outgoing = vec![Vec::new(); def.nodes.len()];
        let mut incoming = vec![Vec::new(); def.nodes.len()];
        for (e, edge) in def.edges.iter().enumerate() {
            let (Some(&s), Some(&t)) = (
                index.get(edge.source_node_id.as_str()),
                index.get(edge.target_node_id.as_str()),
            ) else {
                continue;
            };
            outgoing[s].push(e);
            incoming[t].push(e);
        }
        Self {
            def,
            index,
            outgoing,
            incoming,
        }
    }

    pub fn definition(&self) -> &'a FlowDefinition {
        self.def
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&'a NodeInstance> {
        self.index.get(id).map(|&i| &self.def.nodes[i])
    }

    /// Outgoing edges of `id`, in definition order.
    pub fn outgoing(&self, id: &str) -> Vec<&'a Edge> {
        self.edges_of(id, &self.outgoing)
    }

    pub fn incoming(&self, id: &str) -> Vec<&'a Edge> {
        self.edges_of(id, &self.incoming)
    }

    fn edges_of(&self, id: &str, adjacency: &[Vec<usize>]) -> Vec<&'a Edge> {
        let def = self.def;
        match self.index.get(id) {
            Some(&i) => adjacency[i].iter().map(|&e| &def.edges[e]).collect(),
            None => Vec::new(),
        }
    }

    pub fn out_degree(&self, id: &str) -> usize {
        self.index.get(id).map_or(0, |&i| self.outgoing[i].len())
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.index.get(id).map_or(0, |&i| self.incoming[i].len())
    }

    /// Nodes whose type parses as Trigger.
    pub fn trigger_nodes(&self) -> Vec<&'a NodeInstance> {
        self.def
            .nodes
            .iter()
            .filter(|n| n.kind() == Some(NodeType::Trigger))
            .collect()
    }

    /// Every back-edge found by an iterative white/gray/black DFS started
    /// from each unvisited node, as the node path from the back-edge target
    /// around to itself (`[a, b, a]`). O(V + E); no native recursion.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let n = self.def.nodes.len();
        let mut marks = vec![Mark::White; n];
        let mut cycles = Vec::new();

        for root in 0..n {
            if marks[root] != Mark::White {
                continue;
            }
            // (node, position in its outgoing list)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::Gray;

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if let Some(&edge_idx) = self.outgoing[node].get(top.1) {
                    top.1 += 1;
                    let edge = &self.def.edges[edge_idx];
                    let Some(&target) = self.index.get(edge.target_node_id.as_str()) else {
                        continue;
                    };
                    match marks[target] {
                        Mark::White => {
                            marks[target] = Mark::Gray;
                            stack.push((target, 0));
                        }
                        Mark::Gray => {
                            let start = stack.iter().position(|&(v, _)| v == target).unwrap_or(0);
                            let mut path: Vec<String> = stack[start..]
                                .iter()
                                .map(|&(v, _)| self.def.nodes[v].id.clone())
                                .collect();
                            path.push(self.def.nodes[target].id.clone());
                            cycles.push(path);
                        }
                        Mark::Black => {}
                    }
                } else {
                    marks[node] = Mark::Black;
                    stack.pop();
                }
            }
        }
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FlowBuilder;

    #[test]
    fn adjacency_skips_dangling_edges() {
        let def = FlowBuilder::new("f")
            .node("t", "trigger")
            .node("e", "end")
            .edge("t", "e")
            .edge("t", "ghost")
            .build();
        let g = FlowGraph::new(&def);
        assert_eq!(g.out_degree("t"), 1);
        assert_eq!(g.in_degree("e"), 1);
        assert_eq!(g.in_degree("ghost"), 0);
        assert!(!g.contains("ghost"));
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let def = FlowBuilder::new("f")
            .node("t", "trigger")
            .node("a", "join")
            .node("b", "join")
            .node("e", "end")
            .edge("t", "a")
            .edge("t", "b")
            .edge("a", "e")
            .edge("b", "e")
            .build();
        assert!(FlowGraph::new(&def).find_cycles().is_empty());
    }

    #[test]
    fn back_edge_reports_path() {
        let def = FlowBuilder::new("f")
            .node("t", "trigger")
            .node("a", "join")
            .node("b", "join")
            .edge("t", "a")
            .edge("a", "b")
            .edge("b", "a")
            .build();
        let cycles = FlowGraph::new(&def).find_cycles();
        assert_eq!(cycles, vec![vec!["a".to_string(), "b".into(), "a".into()]]);
    }

    #[test]
    fn disconnected_cycle_is_found() {
        let def = FlowBuilder::new("f")
            .node("t", "trigger")
            .node("e", "end")
            .node("x", "join")
            .node("y", "join")
            .edge("t", "e")
            .edge("x", "y")
            .edge("y", "x")
            .build();
        assert_eq!(FlowGraph::new(&def).find_cycles().len(), 1);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let def = FlowBuilder::new("f").node("a", "join").edge("a", "a").build();
        assert_eq!(
            FlowGraph::new(&def).find_cycles(),
            vec![vec!["a".to_string(), "a".into()]]
        );
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut b = FlowBuilder::new("f").node("n0", "trigger");
        for i in 1..20_000 {
            b = b.node(&format!("n{i}"), "join").edge(&format!("n{}", i - 1), &format!("n{i}"));
        }
        let def = b.build();
        assert!(FlowGraph::new(&def).find_cycles().is_empty());
    }
}
