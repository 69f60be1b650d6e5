use petgraph::algo::tarjan_scc;
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::graph::dag::DependencyGraph;
use crate::graph::relationships::VariableRef;

/// A dependency edge removed to make the sampling graph acyclic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedEdge {
    pub source: VariableRef,
    pub target: VariableRef,
    pub strength: f64,
}

/// Detect and break cycles in the dependency graph.
/// Returns the edges that were removed, in removal order.
///
/// Strategy:
/// 1. Find all strongly connected components (SCCs) using Tarjan's algorithm
/// 2. For each SCC with more than one node, remove its lowest-strength edge
///    (ties: the relationship detected last)
/// 3. Repeat until no SCC has more than one node
pub fn break_cycles(graph: &mut DependencyGraph) -> Vec<DroppedEdge> {
    let mut dropped = Vec::new();

    loop {
        let sccs = tarjan_scc(&graph.graph);
        let cycles: Vec<_> = sccs.into_iter().filter(|scc| scc.len() > 1).collect();

        if cycles.is_empty() {
            break;
        }

        for scc in &cycles {
            // Removal shifts edge indices, so look the edge up fresh each time.
            if let Some(edge_idx) = weakest_edge(graph, scc) {
                let (from, to) = match graph.graph.edge_endpoints(edge_idx) {
                    Some(endpoints) => endpoints,
                    None => continue,
                };
                let strength = graph.graph[edge_idx].strength;
                let edge = DroppedEdge {
                    source: graph.variable(from).clone(),
                    target: graph.variable(to).clone(),
                    strength,
                };
                tracing::warn!(
                    "Dependency cycle among {} variables: dropping {} -> {} (strength {:.3})",
                    scc.len(),
                    edge.source,
                    edge.target,
                    edge.strength
                );
                graph.graph.remove_edge(edge_idx);
                dropped.push(edge);
            }
        }
    }

    dropped
}

fn weakest_edge(graph: &DependencyGraph, scc: &[NodeIndex]) -> Option<EdgeIndex> {
    use petgraph::visit::EdgeRef;

    let scc_set: std::collections::HashSet<_> = scc.iter().copied().collect();

    scc.iter()
        .flat_map(|&node| graph.graph.edges(node))
        .filter(|edge| scc_set.contains(&edge.target()))
        .min_by(|a, b| {
            a.weight()
                .strength
                .total_cmp(&b.weight().strength)
                .then_with(|| b.weight().relationship.cmp(&a.weight().relationship))
        })
        .map(|edge| edge.id())
}
