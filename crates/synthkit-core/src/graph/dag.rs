use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

use crate::graph::relationships::{RelationshipGraph, VariableRef};

/// A directed graph of sampling dependencies between variables.
/// Edges point from the conditioning variable to the conditioned one
/// (source sampled first).
pub struct DependencyGraph {
    pub graph: DiGraph<VariableRef, DependencyEdge>,
    pub node_indices: HashMap<VariableRef, NodeIndex>,
}

/// One statistical relationship kept as a sampling dependency.
#[derive(Debug, Clone, Copy)]
pub struct DependencyEdge {
    /// Edge in the originating `RelationshipGraph`.
    pub relationship: EdgeIndex,
    pub strength: f64,
}

impl DependencyGraph {
    /// Build the dependency graph from detected relationships.
    ///
    /// Node indices match the relationship graph's. KEY_LINKAGE edges are
    /// structural and never become dependencies; with `statistical` false
    /// the graph has no edges at all.
    pub fn from_relationships(relationships: &RelationshipGraph, statistical: bool) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for idx in relationships.graph.node_indices() {
            let node = relationships.variable(idx).clone();
            let added = graph.add_node(node.clone());
            node_indices.insert(node, added);
        }

        if statistical {
            for edge in relationships.graph.edge_references() {
                let rel = edge.weight();
                if !rel.kind.is_statistical() {
                    continue;
                }
                graph.add_edge(
                    edge.source(),
                    edge.target(),
                    DependencyEdge {
                        relationship: edge.id(),
                        strength: rel.strength,
                    },
                );
            }
        }

        Self {
            graph,
            node_indices,
        }
    }

    /// Get the variable for a node index.
    pub fn variable(&self, idx: NodeIndex) -> &VariableRef {
        &self.graph[idx]
    }

    /// Get the node index for a variable.
    pub fn node_index(&self, node: &VariableRef) -> Option<NodeIndex> {
        self.node_indices.get(node).copied()
    }
}
