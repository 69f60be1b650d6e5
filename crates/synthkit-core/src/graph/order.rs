use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::graph::cycle::{break_cycles, DroppedEdge};
use crate::graph::dag::DependencyGraph;
use crate::graph::relationships::{RelationshipGraph, VariableRef};

/// Order in which a synthetic subject's variables are sampled.
#[derive(Debug, Clone)]
pub struct SamplingOrder {
    /// Every variable, conditioning sources before the variables they
    /// condition.
    pub variables: Vec<VariableRef>,
    /// The relationship each variable is conditioned on, as an edge of the
    /// `RelationshipGraph` it was planned from. Unconditioned variables are
    /// absent.
    pub conditioning: HashMap<VariableRef, EdgeIndex>,
    /// Edges removed to break dependency cycles.
    pub dropped: Vec<DroppedEdge>,
}

impl SamplingOrder {
    pub fn conditioning_for(&self, node: &VariableRef) -> Option<EdgeIndex> {
        self.conditioning.get(node).copied()
    }

    /// Variables of one domain, in sampling order.
    pub fn for_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a VariableRef> {
        self.variables.iter().filter(move |v| v.domain == domain)
    }
}

/// Plan the sampling order for a relationship graph.
///
/// Cycles are broken first; the remaining DAG is ordered with Kahn's
/// algorithm, taking ready nodes in declaration order. Each variable is
/// conditioned on its strongest remaining incoming dependency (ties: the
/// relationship detected first). With `statistical` false no variable is
/// conditioned and the order is plain declaration order.
pub fn plan_sampling_order(relationships: &RelationshipGraph, statistical: bool) -> SamplingOrder {
    let mut deps = DependencyGraph::from_relationships(relationships, statistical);
    let dropped = break_cycles(&mut deps);

    let node_count = deps.graph.node_count();
    let mut in_degree: Vec<usize> = vec![0; node_count];
    for edge in deps.graph.edge_references() {
        in_degree[edge.target().index()] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut variables = Vec::with_capacity(node_count);
    while let Some(Reverse(i)) = ready.pop() {
        let node = NodeIndex::new(i);
        variables.push(deps.variable(node).clone());
        for edge in deps.graph.edges_directed(node, Direction::Outgoing) {
            let t = edge.target().index();
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                ready.push(Reverse(t));
            }
        }
    }

    let mut conditioning = HashMap::new();
    for node in deps.graph.node_indices() {
        let strongest = deps
            .graph
            .edges_directed(node, Direction::Incoming)
            .min_by(|a, b| {
                b.weight()
                    .strength
                    .total_cmp(&a.weight().strength)
                    .then_with(|| a.weight().relationship.cmp(&b.weight().relationship))
            });
        if let Some(edge) = strongest {
            conditioning.insert(deps.variable(node).clone(), edge.weight().relationship);
        }
    }

    tracing::debug!(
        "Sampling order: {} variables, {} conditioned, {} cycle edges dropped",
        variables.len(),
        conditioning.len(),
        dropped.len()
    );

    SamplingOrder {
        variables,
        conditioning,
        dropped,
    }
}
