use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::profile::stats::{FrequencyTable, Histogram};
use crate::schema::value::Value;

/// A (domain, variable) node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableRef {
    pub domain: String,
    pub variable: String,
}

impl VariableRef {
    pub fn new(domain: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            variable: variable.into(),
        }
    }
}

impl fmt::Display for VariableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.variable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Correlation,
    CategoricalDependence,
    TemporalSequence,
    /// Structural link between subject-key columns. Always honored.
    KeyLinkage,
    /// Linked domains that record the same visit schedule columns.
    VisitAlignment,
}

impl RelationshipType {
    /// Structural kinds never gate on the threshold or condition sampling.
    pub fn is_statistical(&self) -> bool {
        !matches!(
            self,
            RelationshipType::KeyLinkage | RelationshipType::VisitAlignment
        )
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipType::Correlation => write!(f, "CORRELATION"),
            RelationshipType::CategoricalDependence => write!(f, "CATEGORICAL_DEPENDENCE"),
            RelationshipType::TemporalSequence => write!(f, "TEMPORAL_SEQUENCE"),
            RelationshipType::KeyLinkage => write!(f, "KEY_LINKAGE"),
            RelationshipType::VisitAlignment => write!(f, "VISIT_ALIGNMENT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependenceMeasure {
    CramersV,
    /// Correlation ratio (eta) of a numeric source over a categorical target.
    CorrelationRatio,
}

/// Target frequencies conditioned on the source value.
///
/// Categorical sources are keyed by value; numeric sources by the bin of
/// `source_bins` the value falls into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalTable {
    pub source_bins: Option<Histogram>,
    pub tables: indexmap::IndexMap<String, FrequencyTable>,
}

impl ConditionalTable {
    pub fn new(source_bins: Option<Histogram>) -> Self {
        Self {
            source_bins,
            tables: indexmap::IndexMap::new(),
        }
    }

    pub fn condition_key(&self, source: &Value) -> Option<String> {
        match (&self.source_bins, source) {
            (_, Value::Missing) => None,
            (Some(bins), Value::Number(n)) => Some(format!("bin:{}", bins.bin_index(*n))),
            (Some(_), _) => None,
            (None, v) => Some(v.to_unique_key()),
        }
    }

    pub fn record(&mut self, source: &Value, target: &Value) {
        if target.is_missing() {
            return;
        }
        if let Some(key) = self.condition_key(source) {
            self.tables.entry(key).or_default().record(target);
        }
    }

    /// Sub-table for `source`, if one with observations exists.
    pub fn lookup(&self, source: &Value) -> Option<&FrequencyTable> {
        let key = self.condition_key(source)?;
        self.tables.get(&key).filter(|t| t.total() > 0)
    }
}

/// Parameters that make a relationship usable for conditioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipDetail {
    Linkage {
        /// Shared subjects over all subjects of either domain.
        overlap: f64,
    },
    Visit {
        /// Visit columns present in both domains, in preference order.
        variables: Vec<String>,
        /// Shared distinct values of the first visit column over all of
        /// them.
        overlap: f64,
    },
    Correlation {
        /// Signed Pearson coefficient.
        coefficient: f64,
        source_mean: f64,
        source_std: f64,
        target_mean: f64,
        target_std: f64,
        paired: usize,
    },
    Dependence {
        measure: DependenceMeasure,
        conditional: ConditionalTable,
        paired: usize,
    },
    Temporal {
        /// Share of pairs where target is on or after source.
        consistency: f64,
        /// Day offsets (target minus source).
        offsets: Histogram,
        paired: usize,
    },
}

/// A directed association between two variables, with strength in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: VariableRef,
    pub target: VariableRef,
    pub kind: RelationshipType,
    pub strength: f64,
    pub detail: RelationshipDetail,
}

impl Relationship {
    pub fn touches(&self, node: &VariableRef) -> bool {
        self.source == *node || self.target == *node
    }
}

/// Every detected relationship as edges between variable nodes.
///
/// Nodes are added in declaration order (domain order, then column
/// order); edge indices follow insertion order. Nothing is removed once
/// detection finishes, so both stay stable.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    pub graph: DiGraph<VariableRef, Relationship>,
    pub node_indices: HashMap<VariableRef, NodeIndex>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, or return the existing one.
    pub fn add_variable(&mut self, node: VariableRef) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.node_indices.insert(node, idx);
        idx
    }

    /// Add a relationship. Self-relationships are ignored.
    pub fn add_relationship(&mut self, relationship: Relationship) -> Option<EdgeIndex> {
        if relationship.source == relationship.target {
            return None;
        }
        let from = self.add_variable(relationship.source.clone());
        let to = self.add_variable(relationship.target.clone());
        Some(self.graph.add_edge(from, to, relationship))
    }

    pub fn node_index(&self, node: &VariableRef) -> Option<NodeIndex> {
        self.node_indices.get(node).copied()
    }

    pub fn variable(&self, idx: NodeIndex) -> &VariableRef {
        &self.graph[idx]
    }

    /// Relationships where (domain, variable) is source or target, by
    /// descending strength; ties keep insertion order.
    pub fn edges_touching(&self, domain: &str, variable: &str) -> Vec<&Relationship> {
        let node = VariableRef::new(domain, variable);
        let Some(idx) = self.node_index(&node) else {
            return Vec::new();
        };

        let mut edges: Vec<(EdgeIndex, &Relationship)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.graph.edges_directed(idx, Direction::Incoming))
            .map(|e| (e.id(), e.weight()))
            .collect();
        edges.sort_by(|a, b| {
            b.1.strength
                .total_cmp(&a.1.strength)
                .then_with(|| a.0.cmp(&b.0))
        });
        edges.into_iter().map(|(_, r)| r).collect()
    }

    /// All relationships in insertion order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.graph.edge_weights()
    }

    pub fn relationships_of(&self, kind: RelationshipType) -> impl Iterator<Item = &Relationship> {
        self.relationships().filter(move |r| r.kind == kind)
    }

    pub fn variable_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlation(source: (&str, &str), target: (&str, &str), strength: f64) -> Relationship {
        Relationship {
            source: VariableRef::new(source.0, source.1),
            target: VariableRef::new(target.0, target.1),
            kind: RelationshipType::Correlation,
            strength,
            detail: RelationshipDetail::Correlation {
                coefficient: strength,
                source_mean: 0.0,
                source_std: 1.0,
                target_mean: 0.0,
                target_std: 1.0,
                paired: 10,
            },
        }
    }

    #[test]
    fn test_edges_touching_sorted_by_strength() {
        let mut graph = RelationshipGraph::new();
        graph.add_relationship(correlation(("DM", "AGE"), ("LB", "GLUC"), 0.4));
        graph.add_relationship(correlation(("DM", "AGE"), ("VS", "WEIGHT"), 0.9));
        graph.add_relationship(correlation(("DM", "HEIGHT"), ("DM", "AGE"), 0.6));
        graph.add_relationship(correlation(("LB", "GLUC"), ("VS", "WEIGHT"), 0.99));

        let touching = graph.edges_touching("DM", "AGE");
        let strengths: Vec<f64> = touching.iter().map(|r| r.strength).collect();
        assert_eq!(strengths, vec![0.9, 0.6, 0.4]);
    }

    #[test]
    fn test_edges_touching_ties_keep_insertion_order() {
        let mut graph = RelationshipGraph::new();
        graph.add_relationship(correlation(("DM", "B"), ("DM", "A"), 0.5));
        graph.add_relationship(correlation(("DM", "A"), ("DM", "C"), 0.5));
        graph.add_relationship(correlation(("DM", "D"), ("DM", "A"), 0.5));

        let touching = graph.edges_touching("DM", "A");
        let others: Vec<&str> = touching
            .iter()
            .map(|r| {
                if r.source.variable == "A" {
                    r.target.variable.as_str()
                } else {
                    r.source.variable.as_str()
                }
            })
            .collect();
        assert_eq!(others, vec!["B", "C", "D"]);
    }

    #[test]
    fn test_self_relationship_ignored() {
        let mut graph = RelationshipGraph::new();
        let added = graph.add_relationship(correlation(("DM", "AGE"), ("DM", "AGE"), 1.0));
        assert!(added.is_none());
        assert_eq!(graph.relationship_count(), 0);
    }

    #[test]
    fn test_unknown_node_has_no_edges() {
        let graph = RelationshipGraph::new();
        assert!(graph.edges_touching("DM", "AGE").is_empty());
    }

    #[test]
    fn test_conditional_table_numeric_bins() {
        let bins = Histogram::build(&[0.0, 10.0], 2).unwrap();
        let mut table = ConditionalTable::new(Some(bins));
        table.record(&Value::Number(1.0), &Value::from("LOW"));
        table.record(&Value::Number(9.0), &Value::from("HIGH"));

        let low = table.lookup(&Value::Number(2.0)).unwrap();
        assert_eq!(low.count(&Value::from("LOW")), 1);
        assert_eq!(low.count(&Value::from("HIGH")), 0);
        assert!(table.lookup(&Value::Missing).is_none());
    }
}
