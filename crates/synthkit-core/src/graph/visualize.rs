use crate::graph::cycle::DroppedEdge;
use crate::graph::relationships::{RelationshipGraph, RelationshipType, VariableRef};
use indexmap::IndexMap;

/// Output format for graph visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Mermaid,
    Dot,
}

/// Generate a visualization of the relationship graph.
///
/// KEY_LINKAGE edges are drawn thick; edges dropped to break cycles are
/// drawn dashed in addition to their solid originals.
pub fn visualize(
    graph: &RelationshipGraph,
    dropped_edges: &[DroppedEdge],
    format: GraphFormat,
) -> String {
    match format {
        GraphFormat::Mermaid => generate_mermaid(graph, dropped_edges),
        GraphFormat::Dot => generate_dot(graph, dropped_edges),
    }
}

fn mermaid_id(node: &VariableRef) -> String {
    format!("{}_{}", node.domain, node.variable)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn by_domain(graph: &RelationshipGraph) -> IndexMap<&str, Vec<&VariableRef>> {
    let mut domains: IndexMap<&str, Vec<&VariableRef>> = IndexMap::new();
    for node in graph.graph.node_weights() {
        domains.entry(node.domain.as_str()).or_default().push(node);
    }
    domains
}

fn edge_label(kind: RelationshipType, strength: f64) -> String {
    format!("{} {:.2}", kind, strength)
}

fn generate_mermaid(graph: &RelationshipGraph, dropped_edges: &[DroppedEdge]) -> String {
    let mut output = String::from("graph LR\n");

    // One subgraph per domain
    for (domain, nodes) in by_domain(graph) {
        output.push_str(&format!("    subgraph {}\n", domain));
        for node in nodes {
            output.push_str(&format!("        {}[{}]\n", mermaid_id(node), node.variable));
        }
        output.push_str("    end\n");
    }

    output.push('\n');

    for edge in graph.graph.edge_references() {
        let rel = edge.weight();
        let arrow = match rel.kind {
            RelationshipType::KeyLinkage => "==>",
            RelationshipType::VisitAlignment => "<-->",
            _ => "-->",
        };
        output.push_str(&format!(
            "    {} {}|{}| {}\n",
            mermaid_id(&rel.source),
            arrow,
            edge_label(rel.kind, rel.strength),
            mermaid_id(&rel.target)
        ));
    }

    for dropped in dropped_edges {
        output.push_str(&format!(
            "    {} -.->|dropped {:.2}| {}\n",
            mermaid_id(&dropped.source),
            dropped.strength,
            mermaid_id(&dropped.target)
        ));
    }

    if !dropped_edges.is_empty() {
        output.push_str("\n    %% Dashed edges were dropped to break dependency cycles\n");
    }

    output
}

fn generate_dot(graph: &RelationshipGraph, dropped_edges: &[DroppedEdge]) -> String {
    let mut output = String::from("digraph relationships {\n");
    output.push_str("    rankdir=LR;\n");
    output.push_str("    node [shape=box, style=rounded];\n\n");

    for (i, (domain, nodes)) in by_domain(graph).into_iter().enumerate() {
        output.push_str(&format!("    subgraph cluster_{} {{\n", i));
        output.push_str(&format!("        label=\"{}\";\n", domain));
        for node in nodes {
            output.push_str(&format!("        \"{}\";\n", node));
        }
        output.push_str("    }\n");
    }

    output.push('\n');

    for edge in graph.graph.edge_references() {
        let rel = edge.weight();
        let style = match rel.kind {
            RelationshipType::KeyLinkage => ", penwidth=2",
            RelationshipType::VisitAlignment => ", style=dotted, dir=both",
            _ => "",
        };
        output.push_str(&format!(
            "    \"{}\" -> \"{}\" [label=\"{}\"{}];\n",
            rel.source,
            rel.target,
            edge_label(rel.kind, rel.strength),
            style
        ));
    }

    for dropped in dropped_edges {
        output.push_str(&format!(
            "    \"{}\" -> \"{}\" [label=\"dropped {:.2}\", style=dashed, color=red];\n",
            dropped.source, dropped.target, dropped.strength
        ));
    }

    output.push_str("}\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::relationships::{Relationship, RelationshipDetail};

    fn linked_graph() -> RelationshipGraph {
        let mut graph = RelationshipGraph::new();
        graph.add_relationship(Relationship {
            source: VariableRef::new("DM", "USUBJID"),
            target: VariableRef::new("LB", "USUBJID"),
            kind: RelationshipType::KeyLinkage,
            strength: 1.0,
            detail: RelationshipDetail::Linkage { overlap: 1.0 },
        });
        graph
    }

    fn visit_graph() -> RelationshipGraph {
        let mut graph = linked_graph();
        graph.add_relationship(Relationship {
            source: VariableRef::new("DM", "VISITNUM"),
            target: VariableRef::new("LB", "VISITNUM"),
            kind: RelationshipType::VisitAlignment,
            strength: 0.5,
            detail: RelationshipDetail::Visit {
                variables: vec!["VISITNUM".to_string()],
                overlap: 0.5,
            },
        });
        graph
    }

    #[test]
    fn test_visit_alignment_rendering() {
        let mermaid = visualize(&visit_graph(), &[], GraphFormat::Mermaid);
        assert!(mermaid.contains("DM_VISITNUM <-->|VISIT_ALIGNMENT 0.50| LB_VISITNUM"));

        let dot = visualize(&visit_graph(), &[], GraphFormat::Dot);
        assert!(dot.contains("style=dotted, dir=both"));
    }

    #[test]
    fn test_mermaid_output() {
        let output = visualize(&linked_graph(), &[], GraphFormat::Mermaid);

        assert!(output.starts_with("graph LR"));
        assert!(output.contains("subgraph DM"));
        assert!(output.contains("DM_USUBJID ==>|KEY_LINKAGE 1.00| LB_USUBJID"));
    }

    #[test]
    fn test_dot_marks_dropped_edges() {
        let dropped = vec![DroppedEdge {
            source: VariableRef::new("LB", "USUBJID"),
            target: VariableRef::new("DM", "USUBJID"),
            strength: 0.35,
        }];
        let output = visualize(&linked_graph(), &dropped, GraphFormat::Dot);

        assert!(output.contains("cluster_1"));
        assert!(output.contains("\"DM.USUBJID\" -> \"LB.USUBJID\""));
        assert!(output.contains("dropped 0.35\", style=dashed"));
        assert!(output.ends_with("}\n"));
    }
}
