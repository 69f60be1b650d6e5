use anyhow::{Context, Result};

use synthkit_core::graph::order::plan_sampling_order;
use synthkit_core::graph::visualize::{self, GraphFormat as VizFormat};
use synthkit_core::graph::RelationshipType;
use synthkit_core::GenerationOrchestrator;

use crate::args::{GraphFormat, RelationshipsArgs};
use crate::commands::load_sources;

pub async fn run(args: RelationshipsArgs) -> Result<()> {
    let sources = load_sources(&args.input)?;
    let mut options = sources.options()?;
    if let Some(threshold) = args.threshold {
        options.relationship_threshold = threshold;
    }

    let domains = sources.domains;
    let analysis = tokio::task::spawn_blocking(move || {
        GenerationOrchestrator::new(options).and_then(|mut o| o.analyze(&domains))
    })
    .await
    .context("Detection task failed")??;

    let graph = &analysis.relationships;
    let order = plan_sampling_order(graph, true);

    let format = match args.format {
        GraphFormat::Mermaid => VizFormat::Mermaid,
        GraphFormat::Dot => VizFormat::Dot,
    };
    println!("{}", visualize::visualize(graph, &order.dropped, format));

    let linkages = graph.relationships_of(RelationshipType::KeyLinkage).count();
    let visits = graph.relationships_of(RelationshipType::VisitAlignment).count();
    eprintln!(
        "{} variables, {} relationships ({} key linkages, {} visit alignments, {} edges dropped to break cycles)",
        graph.variable_count(),
        graph.relationship_count(),
        linkages,
        visits,
        order.dropped.len()
    );

    Ok(())
}
