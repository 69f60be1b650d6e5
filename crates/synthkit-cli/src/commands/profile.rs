use anyhow::{Context, Result};
use comfy_table::{Cell, Table as ComfyTable};

use synthkit_core::generate::options::MAX_HISTOGRAM_BINS;
use synthkit_core::profile::{profile_domain, DomainProfile, ProfileStats, VariableProfile};

use crate::args::{ProfileArgs, ProfileFormat};
use crate::commands::load_sources;

/// Categories shown per frequency table in the summary column.
const TOP_CATEGORIES: usize = 3;

pub async fn run(args: ProfileArgs) -> Result<()> {
    let sources = load_sources(&args.input)?;
    let mut options = sources.options()?.profile_options();
    if let Some(bins) = args.bins {
        options.histogram_bins = bins;
    }
    if options.histogram_bins == 0 {
        anyhow::bail!("--bins must be at least 1");
    }
    if options.histogram_bins > MAX_HISTOGRAM_BINS {
        anyhow::bail!("--bins must be at most {}", MAX_HISTOGRAM_BINS);
    }

    let domains = sources.domains;
    let profiles: Vec<DomainProfile> = tokio::task::spawn_blocking(move || {
        domains
            .iter()
            .map(|d| profile_domain(d, &options))
            .collect()
    })
    .await
    .context("Profiling task failed")?;

    match args.format {
        ProfileFormat::Json => {
            let json = serde_json::to_string_pretty(&profiles)?;
            println!("{}", json);
        }
        ProfileFormat::Table => {
            for profile in &profiles {
                println!(
                    "━━━ {} ━━━  {} records, {} subjects (key {})",
                    profile.name, profile.record_count, profile.subject_count, profile.subject_key
                );

                let mut t = ComfyTable::new();
                t.set_header(vec!["Variable", "Type", "Missing", "Summary"]);
                for variable in profile.variables.values() {
                    t.add_row(vec![
                        Cell::new(&variable.name),
                        Cell::new(variable.data_type.to_string()),
                        Cell::new(format!("{:.1}%", variable.missing_rate * 100.0)),
                        Cell::new(summarize(variable)),
                    ]);
                }
                println!("{}", t);
                println!();
            }
        }
    }

    Ok(())
}

/// One-line description of a variable's statistics.
fn summarize(variable: &VariableProfile) -> String {
    match &variable.stats {
        ProfileStats::Numeric(n) => format!(
            "mean {:.2}, sd {:.2}, range [{}, {}]",
            n.mean, n.std_dev, n.min, n.max
        ),
        ProfileStats::Frequencies(table) => {
            let total = table.total().max(1) as f64;
            let mut entries: Vec<_> = table.entries().collect();
            entries.sort_by(|a, b| b.count.cmp(&a.count));
            let mut parts: Vec<String> = entries
                .iter()
                .take(TOP_CATEGORIES)
                .map(|e| {
                    format!(
                        "{} {:.0}%",
                        e.value.to_csv_string(),
                        e.count as f64 / total * 100.0
                    )
                })
                .collect();
            if entries.len() > TOP_CATEGORIES {
                parts.push(format!("+{} more", entries.len() - TOP_CATEGORIES));
            }
            parts.join(", ")
        }
        ProfileStats::Date(d) => format!("{} to {}, mode {}", d.min, d.max, d.mode),
        ProfileStats::Identifier(id) => format!("{:?} identifier, substituted", id.kind),
        ProfileStats::Unavailable => "no usable values".to_string(),
    }
}
