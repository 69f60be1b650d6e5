use anyhow::{Context, Result};
use comfy_table::{Cell, Table as ComfyTable};
use indicatif::{ProgressBar, ProgressStyle};

use synthkit_core::output::write_output;
use synthkit_core::{
    CancellationToken, GenerateOptions, GenerationJob, GenerationOrchestrator, QualityReport,
    RunControl,
};

use crate::args::GenerateArgs;
use crate::commands::{load_sources, spinner, Sources};

/// Subjects per linkage component when neither the flag nor the config sets one.
pub const DEFAULT_SUBJECTS: i64 = 100;

pub async fn run(args: GenerateArgs) -> Result<()> {
    // Phase 1: Load
    let pb = spinner("1/3", "Loading domains...")?;
    let sources = load_sources(&args.input)?;
    pb.finish_with_message(format!(
        "Loading domains... ✓ {} domains, {} records",
        sources.domains.len(),
        sources.record_count()
    ));

    let options = resolve_options(&args, &sources)?;
    let target = args
        .subjects
        .or_else(|| sources.config.as_ref().and_then(|c| c.generate.subjects))
        .unwrap_or(DEFAULT_SUBJECTS);

    // Phase 2: Profile, detect and generate off the async runtime
    let pb2 = ProgressBar::new(0);
    pb2.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.cyan} [2/3] Generating subjects... {bar:40.cyan/dim} {pos}/{len} ({eta})",
            )?
            .progress_chars("█▓░"),
    );

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing subjects already in flight");
            ctrl_c.cancel();
        }
    });

    let worker_pb = pb2.clone();
    let domains = sources.domains;
    let (job, result) = tokio::task::spawn_blocking(move || {
        let mut job = GenerationJob::new(target, &domains);
        let result = GenerationOrchestrator::new(options).and_then(|mut orchestrator| {
            let progress = |done: usize, total: usize| {
                worker_pb.set_length(total as u64);
                worker_pb.set_position(done as u64);
            };
            job.run(
                &mut orchestrator,
                &domains,
                RunControl {
                    cancel: Some(&token),
                    progress: Some(&progress),
                },
            )
        });
        (job, result.map(|output| (output, domains)))
    })
    .await
    .context("Generation task failed")?;

    let (output, domains) = match result {
        Ok(done) => done,
        Err(e) => {
            pb2.abandon();
            return Err(e).with_context(|| format!("Job {} {}", job.id, job.status));
        }
    };
    pb2.finish_with_message(format!(
        "Generating subjects... ✓ ({} subjects)",
        output.report.generated_subjects
    ));

    // Phase 3: Output
    let pb3 = spinner("3/3", "Writing output...")?;
    let written = write_output(&args.output, args.format.into(), &output, &domains)
        .with_context(|| format!("Failed to write output to {}", args.output.display()))?;
    pb3.finish_with_message(format!(
        "Writing output... ✓ {} files in {}",
        written.len(),
        args.output.display()
    ));

    for warning in &output.report.warnings {
        eprintln!("  ⚠ {}", warning);
    }
    println!("{}", summary_table(&output.report));
    eprintln!(
        "\n✓ Job {} {}: quality {:.3}, seed {}",
        job.id, job.status, output.report.overall_score, output.report.seed
    );

    Ok(())
}

/// Defaults, then synthkit.toml, then command-line flags.
fn resolve_options(args: &GenerateArgs, sources: &Sources) -> Result<GenerateOptions> {
    let mut options = sources.options()?;
    if let Some(seed) = args.seed {
        options.seed = Some(seed);
    }
    if let Some(mode) = args.mode {
        options.mode = mode.into();
    }
    if let Some(threshold) = args.threshold {
        options.relationship_threshold = threshold;
    }
    if let Some(bins) = args.bins {
        options.histogram_bins = bins;
    }
    if let Some(workers) = args.workers {
        options.workers = Some(workers);
    }
    Ok(options)
}

fn summary_table(report: &QualityReport) -> ComfyTable {
    let mut t = ComfyTable::new();
    t.set_header(vec![
        "Domain",
        "Requested",
        "Generated",
        "Subjects w/ rows",
        "Rows",
        "Score",
    ]);
    for (name, domain) in &report.domains {
        t.add_row(vec![
            Cell::new(name),
            Cell::new(domain.requested),
            Cell::new(domain.generated),
            Cell::new(domain.subjects_with_rows),
            Cell::new(domain.row_count),
            Cell::new(format!("{:.3}", domain.score)),
        ]);
    }
    t
}
