use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use synthkit_core::output::OutputFormat as CoreOutputFormat;
use synthkit_core::SamplingMode;

#[derive(Parser, Debug)]
#[command(
    name = "synthkit",
    about = "Generate statistically faithful synthetic clinical subjects from small source datasets",
    version,
    after_help = "Examples:\n  synthkit generate --input dm.csv lb.csv --subjects 100 --seed 42\n  synthkit generate --input dm.csv --subjects 500 --format json --output out/\n  synthkit profile --input dm.csv\n  synthkit relationships --input dm.csv lb.csv vs.csv --format dot"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a synthetic cohort from source domains
    Generate(GenerateArgs),

    /// Profile source domains and display per-variable statistics
    Profile(ProfileArgs),

    /// Detect and render relationships between variables
    Relationships(RelationshipsArgs),
}

/// Source domains shared by every subcommand.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Source CSV files, one domain each (named after the upper-cased file stem)
    #[arg(short, long, num_args = 1.., required = true)]
    pub input: Vec<PathBuf>,

    /// Subject-key column shared across domains
    #[arg(long, default_value = "USUBJID")]
    pub subject_key: String,

    /// Directory containing synthkit.toml
    #[arg(long, default_value = ".")]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Synthetic subjects per linkage component
    #[arg(short = 'n', long)]
    pub subjects: Option<i64>,

    /// Random seed for deterministic generation
    #[arg(long, env = "SYNTHKIT_SEED")]
    pub seed: Option<u64>,

    /// Sampling mode
    #[arg(long)]
    pub mode: Option<ModeArg>,

    /// Minimum relationship strength to honor
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Histogram bins for numeric and date profiles
    #[arg(long)]
    pub bins: Option<usize>,

    /// Worker threads (default: available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Output directory
    #[arg(short, long, default_value = "synthetic")]
    pub output: PathBuf,

    /// Output format
    #[arg(long, default_value = "csv")]
    pub format: FormatArg,
}

#[derive(Parser, Debug)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Histogram bins for numeric and date profiles
    #[arg(long)]
    pub bins: Option<usize>,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: ProfileFormat,
}

#[derive(Parser, Debug)]
pub struct RelationshipsArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Minimum relationship strength to report
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Output format for the relationship graph
    #[arg(long, default_value = "mermaid")]
    pub format: GraphFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Statistical,
    Random,
}

impl From<ModeArg> for SamplingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Statistical => SamplingMode::Statistical,
            ModeArg::Random => SamplingMode::Random,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for CoreOutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Csv => CoreOutputFormat::Csv,
            FormatArg::Json => CoreOutputFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProfileFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GraphFormat {
    Mermaid,
    Dot,
}
