pub mod config;
pub mod error;
pub mod generate;
pub mod graph;
pub mod job;
pub mod output;
pub mod profile;
pub mod quality;
pub mod schema;

// Re-export key types for convenience
pub use error::{Result, SynthKitError};
pub use generate::{
    CancellationToken, GenerateOptions, GenerationOrchestrator, GenerationOutput, RunControl,
    SamplingMode,
};
pub use job::{GenerationJob, JobStatus};
pub use quality::QualityReport;
pub use schema::{DataType, Row, SourceDomain, Value};
