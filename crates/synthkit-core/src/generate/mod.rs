//! # Subject Generation
//!
//! Everything after analysis: the per-value sampler, the anonymizer and key
//! issuer, the per-subject generator and the orchestrator that fans
//! subjects out over worker threads.

pub mod anonymize;
pub mod cache;
pub mod constraint;
pub mod options;
pub mod orchestrator;
pub mod sampler;
pub mod subject;

pub use anonymize::{KeyIssuer, PiiAnonymizer};
pub use cache::AnalysisCache;
pub use constraint::{ConstraintMap, ValueConstraint};
pub use options::GenerateOptions;
pub use orchestrator::{
    Analysis, CancellationToken, GenerationOrchestrator, GenerationOutput, RunControl,
};
pub use sampler::{SamplingMode, SubjectValueSampler};
pub use subject::{SubjectGenerator, SyntheticSubject};
