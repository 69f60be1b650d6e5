//! # VariableProfiler
//!
//! Turns typed source columns into statistical profiles. Type inference
//! runs first (see [`infer`]); each inferred type then gets its own
//! summary: histograms for numbers, exact frequency tables for categories
//! and free text, ordinal histograms for dates. Identifier-like columns are
//! not profiled statistically; only their value shapes are kept so the
//! anonymizer can produce look-alike substitutes.

pub mod domain;
pub mod infer;
pub mod stats;
pub mod variable;

use serde::{Deserialize, Serialize};

pub use domain::{profile_domain, DomainProfile};
pub use infer::IdentifierKind;
pub use variable::{profile_variable, ProfileStats, VariableProfile};

/// Default histogram bin count.
pub const DEFAULT_HISTOGRAM_BINS: usize = 10;

/// Knobs that control type inference and profiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileOptions {
    pub histogram_bins: usize,
    /// Share of non-missing values that must parse as numbers (or dates)
    /// for the column to be NUMERIC (or DATE).
    pub type_inference_ratio: f64,
    /// Distinct/non-missing ratio at or below which a column is CATEGORICAL.
    pub max_distinct_ratio: f64,
    pub max_categories: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            type_inference_ratio: 0.9,
            max_distinct_ratio: 0.5,
            max_categories: 50,
        }
    }
}
