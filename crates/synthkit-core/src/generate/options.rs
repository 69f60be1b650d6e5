use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthKitError};
use crate::generate::constraint::ConstraintMap;
use crate::generate::sampler::SamplingMode;
use crate::graph::detect::{DetectionOptions, DEFAULT_THRESHOLD};
use crate::profile::{ProfileOptions, DEFAULT_HISTOGRAM_BINS};

pub const DEFAULT_RETRY_COUNT: usize = 1;
pub const DEFAULT_KEY_PREFIX: &str = "SYN";

/// Upper bound on histogram bins for profiles and offsets.
pub const MAX_HISTOGRAM_BINS: usize = 10_000;

/// Every knob of one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    pub relationship_threshold: f64,
    pub histogram_bins: usize,
    /// Extra attempts per subject after a failure.
    pub retry_count: usize,
    /// Fixed seed. Without one a seed is drawn and reported.
    pub seed: Option<u64>,
    pub mode: SamplingMode,
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub key_prefix: String,
    pub min_paired_observations: usize,
    pub max_categories: usize,
    pub max_distinct_ratio: f64,
    pub type_inference_ratio: f64,
    pub temporal_consistency: f64,
    /// Domains that may end up with zero subjects without failing the run.
    pub optional_domains: BTreeSet<String>,
    /// Per-variable overrides, keyed by domain then variable.
    pub constraints: ConstraintMap,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        let profile = ProfileOptions::default();
        let detection = DetectionOptions::default();
        Self {
            relationship_threshold: DEFAULT_THRESHOLD,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            retry_count: DEFAULT_RETRY_COUNT,
            seed: None,
            mode: SamplingMode::default(),
            workers: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            min_paired_observations: detection.min_paired_observations,
            max_categories: profile.max_categories,
            max_distinct_ratio: profile.max_distinct_ratio,
            type_inference_ratio: profile.type_inference_ratio,
            temporal_consistency: detection.temporal_consistency,
            optional_domains: BTreeSet::new(),
            constraints: ConstraintMap::new(),
        }
    }
}

impl GenerateOptions {
    pub fn profile_options(&self) -> ProfileOptions {
        ProfileOptions {
            histogram_bins: self.histogram_bins,
            type_inference_ratio: self.type_inference_ratio,
            max_distinct_ratio: self.max_distinct_ratio,
            max_categories: self.max_categories,
        }
    }

    pub fn detection_options(&self) -> DetectionOptions {
        DetectionOptions {
            threshold: self.relationship_threshold,
            min_paired_observations: self.min_paired_observations,
            temporal_consistency: self.temporal_consistency,
            histogram_bins: self.histogram_bins,
        }
    }

    pub fn is_required(&self, domain: &str) -> bool {
        !self.optional_domains.contains(domain)
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        let ratios = [
            ("relationship_threshold", self.relationship_threshold),
            ("max_distinct_ratio", self.max_distinct_ratio),
            ("type_inference_ratio", self.type_inference_ratio),
            ("temporal_consistency", self.temporal_consistency),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(SynthKitError::config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.histogram_bins == 0 {
            return Err(SynthKitError::config("histogram_bins must be at least 1"));
        }
        if self.histogram_bins > MAX_HISTOGRAM_BINS {
            return Err(SynthKitError::config(format!(
                "histogram_bins must be at most {}, got {}",
                MAX_HISTOGRAM_BINS, self.histogram_bins
            )));
        }
        if self.workers == Some(0) {
            return Err(SynthKitError::config("workers must be at least 1"));
        }
        if self.key_prefix.trim().is_empty() {
            return Err(SynthKitError::config("key_prefix must not be empty"));
        }
        for (domain, variables) in &self.constraints {
            for (variable, constraint) in variables {
                constraint.validate(domain, variable)?;
            }
        }
        Ok(())
    }
}
