//! # Quality Report
//!
//! Compares synthetic tables against the source profiles. Scores are
//! reported, never used to reject a run.
//!
//! | type        | per-variable score                                          |
//! |-------------|-------------------------------------------------------------|
//! | NUMERIC     | mean of 1−rel. mean error, 1−rel. std error, missing agreement |
//! | CATEGORICAL | mean of 1−total variation distance, missing agreement       |
//! | TEXT        | same as CATEGORICAL                                         |
//! | DATE        | mean of 1−\|Δmean\|/range, missing agreement                |
//! | IDENTIFIER  | 1 when no real value leaked, else 0                          |

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::generate::sampler::SamplingMode;
use crate::graph::cycle::DroppedEdge;
use crate::profile::domain::DomainProfile;
use crate::profile::stats::{date_to_ordinal, mean_and_std};
use crate::profile::variable::{ProfileStats, VariableProfile};
use crate::schema::types::{DataType, Row};
use crate::schema::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub seed: u64,
    pub mode: SamplingMode,
    pub requested_subjects: usize,
    /// Subjects generated, summed over linkage components.
    pub generated_subjects: usize,
    /// Subjects skipped after exhausting retries.
    pub failed_subjects: usize,
    pub retries: usize,
    pub cancelled: bool,
    pub overall_score: f64,
    pub domains: IndexMap<String, DomainQuality>,
    pub dropped_edges: Vec<DroppedEdge>,
    /// `DOMAIN.VARIABLE` of every variable that degraded to always-missing.
    pub degraded_variables: Vec<String>,
    pub leaked_values: usize,
    pub warnings: Vec<String>,
}

impl QualityReport {
    pub fn shortfall(&self, domain: &str) -> usize {
        self.domains
            .get(domain)
            .map(|d| d.requested.saturating_sub(d.generated))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainQuality {
    pub requested: usize,
    /// Subjects generated for this domain's linkage component.
    pub generated: usize,
    /// Generated subjects with at least one row here.
    pub subjects_with_rows: usize,
    pub row_count: usize,
    pub score: f64,
    pub variables: IndexMap<String, VariableQuality>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableQuality {
    pub data_type: DataType,
    pub score: f64,
    pub source_missing_rate: f64,
    pub synthetic_missing_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetic_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetic_std: Option<f64>,
    /// Identifier values equal to a real source value.
    pub leaked: usize,
}

/// Score one synthetic column against its source profile.
///
/// `is_real` reports whether an identifier value equals a real source
/// value; it is only consulted for IDENTIFIER variables.
pub fn score_variable(
    profile: &VariableProfile,
    synthetic: &[&Value],
    is_real: impl Fn(&Value) -> bool,
) -> VariableQuality {
    let present: Vec<&Value> = synthetic.iter().copied().filter(|v| !v.is_missing()).collect();
    let synthetic_missing_rate = if synthetic.is_empty() {
        1.0
    } else {
        1.0 - present.len() as f64 / synthetic.len() as f64
    };
    let missing_agreement = unit(1.0 - (profile.missing_rate - synthetic_missing_rate).abs());

    let mut quality = VariableQuality {
        data_type: profile.data_type,
        score: missing_agreement,
        source_missing_rate: profile.missing_rate,
        synthetic_missing_rate,
        source_mean: None,
        synthetic_mean: None,
        source_std: None,
        synthetic_std: None,
        leaked: 0,
    };

    match &profile.stats {
        ProfileStats::Numeric(stats) => {
            let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_number()).collect();
            quality.source_mean = Some(stats.mean);
            quality.source_std = Some(stats.std_dev);
            let (mean_score, std_score) = match mean_and_std(&numbers) {
                Some((mean, std)) => {
                    quality.synthetic_mean = Some(mean);
                    quality.synthetic_std = Some(std);
                    (
                        unit(1.0 - relative_error(stats.mean, mean)),
                        unit(1.0 - relative_error(stats.std_dev, std)),
                    )
                }
                None => (0.0, 0.0),
            };
            quality.score = (mean_score + std_score + missing_agreement) / 3.0;
        }
        ProfileStats::Frequencies(table) => {
            let mut synthetic_counts: HashMap<String, usize> = HashMap::new();
            for v in &present {
                *synthetic_counts.entry(v.to_unique_key()).or_insert(0) += 1;
            }
            let source_total = table.total() as f64;
            let synthetic_total = present.len() as f64;

            let distance = if synthetic_total == 0.0 {
                1.0
            } else {
                let mut distance = 0.0;
                for entry in table.entries() {
                    let p = entry.count as f64 / source_total;
                    let q = synthetic_counts
                        .remove(&entry.value.to_unique_key())
                        .unwrap_or(0) as f64
                        / synthetic_total;
                    distance += (p - q).abs();
                }
                // Categories never seen in the source.
                distance += synthetic_counts.values().map(|&c| c as f64 / synthetic_total).sum::<f64>();
                distance / 2.0
            };
            quality.score = (unit(1.0 - distance) + missing_agreement) / 2.0;
        }
        ProfileStats::Date(stats) => {
            let ordinals: Vec<f64> = present
                .iter()
                .filter_map(|v| v.as_date())
                .map(date_to_ordinal)
                .collect();
            quality.source_mean = Some(stats.mean_ordinal);
            let mean_score = match mean_and_std(&ordinals) {
                Some((mean, _)) => {
                    quality.synthetic_mean = Some(mean);
                    let range = date_to_ordinal(stats.max) - date_to_ordinal(stats.min);
                    if range > 0.0 {
                        unit(1.0 - (mean - stats.mean_ordinal).abs() / range)
                    } else if (mean - stats.mean_ordinal).abs() < 0.5 {
                        1.0
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };
            quality.score = (mean_score + missing_agreement) / 2.0;
        }
        ProfileStats::Identifier(_) => {
            quality.leaked = present.iter().filter(|&&v| is_real(v)).count();
            quality.score = if quality.leaked == 0 { 1.0 } else { 0.0 };
        }
        ProfileStats::Unavailable => {}
    }

    quality
}

/// Score every variable of one synthetic table.
pub fn score_domain(
    profile: &DomainProfile,
    rows: &[Row],
    requested: usize,
    generated: usize,
    subjects_with_rows: usize,
    is_real: impl Fn(&str, &Value) -> bool,
) -> DomainQuality {
    let mut variables = IndexMap::new();
    for (name, variable) in &profile.variables {
        let column: Vec<&Value> = rows
            .iter()
            .map(|row| row.get(name).unwrap_or(&Value::Missing))
            .collect();
        variables.insert(
            name.clone(),
            score_variable(variable, &column, |v| is_real(name.as_str(), v)),
        );
    }

    let score = mean(variables.values().map(|v: &VariableQuality| v.score));
    DomainQuality {
        requested,
        generated,
        subjects_with_rows,
        row_count: rows.len(),
        score,
        variables,
    }
}

/// Mean of an iterator of scores; 0 when empty.
pub fn mean(scores: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = scores.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn relative_error(source: f64, synthetic: f64) -> f64 {
    let scale = source.abs();
    if scale > f64::EPSILON {
        (synthetic - source).abs() / scale
    } else if (synthetic - source).abs() <= f64::EPSILON {
        0.0
    } else {
        1.0
    }
}

fn unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
