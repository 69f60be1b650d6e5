use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SynthKitError};
use crate::generate::constraint::{ValueConstraint, MAX_CONSTRAINT_ATTEMPTS};
use crate::graph::relationships::ConditionalTable;
use crate::profile::stats::{ordinal_to_date, FrequencyTable, Histogram};
use crate::profile::variable::{ProfileStats, VariableProfile};
use crate::schema::value::Value;

/// How values are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Per-variable profiles only; statistical relationships are ignored.
    Random,
    /// Profiles plus conditioning on detected relationships.
    #[default]
    Statistical,
}

impl SamplingMode {
    pub fn uses_relationships(&self) -> bool {
        matches!(self, SamplingMode::Statistical)
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMode::Random => write!(f, "random"),
            SamplingMode::Statistical => write!(f, "statistical"),
        }
    }
}

/// An already-sampled value a draw is conditioned on.
#[derive(Debug, Clone, Copy)]
pub enum Conditioning<'a> {
    None,
    /// Linear relationship to a sampled numeric value.
    Correlated {
        value: f64,
        coefficient: f64,
        source_mean: f64,
        source_std: f64,
        target_mean: f64,
        target_std: f64,
    },
    /// Conditional frequencies given a sampled source value.
    Categorical {
        source: &'a Value,
        table: &'a ConditionalTable,
    },
    /// Day offset from a sampled earlier date, applied with probability
    /// `strength`.
    Anchored {
        anchor: NaiveDate,
        offsets: &'a Histogram,
        strength: f64,
    },
}

/// Draws one synthetic value from one variable profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectValueSampler {
    mode: SamplingMode,
}

impl SubjectValueSampler {
    pub fn new(mode: SamplingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Sample a value for `profile` (a variable of `domain`).
    ///
    /// Missing injection with the profile's missing rate runs after every
    /// other step. Identifier variables cannot be sampled; they are
    /// substituted by the anonymizer.
    pub fn sample(
        &self,
        domain: &str,
        profile: &VariableProfile,
        conditioning: Conditioning<'_>,
        rng: &mut impl Rng,
    ) -> Result<Value> {
        self.sample_constrained(domain, profile, conditioning, None, rng)
    }

    /// [`sample`](Self::sample) with an optional override: clamp to the
    /// bounds, redraw outside the allowed set, then inject missing values
    /// with `null_probability` in place of the observed rate.
    pub fn sample_constrained(
        &self,
        domain: &str,
        profile: &VariableProfile,
        conditioning: Conditioning<'_>,
        constraint: Option<&ValueConstraint>,
        rng: &mut impl Rng,
    ) -> Result<Value> {
        let conditioning = if self.mode.uses_relationships() {
            conditioning
        } else {
            Conditioning::None
        };
        if matches!(profile.stats, ProfileStats::Unavailable) {
            return Ok(Value::Missing);
        }

        let (value, missing_rate) = match constraint {
            None => (
                self.draw(domain, profile, conditioning, rng)?,
                profile.missing_rate,
            ),
            Some(c) => {
                let mut value = c.clamp(self.draw(domain, profile, conditioning, rng)?);
                let mut attempts = 1;
                while !c.allows(&value) && attempts < MAX_CONSTRAINT_ATTEMPTS {
                    value = c.clamp(self.draw(domain, profile, conditioning, rng)?);
                    attempts += 1;
                }
                if !c.allows(&value) {
                    if let Some(allowed) = c.pick_allowed(rng) {
                        value = allowed;
                    }
                }
                (value, c.null_probability.unwrap_or(profile.missing_rate))
            }
        };

        if missing_rate > 0.0 && rng.random_bool(missing_rate.clamp(0.0, 1.0)) {
            return Ok(Value::Missing);
        }
        Ok(value)
    }

    /// One draw before constraints and missing injection.
    fn draw(
        &self,
        domain: &str,
        profile: &VariableProfile,
        conditioning: Conditioning<'_>,
        rng: &mut impl Rng,
    ) -> Result<Value> {
        let value = match &profile.stats {
            ProfileStats::Unavailable => return Ok(Value::Missing),
            ProfileStats::Identifier(_) => {
                return Err(SynthKitError::Sampling {
                    domain: domain.to_string(),
                    variable: profile.name.clone(),
                    message: "identifier variables are substituted, not sampled".to_string(),
                })
            }
            ProfileStats::Numeric(stats) => {
                let u = stats.histogram.sample(rng);
                let x = match conditioning {
                    Conditioning::Correlated {
                        value,
                        coefficient,
                        source_mean,
                        source_std,
                        target_mean,
                        target_std,
                    } => blend_correlated(
                        u,
                        value,
                        coefficient,
                        (source_mean, source_std),
                        (target_mean, target_std),
                    ),
                    _ => u,
                };
                if !x.is_finite() {
                    return Err(SynthKitError::Sampling {
                        domain: domain.to_string(),
                        variable: profile.name.clone(),
                        message: format!("non-finite sample {}", x),
                    });
                }
                Value::Number(stats.conform(x))
            }
            ProfileStats::Frequencies(table) => sample_frequencies(table, conditioning, rng),
            ProfileStats::Date(stats) => {
                let anchored = match conditioning {
                    Conditioning::Anchored {
                        anchor,
                        offsets,
                        strength,
                    } if rng.random_bool(strength.clamp(0.0, 1.0)) => {
                        let days = offsets.sample(rng).round() as i64;
                        anchor.checked_add_signed(ChronoDuration::days(days))
                    }
                    _ => None,
                };
                let date = match anchored {
                    Some(d) => d,
                    None => ordinal_to_date(stats.histogram.sample(rng)).ok_or_else(|| {
                        SynthKitError::Sampling {
                            domain: domain.to_string(),
                            variable: profile.name.clone(),
                            message: "sampled date is out of range".to_string(),
                        }
                    })?,
                };
                Value::Date(stats.clamp(date))
            }
        };
        Ok(value)
    }
}

fn sample_frequencies(
    table: &FrequencyTable,
    conditioning: Conditioning<'_>,
    rng: &mut impl Rng,
) -> Value {
    if let Conditioning::Categorical { source, table: conditional } = conditioning {
        if let Some(sub) = conditional.lookup(source) {
            return sub.sample(rng);
        }
    }
    table.sample(rng)
}

/// `μt + σt·(sign(r)·s·z_v + √(1−s²)·z_u)` with `s = |r|`.
///
/// `u` is the unconditioned draw; a zero-variance side contributes nothing
/// from that side.
fn blend_correlated(
    u: f64,
    v: f64,
    coefficient: f64,
    (source_mean, source_std): (f64, f64),
    (target_mean, target_std): (f64, f64),
) -> f64 {
    if target_std <= f64::EPSILON {
        return u;
    }
    let s = coefficient.abs().min(1.0);
    let z_v = if source_std > f64::EPSILON {
        (v - source_mean) / source_std
    } else {
        0.0
    };
    let z_u = (u - target_mean) / target_std;
    target_mean + target_std * (coefficient.signum() * s * z_v + (1.0 - s * s).sqrt() * z_u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{profile_variable, ProfileOptions};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn profile(name: &str, raw: &[&str]) -> VariableProfile {
        let values: Vec<Value> = raw.iter().map(|r| Value::parse_cell(r)).collect();
        let refs: Vec<&Value> = values.iter().collect();
        profile_variable(name, &refs, false, &ProfileOptions::default())
    }

    fn ages() -> VariableProfile {
        profile(
            "AGE",
            &[
                "45", "52", "38", "61", "47", "55", "42", "58", "36", "49", "63", "51", "44", "40",
                "57", "53", "46", "60", "39", "50",
            ],
        )
    }

    #[test]
    fn test_numeric_within_range_and_integral() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = ages();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let v = sampler
                .sample("DM", &p, Conditioning::None, &mut rng)
                .unwrap()
                .as_number()
                .unwrap();
            assert!((36.0..=63.0).contains(&v));
            assert_eq!(v.fract(), 0.0);
        }
    }

    #[test]
    fn test_unavailable_always_missing() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = profile("COMMENT", &["", "", ""]);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            assert!(sampler
                .sample("DM", &p, Conditioning::None, &mut rng)
                .unwrap()
                .is_missing());
        }
    }

    #[test]
    fn test_missing_rate_preserved() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = profile("SEX", &["M", "F", "", "F", "M", "", "F", "M", "F", "M"]);
        let mut rng = StdRng::seed_from_u64(42);
        let n = 5000;
        let missing = (0..n)
            .filter(|_| {
                sampler
                    .sample("DM", &p, Conditioning::None, &mut rng)
                    .unwrap()
                    .is_missing()
            })
            .count();
        let rate = missing as f64 / n as f64;
        assert!((rate - 0.2).abs() < 0.03, "rate {}", rate);
    }

    #[test]
    fn test_identifier_cannot_be_sampled() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = profile("SITEID", &["LON-01", "NYC-02"]);
        let mut rng = StdRng::seed_from_u64(42);
        let err = sampler
            .sample("DM", &p, Conditioning::None, &mut rng)
            .unwrap_err();
        assert!(matches!(err, SynthKitError::Sampling { .. }));
    }

    #[test]
    fn test_full_correlation_is_deterministic() {
        // s = 1 leaves no room for the unconditioned draw.
        let x = blend_correlated(10.0, 60.0, 1.0, (50.0, 10.0), (5.0, 1.0));
        assert!((x - 6.0).abs() < 1e-12);
        let neg = blend_correlated(10.0, 60.0, -1.0, (50.0, 10.0), (5.0, 1.0));
        assert!((neg - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_correlation_is_unconditioned() {
        let x = blend_correlated(7.25, 60.0, 0.0, (50.0, 10.0), (5.0, 1.0));
        assert!((x - 7.25).abs() < 1e-12);
    }

    #[test]
    fn test_categorical_conditioning_uses_sub_table() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = profile("RESP", &["Y", "N", "Y", "N", "Y", "N"]);
        let mut conditional = ConditionalTable::new(None);
        conditional.record(&Value::from("DRUG"), &Value::from("Y"));
        conditional.record(&Value::from("DRUG"), &Value::from("Y"));
        let source = Value::from("DRUG");
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let v = sampler
                .sample(
                    "DM",
                    &p,
                    Conditioning::Categorical {
                        source: &source,
                        table: &conditional,
                    },
                    &mut rng,
                )
                .unwrap();
            assert_eq!(v, Value::from("Y"));
        }

        // Unknown source category falls back to the marginal table.
        let other = Value::from("PLACEBO");
        let draws: Vec<Value> = (0..200)
            .map(|_| {
                sampler
                    .sample(
                        "DM",
                        &p,
                        Conditioning::Categorical {
                            source: &other,
                            table: &conditional,
                        },
                        &mut rng,
                    )
                    .unwrap()
            })
            .collect();
        assert!(draws.contains(&Value::from("N")));
    }

    #[test]
    fn test_random_mode_ignores_conditioning() {
        let sampler = SubjectValueSampler::new(SamplingMode::Random);
        let p = profile("RESP", &["Y", "N", "Y", "N", "Y", "N"]);
        let mut conditional = ConditionalTable::new(None);
        conditional.record(&Value::from("DRUG"), &Value::from("Y"));
        let source = Value::from("DRUG");
        let mut rng = StdRng::seed_from_u64(42);

        let draws: Vec<Value> = (0..200)
            .map(|_| {
                sampler
                    .sample(
                        "DM",
                        &p,
                        Conditioning::Categorical {
                            source: &source,
                            table: &conditional,
                        },
                        &mut rng,
                    )
                    .unwrap()
            })
            .collect();
        assert!(draws.contains(&Value::from("N")));
    }

    #[test]
    fn test_anchored_date_follows_anchor() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = profile(
            "AEENDTC",
            &["2021-01-10", "2021-03-15", "2021-06-01", "2021-09-30"],
        );
        let offsets = Histogram::build(&[5.0, 5.0], 1).unwrap();
        let anchor = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let v = sampler
            .sample(
                "AE",
                &p,
                Conditioning::Anchored {
                    anchor,
                    offsets: &offsets,
                    strength: 1.0,
                },
                &mut rng,
            )
            .unwrap();
        assert_eq!(v, Value::Date(NaiveDate::from_ymd_opt(2021, 5, 6).unwrap()));
    }

    #[test]
    fn test_same_seed_same_draws() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = ages();
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..10)
                .map(|_| sampler.sample("DM", &p, Conditioning::None, &mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn test_constraint_bounds_numeric_draws() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = ages();
        let adults = ValueConstraint {
            min: Some(Value::Number(45.0)),
            max: Some(Value::Number(55.0)),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        let draws: Vec<f64> = (0..300)
            .map(|_| {
                sampler
                    .sample_constrained("DM", &p, Conditioning::None, Some(&adults), &mut rng)
                    .unwrap()
                    .as_number()
                    .unwrap()
            })
            .collect();
        assert!(draws.iter().all(|&a| (45.0..=55.0).contains(&a)));
        // Draws from the tails pile up on the bounds.
        assert!(draws.contains(&45.0) && draws.contains(&55.0));
    }

    #[test]
    fn test_constraint_restricts_categories() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = profile("ARM", &["A", "B", "C", "A", "B", "C", "A", "B"]);
        let only_a = ValueConstraint {
            allowed_values: vec![Value::from("A")],
            ..Default::default()
        };
        let outside = ValueConstraint {
            allowed_values: vec![Value::from("PLACEBO")],
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let v = sampler
                .sample_constrained("DM", &p, Conditioning::None, Some(&only_a), &mut rng)
                .unwrap();
            assert_eq!(v, Value::from("A"));
            // Never observed: every draw falls back to the allowed set.
            let v = sampler
                .sample_constrained("DM", &p, Conditioning::None, Some(&outside), &mut rng)
                .unwrap();
            assert_eq!(v, Value::from("PLACEBO"));
        }
    }

    #[test]
    fn test_constraint_null_probability_overrides_missing_rate() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = profile("SEX", &["M", "F", "", "F", "M", "", "F", "M", "F", "M"]);
        let never = ValueConstraint {
            null_probability: Some(0.0),
            ..Default::default()
        };
        let always = ValueConstraint {
            null_probability: Some(1.0),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            assert!(!sampler
                .sample_constrained("DM", &p, Conditioning::None, Some(&never), &mut rng)
                .unwrap()
                .is_missing());
            assert!(sampler
                .sample_constrained("DM", &p, Conditioning::None, Some(&always), &mut rng)
                .unwrap()
                .is_missing());
        }
    }

    #[test]
    fn test_unconstrained_matches_plain_sample() {
        let sampler = SubjectValueSampler::new(SamplingMode::Statistical);
        let p = ages();
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            assert_eq!(
                sampler.sample("DM", &p, Conditioning::None, &mut a).unwrap(),
                sampler
                    .sample_constrained("DM", &p, Conditioning::None, None, &mut b)
                    .unwrap()
            );
        }
    }
}
