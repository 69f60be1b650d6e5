use chrono::NaiveDate;
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::schema::value::Value;

/// Fixed-width histogram over a closed numeric range.
///
/// `edges` has one more element than `counts`. A degenerate range
/// (min == max) is a single bin holding every observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Build a histogram with `bins` equal-width bins spanning the data.
    /// Returns `None` for an empty slice.
    pub fn build(values: &[f64], bins: usize) -> Option<Self> {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if values.is_empty() || !min.is_finite() || !max.is_finite() {
            return None;
        }

        if min == max || bins <= 1 {
            return Some(Self {
                edges: vec![min, max],
                counts: vec![values.len()],
            });
        }

        let width = (max - min) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| min + width * i as f64).collect();
        edges.push(max);

        let mut histogram = Self {
            edges,
            counts: vec![0; bins],
        };
        for &v in values {
            let idx = histogram.bin_index(v);
            histogram.counts[idx] += 1;
        }
        Some(histogram)
    }

    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Bin containing `x`. Values outside the range land in the edge bins;
    /// the maximum belongs to the last bin.
    pub fn bin_index(&self, x: f64) -> usize {
        let bins = self.counts.len();
        if bins <= 1 || x <= self.min() {
            return 0;
        }
        if x >= self.max() {
            return bins - 1;
        }
        let width = (self.max() - self.min()) / bins as f64;
        (((x - self.min()) / width).floor() as usize).min(bins - 1)
    }

    /// Inverse-CDF draw: pick a bin proportionally to its count, then a
    /// uniform point inside it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let weights: Vec<f64> = self.counts.iter().map(|&c| c as f64).collect();
        let bin = weighted_index(&weights, rng);
        let lo = self.edges[bin];
        let hi = self.edges[bin + 1];
        if hi > lo {
            lo + (hi - lo) * rng.random::<f64>()
        } else {
            lo
        }
    }
}

/// One category of a frequency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub value: Value,
    pub count: usize,
}

/// Exact category counts, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyTable {
    entries: IndexMap<String, FrequencyEntry>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every non-missing value.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut table = Self::new();
        for v in values {
            table.record(v);
        }
        table
    }

    /// Add one observation. Missing values are not categories.
    pub fn record(&mut self, value: &Value) {
        if value.is_missing() {
            return;
        }
        self.entries
            .entry(value.to_unique_key())
            .or_insert_with(|| FrequencyEntry {
                value: value.clone(),
                count: 0,
            })
            .count += 1;
    }

    pub fn count(&self, value: &Value) -> usize {
        self.entries
            .get(&value.to_unique_key())
            .map(|e| e.count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.entries.values().map(|e| e.count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &FrequencyEntry> {
        self.entries.values()
    }

    /// Relative frequency of `value` among all counted observations.
    pub fn proportion(&self, value: &Value) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.count(value) as f64 / total as f64
        }
    }

    /// Draw a category proportionally to its count.
    /// Returns `Value::Missing` for an empty table.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Value {
        if self.entries.is_empty() {
            return Value::Missing;
        }
        let weights: Vec<f64> = self.entries.values().map(|e| e.count as f64).collect();
        let idx = weighted_index(&weights, rng);
        self.entries[idx].value.clone()
    }

    /// The most frequent category; ties go to the first seen.
    pub fn mode(&self) -> Option<&Value> {
        let mut best: Option<&FrequencyEntry> = None;
        for entry in self.entries.values() {
            if best.map(|b| entry.count > b.count).unwrap_or(true) {
                best = Some(entry);
            }
        }
        best.map(|e| &e.value)
    }
}

/// Summary of a NUMERIC variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub histogram: Histogram,
    /// Decimal places observed in the source, capped at 6. Zero means
    /// every observation was integral.
    pub decimals: u32,
}

impl NumericStats {
    pub fn from_values(values: &[f64], bins: usize) -> Option<Self> {
        let histogram = Histogram::build(values, bins)?;
        let (mean, std_dev) = mean_and_std(values)?;
        let decimals = values.iter().map(|&v| decimal_places(v)).max().unwrap_or(0);
        Some(Self {
            mean,
            std_dev,
            min: histogram.min(),
            max: histogram.max(),
            histogram,
            decimals,
        })
    }

    /// Round `x` to the source precision and clamp it to the source range.
    pub fn conform(&self, x: f64) -> f64 {
        let factor = 10f64.powi(self.decimals as i32);
        let rounded = (x * factor).round() / factor;
        rounded.clamp(self.min, self.max)
    }
}

/// Summary of a DATE variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateStats {
    pub min: NaiveDate,
    pub max: NaiveDate,
    /// Most frequent date; ties go to the earliest.
    pub mode: NaiveDate,
    pub mean_ordinal: f64,
    /// Histogram over day ordinals (days from the common era).
    pub histogram: Histogram,
}

impl DateStats {
    pub fn from_dates(dates: &[NaiveDate], bins: usize) -> Option<Self> {
        let min = *dates.iter().min()?;
        let max = *dates.iter().max()?;

        let mut counts: std::collections::BTreeMap<NaiveDate, usize> = Default::default();
        for d in dates {
            *counts.entry(*d).or_default() += 1;
        }
        let mut mode = min;
        let mut mode_count = 0;
        for (d, c) in &counts {
            if *c > mode_count {
                mode = *d;
                mode_count = *c;
            }
        }

        let ordinals: Vec<f64> = dates.iter().map(|d| date_to_ordinal(*d)).collect();
        let histogram = Histogram::build(&ordinals, bins)?;
        let (mean_ordinal, _) = mean_and_std(&ordinals)?;
        Some(Self {
            min,
            max,
            mode,
            mean_ordinal,
            histogram,
        })
    }

    pub fn clamp(&self, d: NaiveDate) -> NaiveDate {
        d.clamp(self.min, self.max)
    }
}

/// Day ordinal used for date arithmetic and histograms.
pub fn date_to_ordinal(d: NaiveDate) -> f64 {
    use chrono::Datelike;
    d.num_days_from_ce() as f64
}

pub fn ordinal_to_date(ordinal: f64) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(ordinal.round() as i32)
}

/// Mean and population standard deviation. `None` for an empty slice.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Weighted random index selection.
///
/// Uses the cumulative distribution for O(n) selection.
/// Edge cases:
/// - All weights zero → uniform fallback
/// - Negative weights → clamped to zero
/// - Single weight → always index 0
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    if weights.len() <= 1 {
        return 0;
    }

    let clamped: Vec<f64> = weights.iter().map(|w| w.max(0.0)).collect();
    let total: f64 = clamped.iter().sum();

    if total <= 0.0 {
        return rng.random_range(0..weights.len());
    }

    let roll: f64 = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, w) in clamped.iter().enumerate() {
        cumulative += w;
        if roll < cumulative {
            return i;
        }
    }

    // Floating-point edge case: the last index with positive weight.
    clamped.iter().rposition(|w| *w > 0.0).unwrap_or(weights.len() - 1)
}

/// Number of decimals needed to print `v`, capped at 6.
fn decimal_places(v: f64) -> u32 {
    let formatted = format!("{}", v);
    match formatted.split_once('.') {
        Some((_, frac)) => (frac.len() as u32).min(6),
        None => 0,
    }
}
