use serde::{Deserialize, Serialize};

use crate::profile::infer::{infer_data_type, IdentifierKind};
use crate::profile::stats::{DateStats, FrequencyTable, NumericStats};
use crate::profile::ProfileOptions;
use crate::schema::types::DataType;
use crate::schema::value::Value;

/// Statistical summary of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableProfile {
    pub name: String,
    pub data_type: DataType,
    /// Number of cells in the column, missing included.
    pub record_count: usize,
    /// Missing cells, plus values that did not conform to the inferred type.
    pub missing_count: usize,
    /// `missing_count / record_count`, always in [0, 1].
    pub missing_rate: f64,
    pub nullable: bool,
    pub stats: ProfileStats,
}

/// Type-specific statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileStats {
    Numeric(NumericStats),
    /// CATEGORICAL and TEXT variables.
    Frequencies(FrequencyTable),
    Date(DateStats),
    /// Not statistically profiled; substituted during anonymization.
    Identifier(IdentifierStats),
    /// Nothing usable was observed. Sampling always yields missing.
    Unavailable,
}

/// What the anonymizer needs to build substitutes of the right shape.
///
/// Only shapes are kept here, never the observed values themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierStats {
    pub kind: IdentifierKind,
    pub value_kind: IdentifierValueKind,
    /// Character-class templates of observed text values, e.g. `AA-999`.
    pub shapes: Vec<String>,
    /// Digit counts of observed integral numbers.
    pub digit_counts: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierValueKind {
    Number,
    Text,
    Date,
}

impl VariableProfile {
    pub fn is_identifier(&self) -> bool {
        self.data_type == DataType::Identifier
    }

    /// True when the column could not be characterized (fully missing).
    pub fn is_degraded(&self) -> bool {
        matches!(self.stats, ProfileStats::Unavailable)
    }

    pub fn numeric(&self) -> Option<&NumericStats> {
        match &self.stats {
            ProfileStats::Numeric(s) => Some(s),
            _ => None,
        }
    }

    pub fn frequencies(&self) -> Option<&FrequencyTable> {
        match &self.stats {
            ProfileStats::Frequencies(f) => Some(f),
            _ => None,
        }
    }

    pub fn dates(&self) -> Option<&DateStats> {
        match &self.stats {
            ProfileStats::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn identifier(&self) -> Option<&IdentifierStats> {
        match &self.stats {
            ProfileStats::Identifier(i) => Some(i),
            _ => None,
        }
    }
}

/// Profile one column.
///
/// Never fails: a column with nothing usable degrades to
/// `ProfileStats::Unavailable` with a missing rate of 1.0.
pub fn profile_variable(
    name: &str,
    values: &[&Value],
    is_subject_key: bool,
    options: &ProfileOptions,
) -> VariableProfile {
    let inference = infer_data_type(name, values, is_subject_key, options);
    let record_count = values.len();

    let (stats, conforming) = match inference.data_type {
        DataType::Numeric => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
            let stats = NumericStats::from_values(&numbers, options.histogram_bins)
                .map(ProfileStats::Numeric)
                .unwrap_or(ProfileStats::Unavailable);
            (stats, numbers.len())
        }
        DataType::Date => {
            let dates: Vec<_> = values.iter().filter_map(|v| v.as_date()).collect();
            let stats = DateStats::from_dates(&dates, options.histogram_bins)
                .map(ProfileStats::Date)
                .unwrap_or(ProfileStats::Unavailable);
            (stats, dates.len())
        }
        DataType::Categorical | DataType::Text => {
            let table = FrequencyTable::from_values(values.iter().copied());
            let observed = table.total();
            let stats = if table.is_empty() {
                ProfileStats::Unavailable
            } else {
                ProfileStats::Frequencies(table)
            };
            (stats, observed)
        }
        DataType::Identifier => {
            let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_missing()).collect();
            let stats = identifier_stats(
                inference.identifier.unwrap_or(IdentifierKind::Code),
                &present,
            );
            (ProfileStats::Identifier(stats), present.len())
        }
    };

    let missing_count = record_count - conforming;
    let missing_rate = if record_count == 0 {
        1.0
    } else {
        missing_count as f64 / record_count as f64
    };

    if matches!(stats, ProfileStats::Unavailable) {
        tracing::warn!(
            "Variable {} has no usable values; synthetic output will be missing",
            name
        );
    } else if conforming < values.iter().filter(|v| !v.is_missing()).count() {
        tracing::debug!(
            "Variable {}: {} values did not conform to {} and are treated as missing",
            name,
            values.iter().filter(|v| !v.is_missing()).count() - conforming,
            inference.data_type
        );
    }

    VariableProfile {
        name: name.to_string(),
        data_type: inference.data_type,
        record_count,
        missing_count,
        missing_rate,
        nullable: missing_count > 0,
        stats,
    }
}

fn identifier_stats(kind: IdentifierKind, present: &[&Value]) -> IdentifierStats {
    let numbers = present.iter().filter(|v| matches!(v, Value::Number(_))).count();
    let dates = present.iter().filter(|v| matches!(v, Value::Date(_))).count();
    let value_kind = if !present.is_empty() && numbers == present.len() {
        IdentifierValueKind::Number
    } else if !present.is_empty() && dates == present.len() {
        IdentifierValueKind::Date
    } else {
        IdentifierValueKind::Text
    };

    let mut shapes: Vec<String> = Vec::new();
    let mut digit_counts: Vec<usize> = Vec::new();
    for v in present {
        match v {
            Value::Number(n) => {
                let digits = format!("{}", n.abs().trunc() as i64).len();
                if !digit_counts.contains(&digits) {
                    digit_counts.push(digits);
                }
            }
            Value::Text(s) => {
                let shape = text_shape(s);
                if !shapes.contains(&shape) {
                    shapes.push(shape);
                }
            }
            _ => {}
        }
    }

    IdentifierStats {
        kind,
        value_kind,
        shapes,
        digit_counts,
    }
}

/// Character-class template: letters become `A`, digits `9`, anything
/// else is kept.
pub fn text_shape(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphabetic() {
                'A'
            } else if c.is_ascii_digit() {
                '9'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, raw: &[&str]) -> VariableProfile {
        let values: Vec<Value> = raw.iter().map(|r| Value::parse_cell(r)).collect();
        let refs: Vec<&Value> = values.iter().collect();
        profile_variable(name, &refs, false, &ProfileOptions::default())
    }

    #[test]
    fn test_numeric_profile() {
        let p = profile("AGE", &["45", "52", "38", "", "61"]);
        assert_eq!(p.data_type, DataType::Numeric);
        assert_eq!(p.missing_count, 1);
        assert!((p.missing_rate - 0.2).abs() < 1e-12);
        assert!(p.nullable);

        let stats = p.numeric().unwrap();
        assert_eq!(stats.min, 38.0);
        assert_eq!(stats.max, 61.0);
        assert_eq!(stats.mean, 49.0);
        assert_eq!(stats.histogram.bin_count(), 10);
    }

    #[test]
    fn test_nonconforming_values_count_as_missing() {
        let mut raw = vec!["5"; 19];
        raw.push("<LLOQ");
        let p = profile("LBSTRESN", &raw);
        assert_eq!(p.data_type, DataType::Numeric);
        assert_eq!(p.missing_count, 1);
        assert_eq!(p.numeric().unwrap().histogram.total(), 19);
    }

    #[test]
    fn test_categorical_counts_sum_to_present() {
        let p = profile("SEX", &["M", "F", "", "F", "M", "F"]);
        assert_eq!(p.data_type, DataType::Categorical);
        let freq = p.frequencies().unwrap();
        assert_eq!(freq.total(), p.record_count - p.missing_count);
        assert_eq!(freq.count(&Value::from("F")), 3);
    }

    #[test]
    fn test_fully_missing_degrades() {
        let p = profile("COMMENT", &["", "", ""]);
        assert!(p.is_degraded());
        assert_eq!(p.missing_rate, 1.0);
        assert_eq!(p.missing_count, 3);
    }

    #[test]
    fn test_date_profile() {
        let p = profile("RFSTDTC", &["2020-01-05", "2020-03-01", "2020-01-05"]);
        let dates = p.dates().unwrap();
        assert_eq!(dates.mode.to_string(), "2020-01-05");
        assert_eq!(dates.max.to_string(), "2020-03-01");
        assert!(!p.nullable);
    }

    #[test]
    fn test_identifier_keeps_only_shapes() {
        let p = profile("SITEID", &["LON-01", "NYC-02", "LON-01"]);
        let ident = p.identifier().unwrap();
        assert_eq!(ident.value_kind, IdentifierValueKind::Text);
        assert_eq!(ident.shapes, vec!["AAA-99"]);
    }

    #[test]
    fn test_text_shape() {
        assert_eq!(text_shape("AB-12 x"), "AA-99 A");
    }
}
