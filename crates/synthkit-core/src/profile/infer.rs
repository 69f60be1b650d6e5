use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::profile::ProfileOptions;
use crate::schema::types::DataType;
use crate::schema::value::Value;

/// How an identifier-like variable is substituted during anonymization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// The domain's subject-key column.
    SubjectKey,
    /// A person's name (participant or investigator).
    PersonName,
    Initials,
    BirthDate,
    Email,
    /// Codes, phone numbers, addresses: substituted by character shape.
    Code,
}

/// A pre-compiled identifier rule.
struct CompiledRule {
    pattern: Regex,
    kind: IdentifierKind,
}

/// Identifier rules: regex against the lower-cased variable name.
const IDENTIFIER_RULES: &[(&str, IdentifierKind)] = &[
    // Subject identifiers other than the key itself
    (r"^(usubjid|subjid|rsubjid|subject_?id|patient_?id|pt_?id|screening_?id|scrid)$", IdentifierKind::Code),
    // Site and investigator codes
    (r"^(siteid|site_?id|site_?number|invid|inv_?id|investigator_?id)$", IdentifierKind::Code),
    // Names
    (r"^(invnam|inv_?name|investigator(_?name)?|patient_?name|subject_?name|name|surname)$", IdentifierKind::PersonName),
    (r"^(first|last|full|middle|given|family)_?name$", IdentifierKind::PersonName),
    (r"^(initials?|subjinit|ptinit|pt_?initials)$", IdentifierKind::Initials),
    (r"^(brthdtc|brthdt|birthdt|dob|birth_?date|date_?of_?birth)$", IdentifierKind::BirthDate),
    (r"e_?mail", IdentifierKind::Email),
    (r"(phone|mobile|telephone|fax)", IdentifierKind::Code),
    (r"(address|street|zip_?code|postal|postcode)", IdentifierKind::Code),
    (r"(ssn|social_?security|passport|license|licence|medical_?record|^mrn$|national_?id)", IdentifierKind::Code),
    // Any other column naming the patient
    (r"patient", IdentifierKind::Code),
];

static COMPILED_RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    IDENTIFIER_RULES
        .iter()
        .map(|(pattern, kind)| CompiledRule {
            pattern: Regex::new(pattern).unwrap(),
            kind: *kind,
        })
        .collect()
});

/// Classify a variable name against the identifier rules.
pub fn identifier_kind_for_name(name: &str) -> Option<IdentifierKind> {
    let normalized = name.trim().to_lowercase();
    COMPILED_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(&normalized))
        .map(|rule| rule.kind)
}

/// Result of type inference for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inference {
    pub data_type: DataType,
    /// Set when `data_type` is `Identifier`.
    pub identifier: Option<IdentifierKind>,
}

/// Infer the data type of one column.
///
/// Deterministic: the result depends only on the name, the values and
/// the options, never on iteration order of any hash container.
pub fn infer_data_type(
    name: &str,
    values: &[&Value],
    is_subject_key: bool,
    options: &ProfileOptions,
) -> Inference {
    if is_subject_key {
        return Inference {
            data_type: DataType::Identifier,
            identifier: Some(IdentifierKind::SubjectKey),
        };
    }
    if let Some(kind) = identifier_kind_for_name(name) {
        return Inference {
            data_type: DataType::Identifier,
            identifier: Some(kind),
        };
    }

    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_missing()).collect();
    if present.is_empty() {
        return Inference {
            data_type: DataType::Text,
            identifier: None,
        };
    }

    let n = present.len() as f64;
    let numeric = present.iter().filter(|v| matches!(v, Value::Number(_))).count() as f64;
    if numeric / n >= options.type_inference_ratio {
        return Inference {
            data_type: DataType::Numeric,
            identifier: None,
        };
    }

    let dates = present.iter().filter(|v| matches!(v, Value::Date(_))).count() as f64;
    if dates / n >= options.type_inference_ratio {
        return Inference {
            data_type: DataType::Date,
            identifier: None,
        };
    }

    let distinct: HashSet<String> = present.iter().map(|v| v.to_unique_key()).collect();
    let distinct_count = distinct.len();
    if distinct_count as f64 / n <= options.max_distinct_ratio
        && distinct_count <= options.max_categories
    {
        return Inference {
            data_type: DataType::Categorical,
            identifier: None,
        };
    }

    // Free text with one distinct value per observation behaves like an ID.
    if present.len() >= MIN_UNIQUE_OBSERVATIONS && distinct_count == present.len() {
        return Inference {
            data_type: DataType::Identifier,
            identifier: Some(IdentifierKind::Code),
        };
    }

    Inference {
        data_type: DataType::Text,
        identifier: None,
    }
}

/// Observations needed before an all-distinct text column counts as an ID.
const MIN_UNIQUE_OBSERVATIONS: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(name: &str, raw: &[&str]) -> Inference {
        let values: Vec<Value> = raw.iter().map(|r| Value::parse_cell(r)).collect();
        let refs: Vec<&Value> = values.iter().collect();
        infer_data_type(name, &refs, false, &ProfileOptions::default())
    }

    #[test]
    fn test_numeric_over_ninety_percent() {
        let mut raw = vec!["1"; 9];
        raw.push("unknown");
        assert_eq!(infer("LBSTRESN", &raw).data_type, DataType::Numeric);
    }

    #[test]
    fn test_numeric_below_threshold_falls_through() {
        let raw = vec!["1", "2", "x", "y", "1", "2", "x", "y"];
        assert_eq!(infer("VAL", &raw).data_type, DataType::Categorical);
    }

    #[test]
    fn test_dates() {
        let raw = vec!["2020-01-01", "2020-02-01", "15MAR2020", ""];
        assert_eq!(infer("RFSTDTC", &raw).data_type, DataType::Date);
    }

    #[test]
    fn test_categorical_vs_text() {
        let sex = vec!["M", "F", "F", "M", "F", "M"];
        assert_eq!(infer("SEX", &sex).data_type, DataType::Categorical);

        let comments = vec!["ok", "ok", "late", "fine", "good", "bad"];
        assert_eq!(infer("COVAL", &comments).data_type, DataType::Text);
    }

    #[test]
    fn test_unique_text_is_identifier() {
        let raw = vec!["AB12", "CD34", "EF56", "GH78", "IJ90"];
        let inference = infer("SPEC", &raw);
        assert_eq!(inference.data_type, DataType::Identifier);
        assert_eq!(inference.identifier, Some(IdentifierKind::Code));
    }

    #[test]
    fn test_unique_numbers_stay_numeric() {
        let raw = vec!["45", "52", "38", "61", "29"];
        assert_eq!(infer("AGE", &raw).data_type, DataType::Numeric);
    }

    #[test]
    fn test_identifier_names() {
        assert_eq!(identifier_kind_for_name("SUBJID"), Some(IdentifierKind::Code));
        assert_eq!(identifier_kind_for_name("SITEID"), Some(IdentifierKind::Code));
        assert_eq!(identifier_kind_for_name("INVNAM"), Some(IdentifierKind::PersonName));
        assert_eq!(identifier_kind_for_name("first_name"), Some(IdentifierKind::PersonName));
        assert_eq!(identifier_kind_for_name("INITIALS"), Some(IdentifierKind::Initials));
        assert_eq!(identifier_kind_for_name("BRTHDTC"), Some(IdentifierKind::BirthDate));
        assert_eq!(identifier_kind_for_name("contact_email"), Some(IdentifierKind::Email));
        assert_eq!(identifier_kind_for_name("AGE"), None);
        assert_eq!(identifier_kind_for_name("ARMNAME"), None);
        assert_eq!(identifier_kind_for_name("COUNTRY"), None);
    }

    #[test]
    fn test_any_patient_column_is_identifier() {
        for name in ["PATIENTNO", "patient", "Patient Ref", "ref_patient_code"] {
            assert_eq!(identifier_kind_for_name(name), Some(IdentifierKind::Code), "{}", name);
        }
        assert_eq!(identifier_kind_for_name("patient_name"), Some(IdentifierKind::PersonName));
        assert_eq!(identifier_kind_for_name("PATIENT_ID"), Some(IdentifierKind::Code));
    }

    #[test]
    fn test_subject_key_always_identifier() {
        let values = [Value::Number(1.0), Value::Number(1.0)];
        let refs: Vec<&Value> = values.iter().collect();
        let inference = infer_data_type("ID", &refs, true, &ProfileOptions::default());
        assert_eq!(inference.identifier, Some(IdentifierKind::SubjectKey));
    }

    #[test]
    fn test_all_missing_is_text() {
        let inference = infer("COMMENT", &["", "NA", ""]);
        assert_eq!(inference.data_type, DataType::Text);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let raw = vec!["A", "B", "C", "A", "B", "C", "D"];
        let first = infer("GRP", &raw);
        for _ in 0..10 {
            assert_eq!(infer("GRP", &raw), first);
        }
    }
}
