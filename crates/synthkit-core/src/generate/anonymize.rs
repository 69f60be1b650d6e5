//! # PIIAnonymizer
//!
//! Synthetic subject keys come from a [`KeyIssuer`], the one piece of
//! mutable state shared by generation workers. Other identifier-like
//! fields get substitutes built only from the *shape* of the source
//! values (character classes, digit counts, name-ness), never the values
//! themselves, and every substitute is checked against the real values of
//! that variable before it is handed out.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::NaiveDate;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::Fake;
use rand::Rng;

use crate::error::{Result, SynthKitError};
use crate::profile::domain::DomainProfile;
use crate::profile::infer::IdentifierKind;
use crate::profile::variable::{IdentifierStats, IdentifierValueKind};
use crate::schema::types::SourceDomain;
use crate::schema::value::Value;

/// Maximum draws before a substitute is declared impossible.
pub const MAX_SUBSTITUTE_ATTEMPTS: usize = 100;

const DEFAULT_KEY_PREFIX: &str = "SYN";
const MIN_KEY_WIDTH: usize = 3;

/// Issues synthetic subject keys, never repeating one and never
/// producing a real source key.
///
/// A key depends only on the component, the subject ordinal and the set of
/// real keys, so the order in which workers ask for keys does not matter.
#[derive(Debug)]
pub struct KeyIssuer {
    prefix: String,
    width: usize,
    real: HashSet<String>,
    issued: Mutex<HashSet<String>>,
}

impl KeyIssuer {
    /// `target` sets the zero-padded width of the ordinal.
    pub fn new(prefix: &str, target: usize, real: impl IntoIterator<Item = String>) -> Self {
        let prefix = if prefix.is_empty() {
            DEFAULT_KEY_PREFIX
        } else {
            prefix
        };
        Self {
            prefix: prefix.to_string(),
            width: target.max(1).to_string().len().max(MIN_KEY_WIDTH),
            real: real.into_iter().collect(),
            issued: Mutex::new(HashSet::new()),
        }
    }

    /// Issue the key for subject `ordinal` (1-based) of a linkage
    /// component. `component` is `None` when there is only one component.
    pub fn issue(&self, component: Option<usize>, ordinal: usize) -> String {
        let prefix = match component {
            Some(c) => format!("{}{}", self.prefix, c + 1),
            None => self.prefix.clone(),
        };
        let base = format!("{}-{:0width$}", prefix, ordinal, width = self.width);

        let mut issued = match self.issued.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while self.real.contains(&candidate) || issued.contains(&candidate) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        issued.insert(candidate.clone());
        candidate
    }

    pub fn issued_count(&self) -> usize {
        match self.issued.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_real(&self, key: &str) -> bool {
        self.real.contains(key)
    }
}

/// Builds substitutes for non-key identifier variables.
#[derive(Debug, Default)]
pub struct PiiAnonymizer {
    /// Variable name to its real values as rendered in output, across domains.
    real_values: HashMap<String, HashSet<String>>,
}

impl PiiAnonymizer {
    /// Collect the real values of every identifier variable. `domains` and
    /// `profiles` are parallel slices.
    pub fn new(domains: &[SourceDomain], profiles: &[DomainProfile]) -> Self {
        let mut real_values: HashMap<String, HashSet<String>> = HashMap::new();
        for (domain, profile) in domains.iter().zip(profiles) {
            for variable in profile.variables.values().filter(|v| v.is_identifier()) {
                let seen = real_values.entry(variable.name.clone()).or_default();
                for value in domain.column_values(&variable.name) {
                    if !value.is_missing() {
                        seen.insert(rendered(value));
                    }
                }
            }
        }
        Self { real_values }
    }

    /// True when `value` would be written out exactly as one of the real
    /// source values of `variable`, whatever variant either was parsed as.
    pub fn is_real(&self, variable: &str, value: &Value) -> bool {
        self.real_values
            .get(variable)
            .map(|seen| seen.contains(&rendered(value)))
            .unwrap_or(false)
    }

    /// Draw a substitute for `variable` that matches no real value.
    pub fn substitute(
        &self,
        variable: &str,
        stats: &IdentifierStats,
        rng: &mut impl Rng,
    ) -> Result<Value> {
        for _ in 0..MAX_SUBSTITUTE_ATTEMPTS {
            let candidate = draw_substitute(variable, stats, rng);
            if !self.is_real(variable, &candidate) {
                return Ok(candidate);
            }
        }
        Err(SynthKitError::IdentifierExhausted {
            variable: variable.to_string(),
            attempts: MAX_SUBSTITUTE_ATTEMPTS,
        })
    }
}

/// Output form of a value. The text "12" and the number 12 both print as `12`.
fn rendered(value: &Value) -> String {
    value.to_csv_string().trim().to_string()
}

fn draw_substitute(variable: &str, stats: &IdentifierStats, rng: &mut impl Rng) -> Value {
    match (stats.kind, stats.value_kind) {
        (_, IdentifierValueKind::Date) | (IdentifierKind::BirthDate, IdentifierValueKind::Number) => {
            Value::Date(random_birth_date(rng))
        }
        (_, IdentifierValueKind::Number) => Value::Number(random_digits(stats, rng)),
        (IdentifierKind::PersonName, _) => Value::Text(person_name(variable, rng)),
        (IdentifierKind::Email, _) => Value::Text(SafeEmail().fake_with_rng(rng)),
        (IdentifierKind::BirthDate, _) if stats.shapes.is_empty() => {
            Value::Text(random_birth_date(rng).format("%Y-%m-%d").to_string())
        }
        _ => Value::Text(fill_shape(pick_shape(stats, rng), rng)),
    }
}

fn person_name(variable: &str, rng: &mut impl Rng) -> String {
    let lower = variable.to_lowercase();
    if lower.contains("first") || lower.contains("given") {
        FirstName().fake_with_rng(rng)
    } else if lower.contains("last") || lower.contains("surname") || lower.contains("family") {
        LastName().fake_with_rng(rng)
    } else {
        Name().fake_with_rng(rng)
    }
}

fn random_birth_date(rng: &mut impl Rng) -> NaiveDate {
    let year = rng.random_range(1930..=2010);
    let day = rng.random_range(1..=365);
    NaiveDate::from_yo_opt(year, day).unwrap_or(NaiveDate::MIN)
}

fn random_digits(stats: &IdentifierStats, rng: &mut impl Rng) -> f64 {
    let digits = match stats.digit_counts.len() {
        0 => 6,
        n => stats.digit_counts[rng.random_range(0..n)],
    };
    let digits = digits.clamp(1, 15) as u32;
    let low = if digits == 1 { 0 } else { 10u64.pow(digits - 1) };
    rng.random_range(low..10u64.pow(digits)) as f64
}

fn pick_shape<'a>(stats: &'a IdentifierStats, rng: &mut impl Rng) -> &'a str {
    if stats.shapes.is_empty() {
        return match stats.kind {
            IdentifierKind::Initials => "AAA",
            _ => "AAA-9999",
        };
    }
    &stats.shapes[rng.random_range(0..stats.shapes.len())]
}

/// Replace `A` with a random capital letter and `9` with a random digit.
pub fn fill_shape(shape: &str, rng: &mut impl Rng) -> String {
    shape
        .chars()
        .map(|c| match c {
            'A' => (b'A' + rng.random_range(0..26u8)) as char,
            '9' => (b'0' + rng.random_range(0..10u8)) as char,
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{profile_domain, ProfileOptions};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn stats(kind: IdentifierKind, value_kind: IdentifierValueKind, shapes: &[&str]) -> IdentifierStats {
        IdentifierStats {
            kind,
            value_kind,
            shapes: shapes.iter().map(|s| s.to_string()).collect(),
            digit_counts: vec![4],
        }
    }

    #[test]
    fn test_keys_are_padded_and_distinct() {
        let issuer = KeyIssuer::new("SYN", 100, Vec::new());
        assert_eq!(issuer.issue(None, 1), "SYN-001");
        assert_eq!(issuer.issue(None, 100), "SYN-100");
        assert_eq!(issuer.issue(Some(1), 7), "SYN2-007");
        assert_eq!(issuer.issued_count(), 3);
    }

    #[test]
    fn test_real_key_collision_gets_suffix() {
        let issuer = KeyIssuer::new("SYN", 10, vec!["SYN-002".to_string()]);
        assert_eq!(issuer.issue(None, 2), "SYN-002-1");
        assert!(!issuer.is_real("SYN-002-1"));
    }

    #[test]
    fn test_reissue_never_duplicates() {
        let issuer = KeyIssuer::new("SYN", 10, Vec::new());
        let a = issuer.issue(None, 3);
        let b = issuer.issue(None, 3);
        assert_ne!(a, b);
    }

    #[test]
    fn test_parallel_issuance_is_unique() {
        let issuer = Arc::new(KeyIssuer::new("SYN", 400, Vec::new()));
        std::thread::scope(|s| {
            for t in 0..4 {
                let issuer = Arc::clone(&issuer);
                s.spawn(move || {
                    for i in 0..100 {
                        issuer.issue(None, t * 100 + i + 1);
                    }
                });
            }
        });
        assert_eq!(issuer.issued_count(), 400);
    }

    #[test]
    fn test_fill_shape_keeps_classes() {
        let mut rng = StdRng::seed_from_u64(42);
        let filled = fill_shape("AA-999", &mut rng);
        assert_eq!(filled.len(), 6);
        let chars: Vec<char> = filled.chars().collect();
        assert!(chars[0].is_ascii_uppercase() && chars[1].is_ascii_uppercase());
        assert_eq!(chars[2], '-');
        assert!(chars[3..].iter().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_substitute_never_real() {
        let domain = SourceDomain::from_records(
            "DM",
            "USUBJID",
            vec!["USUBJID".into(), "INITIALS".into()],
            // Every two-letter combination starting with A is real.
            (0..26).map(|i| {
                vec![
                    format!("S-{}", i),
                    format!("A{}", (b'A' + i as u8) as char),
                ]
            }),
        );
        let profile = profile_domain(&domain, &ProfileOptions::default());
        let anonymizer = PiiAnonymizer::new(&[domain], &[profile.clone()]);
        let initials = profile.get_variable("INITIALS").unwrap().identifier().unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let v = anonymizer.substitute("INITIALS", initials, &mut rng).unwrap();
            assert!(!anonymizer.is_real("INITIALS", &v));
            assert_eq!(v.as_text().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_exhausted_when_every_candidate_is_real() {
        let mut anonymizer = PiiAnonymizer::default();
        anonymizer.real_values.insert(
            "FLAG".to_string(),
            (0..10).map(|d| d.to_string()).collect(),
        );
        let mut one_digit = stats(IdentifierKind::Code, IdentifierValueKind::Number, &[]);
        one_digit.digit_counts = vec![1];
        let mut rng = StdRng::seed_from_u64(42);

        let err = anonymizer.substitute("FLAG", &one_digit, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            SynthKitError::IdentifierExhausted { attempts: MAX_SUBSTITUTE_ATTEMPTS, .. }
        ));
    }

    #[test]
    fn test_zero_padded_codes_match_across_variants() {
        // "01".."09" stay text, "10".."20" parse as numbers.
        let domain = SourceDomain::from_records(
            "DM",
            "USUBJID",
            vec!["USUBJID".into(), "SITEID".into()],
            (1..=20).map(|i| vec![format!("S-{}", i), format!("{:02}", i)]),
        );
        let profile = profile_domain(&domain, &ProfileOptions::default());
        let anonymizer = PiiAnonymizer::new(&[domain], &[profile.clone()]);

        assert!(anonymizer.is_real("SITEID", &Value::Text("12".into())));
        assert!(anonymizer.is_real("SITEID", &Value::Number(12.0)));
        assert!(anonymizer.is_real("SITEID", &Value::Text("07".into())));
        assert!(!anonymizer.is_real("SITEID", &Value::Text("21".into())));

        let site = profile.get_variable("SITEID").unwrap().identifier().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let v = anonymizer.substitute("SITEID", site, &mut rng).unwrap();
            let out = v.to_csv_string();
            assert!(
                !(1..=20).any(|i| out == format!("{:02}", i) || out == i.to_string()),
                "real site code {} reached output",
                out
            );
        }
    }

    #[test]
    fn test_substitute_kinds() {
        let anonymizer = PiiAnonymizer::default();
        let mut rng = StdRng::seed_from_u64(42);

        let dob = anonymizer
            .substitute(
                "BRTHDTC",
                &stats(IdentifierKind::BirthDate, IdentifierValueKind::Date, &[]),
                &mut rng,
            )
            .unwrap();
        let year: i32 = dob.as_date().unwrap().format("%Y").to_string().parse().unwrap();
        assert!((1930..=2010).contains(&year));

        let code = anonymizer
            .substitute(
                "MRN",
                &stats(IdentifierKind::Code, IdentifierValueKind::Number, &[]),
                &mut rng,
            )
            .unwrap();
        let n = code.as_number().unwrap();
        assert!((1000.0..10000.0).contains(&n));

        let email = anonymizer
            .substitute(
                "EMAIL",
                &stats(IdentifierKind::Email, IdentifierValueKind::Text, &[]),
                &mut rng,
            )
            .unwrap();
        assert!(email.as_text().unwrap().contains('@'));
    }
}
