use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthKitError};
use crate::profile::variable::{profile_variable, VariableProfile};
use crate::profile::ProfileOptions;
use crate::schema::types::SourceDomain;

/// Every variable profile of one domain, plus domain metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub name: String,
    pub subject_key: String,
    pub record_count: usize,
    /// Distinct non-missing subject keys.
    pub subject_count: usize,
    /// Profiles in column order.
    pub variables: IndexMap<String, VariableProfile>,
    /// Observed rows-per-subject distribution: row count to number of
    /// subjects with that many rows.
    pub rows_per_subject: BTreeMap<usize, usize>,
}

impl DomainProfile {
    pub fn get_variable(&self, name: &str) -> Result<&VariableProfile> {
        self.variables
            .get(name)
            .ok_or_else(|| SynthKitError::VariableNotFound {
                domain: self.name.clone(),
                variable: name.to_string(),
            })
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|s| s.as_str())
    }

    /// Variables that degraded to "always missing".
    pub fn degraded_variables(&self) -> Vec<&str> {
        self.variables
            .values()
            .filter(|v| v.is_degraded())
            .map(|v| v.name.as_str())
            .collect()
    }

    pub fn max_rows_per_subject(&self) -> usize {
        self.rows_per_subject.keys().next_back().copied().unwrap_or(0)
    }

    pub fn mean_rows_per_subject(&self) -> f64 {
        let subjects: usize = self.rows_per_subject.values().sum();
        if subjects == 0 {
            return 0.0;
        }
        let rows: usize = self.rows_per_subject.iter().map(|(k, n)| k * n).sum();
        rows as f64 / subjects as f64
    }
}

/// Profile every column of a domain.
pub fn profile_domain(domain: &SourceDomain, options: &ProfileOptions) -> DomainProfile {
    let mut variables = IndexMap::new();
    for column in &domain.columns {
        let values = domain.column_values(column);
        let is_key = *column == domain.subject_key;
        variables.insert(
            column.clone(),
            profile_variable(column, &values, is_key, options),
        );
    }

    let subjects = domain.subject_rows();
    let mut rows_per_subject = BTreeMap::new();
    for rows in subjects.values() {
        *rows_per_subject.entry(rows.len()).or_insert(0) += 1;
    }

    let profile = DomainProfile {
        name: domain.name.clone(),
        subject_key: domain.subject_key.clone(),
        record_count: domain.record_count(),
        subject_count: subjects.len(),
        variables,
        rows_per_subject,
    };

    tracing::info!(
        "Profiled domain {}: {} records, {} subjects, {} variables",
        profile.name,
        profile.record_count,
        profile.subject_count,
        profile.variables.len()
    );

    profile
}
