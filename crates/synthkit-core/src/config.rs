//! # Configuration File Parser
//!
//! Reads and parses `synthkit.toml`, the optional configuration file that
//! sets generation defaults without CLI flags. Supports:
//!
//! - `[generate]`: subject count, seed, sampling mode, workers, key prefix, retries
//! - `[profile]`: histogram bins and type-inference thresholds
//! - `[relationships]`: detection threshold and minimum paired observations
//! - `[domains.<NAME>]`: per-domain subject key and whether the domain is required
//! - `[variables.<DOMAIN>.<VAR>]`: bounds, allowed values and missing rate for one variable
//!
//! Example `synthkit.toml`:
//!
//! ```toml
//! [generate]
//! subjects = 200
//! seed = 42
//! mode = "statistical"
//!
//! [profile]
//! histogram_bins = 12
//!
//! [relationships]
//! threshold = 0.4
//!
//! [domains.LB]
//! subject_key = "USUBJID"
//!
//! [domains.AE]
//! required = false
//!
//! [variables.DM.AGE]
//! min = 18
//! max = 65
//! nullable = false
//!
//! [variables.DM.ARM]
//! allowed_values = ["PLACEBO", "DRUG A"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SynthKitError};
use crate::generate::constraint::ValueConstraint;
use crate::generate::options::GenerateOptions;
use crate::generate::sampler::SamplingMode;
use crate::schema::value::Value;

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "synthkit.toml";

/// Top-level synthkit.toml structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthKitConfig {
    pub generate: GenerateConfig,
    pub profile: ProfileConfig,
    pub relationships: RelationshipConfig,
    /// Per-domain settings, keyed by domain name.
    pub domains: BTreeMap<String, DomainConfig>,
    /// Per-variable overrides, keyed by domain then variable.
    pub variables: BTreeMap<String, BTreeMap<String, VariableConfig>>,

    /// Absolute path to the directory containing synthkit.toml.
    ///
    /// Populated by `read_config()`.
    #[serde(skip)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerateConfig {
    /// Synthetic subjects per linkage component.
    pub subjects: Option<i64>,
    pub seed: Option<u64>,
    pub mode: Option<SamplingMode>,
    pub workers: Option<usize>,
    pub key_prefix: Option<String>,
    pub retry_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    pub histogram_bins: Option<usize>,
    pub max_categories: Option<usize>,
    pub max_distinct_ratio: Option<f64>,
    pub type_inference_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationshipConfig {
    pub threshold: Option<f64>,
    pub min_paired_observations: Option<usize>,
    pub temporal_consistency: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DomainConfig {
    /// Subject-key column; overrides the CLI-wide key for this domain.
    pub subject_key: Option<String>,
    /// `false` lets the domain end up with no subjects without failing.
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariableConfig {
    pub min: Option<CellConfig>,
    pub max: Option<CellConfig>,
    pub allowed_values: Option<Vec<CellConfig>>,
    pub null_probability: Option<f64>,
    /// `false` is shorthand for `null_probability = 0`.
    pub nullable: Option<bool>,
}

/// A TOML number or string standing for one cell value. Strings are parsed
/// like CSV cells, so `"2021-01-01"` is a date.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CellConfig {
    Number(f64),
    Text(String),
}

impl CellConfig {
    pub fn to_value(&self) -> Value {
        match self {
            CellConfig::Number(n) => Value::Number(*n),
            CellConfig::Text(s) => Value::parse_cell(s),
        }
    }
}

impl VariableConfig {
    pub fn constraint(&self) -> Result<ValueConstraint> {
        let null_probability = match (self.nullable, self.null_probability) {
            (Some(false), Some(p)) if p > 0.0 => {
                return Err(SynthKitError::config(format!(
                    "nullable = false contradicts null_probability = {}",
                    p
                )))
            }
            (Some(false), _) => Some(0.0),
            (_, p) => p,
        };
        let allowed_values: Vec<Value> = self
            .allowed_values
            .iter()
            .flatten()
            .map(CellConfig::to_value)
            .collect();
        if allowed_values.iter().any(Value::is_missing) {
            return Err(SynthKitError::config(
                "allowed_values must not contain missing markers",
            ));
        }
        Ok(ValueConstraint {
            min: self.min.as_ref().map(CellConfig::to_value),
            max: self.max.as_ref().map(CellConfig::to_value),
            allowed_values,
            null_probability,
        })
    }
}

/// Read and parse a synthkit.toml file from the given directory.
///
/// Returns `None` if the file doesn't exist (config is optional).
/// Returns an error if the file exists but can't be parsed or validated.
pub fn read_config(dir: &Path) -> Result<Option<SynthKitConfig>> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| SynthKitError::ConfigFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut config: SynthKitConfig =
        toml::from_str(&content).map_err(|e| SynthKitError::ConfigFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    config.config_dir = Some(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()));

    // Validate semantic constraints that serde can't enforce.
    config.validate()?;

    Ok(Some(config))
}

impl SynthKitConfig {
    /// Validate semantic constraints that serde cannot enforce.
    ///
    /// Call this immediately after parsing, before any domain is read.
    pub fn validate(&self) -> Result<()> {
        if let Some(subjects) = self.generate.subjects {
            if subjects < 1 {
                return Err(SynthKitError::config(format!(
                    "[generate] subjects must be at least 1, got {}",
                    subjects
                )));
            }
        }
        for (name, domain) in &self.domains {
            if let Some(key) = &domain.subject_key {
                if key.trim().is_empty() {
                    return Err(SynthKitError::config(format!(
                        "[domains.{}] subject_key must not be empty",
                        name
                    )));
                }
            }
        }
        let mut options = GenerateOptions::default();
        self.apply(&mut options)?;
        options.validate()
    }

    /// Overlay every value set in the file onto `options`.
    ///
    /// Fails only on a `[variables]` entry that cannot become a constraint.
    pub fn apply(&self, options: &mut GenerateOptions) -> Result<()> {
        let g = &self.generate;
        if let Some(seed) = g.seed {
            options.seed = Some(seed);
        }
        if let Some(mode) = g.mode {
            options.mode = mode;
        }
        if let Some(workers) = g.workers {
            options.workers = Some(workers);
        }
        if let Some(prefix) = &g.key_prefix {
            options.key_prefix = prefix.clone();
        }
        if let Some(retry) = g.retry_count {
            options.retry_count = retry;
        }

        let p = &self.profile;
        if let Some(bins) = p.histogram_bins {
            options.histogram_bins = bins;
        }
        if let Some(max) = p.max_categories {
            options.max_categories = max;
        }
        if let Some(ratio) = p.max_distinct_ratio {
            options.max_distinct_ratio = ratio;
        }
        if let Some(ratio) = p.type_inference_ratio {
            options.type_inference_ratio = ratio;
        }

        let r = &self.relationships;
        if let Some(threshold) = r.threshold {
            options.relationship_threshold = threshold;
        }
        if let Some(min) = r.min_paired_observations {
            options.min_paired_observations = min;
        }
        if let Some(consistency) = r.temporal_consistency {
            options.temporal_consistency = consistency;
        }

        for (name, domain) in &self.domains {
            if domain.required == Some(false) {
                options.optional_domains.insert(name.clone());
            }
        }

        for (domain, variables) in &self.variables {
            for (variable, config) in variables {
                let constraint = config.constraint().map_err(|e| {
                    SynthKitError::config(format!("[variables.{}.{}] {}", domain, variable, e))
                })?;
                options
                    .constraints
                    .entry(domain.clone())
                    .or_default()
                    .insert(variable.clone(), constraint);
            }
        }
        Ok(())
    }

    /// Subject-key override for one domain.
    pub fn subject_key_for(&self, domain: &str) -> Option<&str> {
        self.domains
            .get(domain)
            .and_then(|d| d.subject_key.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[generate]
subjects = 200
seed = 42
mode = "random"
workers = 4
key_prefix = "SIM"
retry_count = 2

[profile]
histogram_bins = 12
max_categories = 30
max_distinct_ratio = 0.4
type_inference_ratio = 0.95

[relationships]
threshold = 0.4
min_paired_observations = 8
temporal_consistency = 0.8

[domains.LB]
subject_key = "SUBJID"

[domains.AE]
required = false
"#;

        let config: SynthKitConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.generate.subjects, Some(200));
        assert_eq!(config.generate.mode, Some(SamplingMode::Random));
        assert_eq!(config.subject_key_for("LB"), Some("SUBJID"));
        assert_eq!(config.subject_key_for("DM"), None);
        assert!(config.validate().is_ok());

        let mut options = GenerateOptions::default();
        config.apply(&mut options).unwrap();
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.mode, SamplingMode::Random);
        assert_eq!(options.workers, Some(4));
        assert_eq!(options.key_prefix, "SIM");
        assert_eq!(options.retry_count, 2);
        assert_eq!(options.histogram_bins, 12);
        assert_eq!(options.max_categories, 30);
        assert_eq!(options.relationship_threshold, 0.4);
        assert_eq!(options.min_paired_observations, 8);
        assert_eq!(options.temporal_consistency, 0.8);
        assert!(!options.is_required("AE"));
        assert!(options.is_required("LB"));
    }

    #[test]
    fn test_parse_empty_config() {
        let config: SynthKitConfig = toml::from_str("").unwrap();
        assert!(config.generate.subjects.is_none());
        assert!(config.domains.is_empty());

        let mut options = GenerateOptions::default();
        config.apply(&mut options).unwrap();
        assert_eq!(options, GenerateOptions::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: std::result::Result<SynthKitConfig, _> = toml::from_str(
            r#"
[generate]
rows = 10
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let config: SynthKitConfig = toml::from_str(
            r#"
[relationships]
threshold = 1.2
"#,
        )
        .unwrap();
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("relationship_threshold"), "{}", msg);
    }

    #[test]
    fn test_validate_rejects_non_positive_subjects() {
        let config: SynthKitConfig = toml::from_str(
            r#"
[generate]
subjects = 0
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_config_nonexistent() {
        let result = read_config(Path::new("/nonexistent/dir"));
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_read_config_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
[generate]
subjects = 50
"#,
        )
        .unwrap();

        let config = read_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.generate.subjects, Some(50));

        // canonicalize expected path too: macOS symlinks /var to /private/var
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(config.config_dir.as_deref(), Some(expected.as_path()));
    }

    #[test]
    fn test_read_config_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "this is not valid [[[toml").unwrap();

        let err = read_config(dir.path()).unwrap_err();
        assert!(matches!(err, SynthKitError::ConfigFile { .. }), "{}", err);
    }

    #[test]
    fn test_variable_constraints() {
        let config: SynthKitConfig = toml::from_str(
            r#"
[variables.DM.AGE]
min = 18
max = 65.5
nullable = false

[variables.DM.ARM]
allowed_values = ["PLACEBO", "DRUG A"]
null_probability = 0.25

[variables.AE.AESTDTC]
min = "2021-01-01"
"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let mut options = GenerateOptions::default();
        config.apply(&mut options).unwrap();
        let age = &options.constraints["DM"]["AGE"];
        assert_eq!(age.min, Some(Value::Number(18.0)));
        assert_eq!(age.max, Some(Value::Number(65.5)));
        assert_eq!(age.null_probability, Some(0.0));

        let arm = &options.constraints["DM"]["ARM"];
        assert_eq!(
            arm.allowed_values,
            vec![Value::from("PLACEBO"), Value::from("DRUG A")]
        );
        assert_eq!(arm.null_probability, Some(0.25));

        let start = &options.constraints["AE"]["AESTDTC"];
        assert!(matches!(start.min, Some(Value::Date(_))));
    }

    #[test]
    fn test_variable_constraints_rejected() {
        for body in [
            "[variables.DM.AGE]\nmin = 70\nmax = 18\n",
            "[variables.DM.AGE]\nnullable = false\nnull_probability = 0.5\n",
            "[variables.DM.AGE]\nmin = \"old\"\n",
            "[variables.DM.SEX]\nnull_probability = 2.0\n",
        ] {
            let config: SynthKitConfig = toml::from_str(body).unwrap();
            let err = config.validate().unwrap_err();
            assert!(matches!(err, SynthKitError::Configuration { .. }), "{}", err);
        }

        let unknown: std::result::Result<SynthKitConfig, _> =
            toml::from_str("[variables.DM.AGE]\ndistribution = \"normal\"\n");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_histogram_bins_capped() {
        let config: SynthKitConfig =
            toml::from_str("[profile]\nhistogram_bins = 100000000\n").unwrap();
        assert!(config.validate().is_err());
    }
}
