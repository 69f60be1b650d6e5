pub mod generate;
pub mod profile;
pub mod relationships;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use synthkit_core::config::{read_config, SynthKitConfig, CONFIG_FILE_NAME};
use synthkit_core::schema::ingest::{domain_name_from_path, read_csv_domain_path};
use synthkit_core::{GenerateOptions, SourceDomain};

use crate::args::InputArgs;

/// Parsed synthkit.toml (if any) plus every source domain.
pub struct Sources {
    pub config: Option<SynthKitConfig>,
    pub domains: Vec<SourceDomain>,
}

impl Sources {
    /// Options from defaults overlaid with the config file.
    pub fn options(&self) -> Result<GenerateOptions> {
        let mut options = GenerateOptions::default();
        if let Some(config) = &self.config {
            config.apply(&mut options)?;
        }
        Ok(options)
    }

    pub fn record_count(&self) -> usize {
        self.domains.iter().map(|d| d.record_count()).sum()
    }
}

/// Read synthkit.toml and every `--input` CSV.
///
/// A `[domains.NAME] subject_key` in the config overrides `--subject-key`
/// for that domain.
pub fn load_sources(input: &InputArgs) -> Result<Sources> {
    let config = read_config(&input.config)?;
    if let Some(dir) = config.as_ref().and_then(|c| c.config_dir.as_ref()) {
        tracing::info!("Using {}", dir.join(CONFIG_FILE_NAME).display());
    }

    let mut domains = Vec::with_capacity(input.input.len());
    for path in &input.input {
        let name = domain_name_from_path(path);
        let subject_key = config
            .as_ref()
            .and_then(|c| c.subject_key_for(&name))
            .unwrap_or(input.subject_key.as_str());
        let domain = read_csv_domain_path(path, subject_key)
            .with_context(|| format!("Failed to load domain from {}", path.display()))?;
        tracing::info!(
            "Loaded {} from {}: {} records, {} variables",
            domain.name,
            path.display(),
            domain.record_count(),
            domain.columns.len()
        );
        domains.push(domain);
    }

    Ok(Sources { config, domains })
}

pub fn spinner(prefix: &'static str, message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} [{prefix}] {msg}")?);
    pb.set_prefix(prefix);
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn input_args(dir: &std::path::Path, files: &[&str]) -> InputArgs {
        InputArgs {
            input: files.iter().map(|f| dir.join(f)).collect(),
            subject_key: "USUBJID".to_string(),
            config: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_load_sources_names_domains_after_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dm.csv"), "USUBJID,AGE\nS-1,40\nS-2,51\n").unwrap();
        fs::write(dir.path().join("lb.csv"), "USUBJID,GLUC\nS-1,99.5\n").unwrap();

        let sources = load_sources(&input_args(dir.path(), &["dm.csv", "lb.csv"])).unwrap();
        assert!(sources.config.is_none());
        let names: Vec<&str> = sources.domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["DM", "LB"]);
        assert_eq!(sources.record_count(), 3);
    }

    #[test]
    fn test_config_overrides_subject_key_and_options() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("da.csv"), "KITID,DAQTY\nK-1,10\n").unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[generate]\nseed = 9\n\n[domains.DA]\nsubject_key = \"KITID\"\n",
        )
        .unwrap();

        let sources = load_sources(&input_args(dir.path(), &["da.csv"])).unwrap();
        assert_eq!(sources.domains[0].subject_key, "KITID");
        assert_eq!(sources.options().unwrap().seed, Some(9));
    }

    #[test]
    fn test_config_variable_constraints_reach_options() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dm.csv"), "USUBJID,AGE\nS-1,40\nS-2,51\n").unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[variables.DM.AGE]\nmin = 18\nmax = 65\n",
        )
        .unwrap();

        let sources = load_sources(&input_args(dir.path(), &["dm.csv"])).unwrap();
        let options = sources.options().unwrap();
        let age = &options.constraints["DM"]["AGE"];
        assert_eq!(age.max, Some(synthkit_core::Value::Number(65.0)));
    }

    #[test]
    fn test_missing_input_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = InputArgs {
            input: vec![dir.path().join("absent.csv")],
            subject_key: "USUBJID".to_string(),
            config: dir.path().to_path_buf(),
        };
        let err = load_sources(&args).err().unwrap();
        assert!(format!("{:#}", err).contains("absent.csv"));
    }
}
