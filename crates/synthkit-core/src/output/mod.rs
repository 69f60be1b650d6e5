//! # Output Writers
//!
//! Synthetic tables go out as one CSV per domain or a single JSON document;
//! the quality report always goes to `quality_report.json`. Every file is
//! written to a temporary sibling and renamed into place.

pub mod csv;
pub mod json;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthKitError};
use crate::generate::orchestrator::GenerationOutput;
use crate::schema::types::SourceDomain;

pub const QUALITY_REPORT_FILE: &str = "quality_report.json";
pub const JSON_TABLES_FILE: &str = "synthetic.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Write `output` into `dir`, returning the files written in order.
pub fn write_output(
    dir: &Path,
    format: OutputFormat,
    output: &GenerationOutput,
    domains: &[SourceDomain],
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| SynthKitError::Output {
        message: format!("Failed to create output directory {}", dir.display()),
        source: e,
    })?;

    let mut written = Vec::new();
    match format {
        OutputFormat::Csv => {
            for domain in domains {
                let rows = output
                    .tables
                    .get(&domain.name)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let mut buf = Vec::new();
                self::csv::write_csv_table(&mut buf, &domain.name, &domain.columns, rows)?;
                let path = dir.join(format!("{}.csv", domain.name));
                write_atomic(&path, &buf)?;
                written.push(path);
            }
        }
        OutputFormat::Json => {
            let mut buf = Vec::new();
            json::write_json(&mut buf, &output.tables)?;
            let path = dir.join(JSON_TABLES_FILE);
            write_atomic(&path, &buf)?;
            written.push(path);
        }
    }

    let mut buf = Vec::new();
    json::write_report(&mut buf, &output.report)?;
    let path = dir.join(QUALITY_REPORT_FILE);
    write_atomic(&path, &buf)?;
    written.push(path);

    tracing::info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}

/// Write `bytes` to `path` atomically.
///
/// Writes to a temporary file in the same directory, then renames it
/// into place, so an interrupted run never leaves a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    let mut file = fs::File::create(&tmp_path).map_err(|e| SynthKitError::Output {
        message: format!("Failed to create temp file at {}", tmp_path.display()),
        source: e,
    })?;
    file.write_all(bytes).map_err(|e| SynthKitError::Output {
        message: format!("Failed to write temp file at {}", tmp_path.display()),
        source: e,
    })?;
    file.sync_all().map_err(|e| SynthKitError::Output {
        message: format!("Failed to sync {} to disk", tmp_path.display()),
        source: e,
    })?;

    fs::rename(&tmp_path, path).map_err(|e| SynthKitError::Output {
        message: format!(
            "Failed to rename {} → {}",
            tmp_path.display(),
            path.display()
        ),
        source: e,
    })?;

    Ok(())
}
