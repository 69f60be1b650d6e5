//! CSV ingestion: turns a delimited file into a typed `SourceDomain`.

use std::io::Read;
use std::path::Path;

use crate::error::{Result, SynthKitError};
use crate::schema::types::SourceDomain;

/// Read a CSV domain from any reader. The first record is the header.
pub fn read_csv_domain<R: Read>(reader: R, name: &str, subject_key: &str) -> Result<SourceDomain> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .map_err(|e| SynthKitError::Input {
            path: name.to_string(),
            message: format!("reading header: {}", e),
        })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut records = Vec::new();
    for (idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| SynthKitError::Input {
            path: name.to_string(),
            message: format!("record {}: {}", idx + 1, e),
        })?;
        records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    Ok(SourceDomain::from_records(name, subject_key, headers, records))
}

/// Read a CSV domain from disk. The domain is named after the upper-cased
/// file stem (`dm.csv` becomes `DM`).
pub fn read_csv_domain_path(path: &Path, subject_key: &str) -> Result<SourceDomain> {
    let name = domain_name_from_path(path);
    let file = std::fs::File::open(path).map_err(|e| SynthKitError::Input {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    read_csv_domain(std::io::BufReader::new(file), &name, subject_key)
}

pub fn domain_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| "DOMAIN".to_string())
}
