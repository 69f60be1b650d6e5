use std::io::Write;

use indexmap::IndexMap;

use crate::error::{Result, SynthKitError};
use crate::quality::QualityReport;
use crate::schema::types::Row;
use crate::schema::value::Value;

/// Write synthetic tables as one JSON object, streaming row by row.
///
/// `{"DM": [{"USUBJID": "SYN-001", ...}, ...], "LB": [...]}`
pub fn write_json<W: Write>(writer: &mut W, tables: &IndexMap<String, Vec<Row>>) -> Result<()> {
    write_str(writer, "{\n")?;

    for (table_idx, (table_name, rows)) in tables.iter().enumerate() {
        write_str(writer, &format!("  {}: [", json_key(table_name)?))?;

        for (row_idx, row) in rows.iter().enumerate() {
            write_str(writer, if row_idx == 0 { "\n    {" } else { ",\n    {" })?;
            for (col_idx, (col_name, value)) in row.iter().enumerate() {
                if col_idx > 0 {
                    write_str(writer, ",")?;
                }
                write_str(
                    writer,
                    &format!("\n      {}: {}", json_key(col_name)?, json_value(value)?),
                )?;
            }
            write_str(writer, "\n    }")?;
        }

        write_str(writer, if rows.is_empty() { "]" } else { "\n  ]" })?;
        if table_idx + 1 < tables.len() {
            write_str(writer, ",")?;
        }
        write_str(writer, "\n")?;
    }

    write_str(writer, "}\n")
}

/// Write the quality report as pretty-printed JSON.
pub fn write_report<W: Write>(writer: &mut W, report: &QualityReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)
        .map_err(|e| SynthKitError::Other(format!("JSON serialization error: {}", e)))?;
    write_str(writer, "\n")
}

/// Helper to write a string slice and map IO errors.
fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    writer
        .write_all(s.as_bytes())
        .map_err(|e| SynthKitError::Output {
            message: "writing JSON".to_string(),
            source: e,
        })
}

/// RFC 8259 key escaping through serde_json.
fn json_key(s: &str) -> Result<String> {
    serde_json::to_string(s).map_err(|e| SynthKitError::Other(format!("JSON key error: {}", e)))
}

fn json_value(value: &Value) -> Result<String> {
    serde_json::to_string(&value_to_json(value))
        .map_err(|e| SynthKitError::Other(format!("JSON serialization error: {}", e)))
}

/// Integral numbers become JSON integers, dates ISO 8601 strings.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Missing => serde_json::Value::Null,
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => serde_json::json!(*n as i64),
        Value::Number(n) => serde_json::json!(*n),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
    }
}
