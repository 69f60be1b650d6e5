use std::io::Write;

use indexmap::IndexMap;

use crate::error::{Result, SynthKitError};
use crate::schema::types::{Row, SourceDomain};
use crate::schema::value::Value;

/// Write one synthetic table as CSV. The header comes from `columns`, so
/// an empty table still carries its schema.
pub fn write_csv_table<W: Write>(
    writer: W,
    table_name: &str,
    columns: &[String],
    rows: &[Row],
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(columns)
        .map_err(|e| csv_error(format!("writing CSV columns for {}", table_name), e))?;

    for row in rows {
        let record = columns
            .iter()
            .map(|col| row.get(col).map(Value::to_csv_string).unwrap_or_default());
        csv_writer
            .write_record(record)
            .map_err(|e| csv_error(format!("writing CSV row for {}", table_name), e))?;
    }

    csv_writer.flush().map_err(|e| SynthKitError::Output {
        message: format!("flushing CSV for {}", table_name),
        source: e,
    })
}

/// Write every table to one stream, each section under a `# Table:` line.
pub fn write_csv<W: Write>(
    writer: &mut W,
    tables: &IndexMap<String, Vec<Row>>,
    domains: &[SourceDomain],
) -> Result<()> {
    for domain in domains {
        let rows = tables.get(&domain.name).map(Vec::as_slice).unwrap_or(&[]);
        writeln!(writer, "# Table: {}", domain.name).map_err(|e| SynthKitError::Output {
            message: format!("writing CSV header for {}", domain.name),
            source: e,
        })?;
        write_csv_table(&mut *writer, &domain.name, &domain.columns, rows)?;
        writeln!(writer).map_err(|e| SynthKitError::Output {
            message: "writing newline".to_string(),
            source: e,
        })?;
    }
    Ok(())
}

fn csv_error(message: String, e: csv::Error) -> SynthKitError {
    let source = match e.into_kind() {
        csv::ErrorKind::Io(io) => io,
        other => std::io::Error::other(format!("{:?}", other)),
    };
    SynthKitError::Output { message, source }
}
