use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::value::Value;

/// One row of a domain: variable name to tagged value, in column order.
pub type Row = IndexMap<String, Value>;

/// Inferred data type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Numeric,
    Categorical,
    Text,
    Date,
    Identifier,
}

impl DataType {
    /// Whether the type carries a statistical profile.
    pub fn is_statistical(&self) -> bool {
        !matches!(self, DataType::Identifier)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Numeric => write!(f, "NUMERIC"),
            DataType::Categorical => write!(f, "CATEGORICAL"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Date => write!(f, "DATE"),
            DataType::Identifier => write!(f, "IDENTIFIER"),
        }
    }
}

/// A named clinical data table as ingested from a source file.
///
/// Immutable once handed to the profiler. Re-ingesting a file produces a
/// new `SourceDomain` rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDomain {
    pub name: String,
    /// Column identifying which rows belong to the same subject.
    pub subject_key: String,
    /// Variable names in declaration order.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl SourceDomain {
    pub fn new(name: impl Into<String>, subject_key: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subject_key: subject_key.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a domain from raw string records, parsing every cell.
    ///
    /// Short records are padded with missing values; extra cells are ignored.
    pub fn from_records<I, R, S>(
        name: impl Into<String>,
        subject_key: impl Into<String>,
        columns: Vec<String>,
        records: I,
    ) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut domain = Self::new(name, subject_key, columns);
        for record in records {
            let mut cells = record.into_iter();
            let row: Row = domain
                .columns
                .iter()
                .map(|col| {
                    let value = cells
                        .next()
                        .map(|c| Value::parse_cell(c.as_ref()))
                        .unwrap_or(Value::Missing);
                    (col.clone(), value)
                })
                .collect();
            domain.rows.push(row);
        }
        domain
    }

    /// Append an already-typed row. Columns absent from `row` become missing.
    pub fn push_row(&mut self, mut row: Row) {
        let ordered: Row = self
            .columns
            .iter()
            .map(|col| (col.clone(), row.shift_remove(col).unwrap_or(Value::Missing)))
            .collect();
        self.rows.push(ordered);
    }

    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Vec<&Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).unwrap_or(&Value::Missing))
            .collect()
    }

    /// Row indices grouped by subject key, in first-seen order.
    ///
    /// Rows whose key is missing belong to no subject and are left out.
    pub fn subject_rows(&self) -> IndexMap<String, Vec<usize>> {
        let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (idx, row) in self.rows.iter().enumerate() {
            match row.get(&self.subject_key) {
                Some(key) if !key.is_missing() => {
                    groups.entry(key.to_csv_string()).or_default().push(idx);
                }
                _ => {}
            }
        }
        groups
    }
}
