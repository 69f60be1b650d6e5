use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Date layouts recognized at ingestion, tried in order.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%d%b%Y", "%d-%b-%Y", "%m/%d/%Y"];

/// Cell contents treated as a missing marker (compared case-insensitively).
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "null", ".", "nan"];

/// A tagged cell value.
///
/// Decided once when a raw cell is ingested; every downstream component
/// works on this representation and never re-parses strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Missing,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// Parse one raw cell.
    ///
    /// Numbers with a leading zero ("007") stay text so zero-padded codes
    /// survive a round trip.
    pub fn parse_cell(raw: &str) -> Value {
        let trimmed = raw.trim();
        if MISSING_MARKERS
            .iter()
            .any(|m| trimmed.eq_ignore_ascii_case(m))
        {
            return Value::Missing;
        }

        // Compact dates (20210315) look numeric; a plausible calendar date wins.
        if let Some(d) = parse_compact_date(trimmed) {
            return Value::Date(d);
        }

        if let Some(n) = parse_number(trimmed) {
            return Value::Number(n);
        }

        if let Some(d) = parse_date(trimmed) {
            return Value::Date(d);
        }

        Value::Text(trimmed.to_string())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a CSV-friendly string. Missing becomes the empty cell.
    pub fn to_csv_string(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// String key used for category lookup and leak checks.
    ///
    /// Distinct variants never share a key, so the text "45" and the
    /// number 45 stay separate categories.
    pub fn to_unique_key(&self) -> String {
        match self {
            Value::Missing => "__MISSING__".to_string(),
            Value::Number(n) => format!("n:{}", format_number(*n)),
            Value::Text(s) => format!("t:{}", s),
            Value::Date(d) => format!("d:{}", d.format("%Y-%m-%d")),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Missing => write!(f, "<missing>"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let digits = s.trim_start_matches(['-', '+']);
    let leading_zero = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
    if leading_zero {
        return None;
    }
    // Reject things like "inf" or "nan" that f64::from_str accepts.
    if !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .ok()
        .filter(|d| (1900..=2100).contains(&d.year()))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // ISO 8601 datetimes keep only their date part.
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Shortest round-trip formatting, with integral values printed without
/// a fractional part.
fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
