use chrono::{Duration, NaiveDate};
use indexmap::IndexMap;

use synthkit_core::schema::types::{Row, SourceDomain};
use synthkit_core::schema::value::Value;

/// Source ages of the 20 demographics subjects.
pub const AGES: [u32; 20] = [
    45, 52, 38, 61, 47, 55, 42, 68, 35, 50, 58, 44, 63, 39, 49, 56, 41, 66, 53, 46,
];

/// Fasting glucose per subject; Pearson r with `AGES` is about 0.63.
pub const GLUCOSE: [f64; 20] = [
    110.5, 99.4, 100.6, 101.7, 108.9, 105.5, 110.4, 112.6, 86.5, 114.0, 100.6, 101.8, 121.1,
    92.3, 103.3, 120.2, 88.7, 118.2, 103.1, 110.2,
];

const SITES: [&str; 3] = ["LON-01", "NYC-02", "BER-03"];
const INITIALS: [&str; 20] = [
    "ABK", "JMR", "TLS", "PQW", "HNE", "CDF", "RGT", "MMA", "SOL", "VBN", "KJH", "EWR", "YUI",
    "ZXC", "QAS", "LKJ", "POI", "NBV", "GFD", "XSW",
];

pub fn subject_id(i: usize) -> String {
    format!("CDISC01-{:03}", i + 1)
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Demographics: 20 subjects, one row each.
///
/// `COMMENT` is blank throughout, `SITEID` and `INITIALS` are identifiers.
pub fn demographics() -> SourceDomain {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    let records: Vec<Vec<String>> = (0..20)
        .map(|i| {
            vec![
                subject_id(i),
                SITES[i % SITES.len()].to_string(),
                INITIALS[i].to_string(),
                AGES[i].to_string(),
                if i % 5 < 2 { "F" } else { "M" }.to_string(),
                (start + Duration::days(7 * i as i64)).format("%Y-%m-%d").to_string(),
                String::new(),
            ]
        })
        .collect();
    SourceDomain::from_records(
        "DM",
        "USUBJID",
        columns(&["USUBJID", "SITEID", "INITIALS", "AGE", "SEX", "RFSTDTC", "COMMENT"]),
        records,
    )
}

/// Demographics with zero-padded site codes "01".."20", one subject per
/// site. At ingestion "01".."09" stay text while "10".."20" parse as
/// numbers.
pub fn numbered_sites() -> SourceDomain {
    let records: Vec<Vec<String>> = (0..20)
        .map(|i| {
            vec![
                subject_id(i),
                format!("{:02}", i + 1),
                AGES[i].to_string(),
            ]
        })
        .collect();
    SourceDomain::from_records(
        "DM",
        "USUBJID",
        columns(&["USUBJID", "SITEID", "AGE"]),
        records,
    )
}

/// Labs: one glucose result per demographics subject.
pub fn labs() -> SourceDomain {
    let records: Vec<Vec<String>> = (0..20)
        .map(|i| vec![subject_id(i), "GLUC".to_string(), GLUCOSE[i].to_string()])
        .collect();
    SourceDomain::from_records(
        "LB",
        "USUBJID",
        columns(&["USUBJID", "LBTESTCD", "GLUCOSE"]),
        records,
    )
}

/// Vital signs: repeated measures, 0 to 3 visits per subject, one week
/// apart.
pub fn vitals() -> SourceDomain {
    let mut domain = SourceDomain::new(
        "VS",
        "USUBJID",
        columns(&["USUBJID", "VISITNUM", "VSDTC", "SYSBP"]),
    );
    let start = NaiveDate::from_ymd_opt(2021, 2, 1).unwrap();
    for i in 0..20 {
        let visits = i % 4;
        for v in 0..visits {
            let date = start + Duration::days(i as i64 + 7 * v as i64);
            domain.push_row(row(&[
                ("USUBJID", Value::Text(subject_id(i))),
                ("VISITNUM", Value::Number((v + 1) as f64)),
                ("VSDTC", Value::Date(date)),
                ("SYSBP", Value::Number((118 + (i * 3 + v * 5) % 25) as f64)),
            ]));
        }
    }
    domain
}

/// Drug accountability keyed by kit number: shares no subject key with
/// the other fixtures.
pub fn kit_inventory() -> SourceDomain {
    let records: Vec<Vec<String>> = (0..12)
        .map(|i| {
            vec![
                format!("KIT-{:04}", 1000 + i * 7),
                (10 + (i * 3) % 8).to_string(),
                if i % 3 == 0 { "RETURNED" } else { "DISPENSED" }.to_string(),
            ]
        })
        .collect();
    SourceDomain::from_records(
        "DA",
        "KITID",
        columns(&["KITID", "DAQTY", "DASTAT"]),
        records,
    )
}

/// Build a row from (column, value) pairs.
pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect::<IndexMap<_, _>>()
}

/// Render a domain back to CSV text, header first.
pub fn to_csv(domain: &SourceDomain) -> String {
    let mut out = domain.columns.join(",");
    out.push('\n');
    for r in &domain.rows {
        let cells: Vec<String> = domain
            .columns
            .iter()
            .map(|c| r.get(c).map(Value::to_csv_string).unwrap_or_default())
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}
