//! Benchmarks for profiling and relationship detection.
//!
//! Sources are built by repeating the fixture subjects under fresh keys,
//! so row counts scale while the value distributions stay fixed.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use synthkit_core::graph::detect::{detect_relationships, DetectionOptions};
use synthkit_core::profile::{profile_domain, ProfileOptions};
use synthkit_core::schema::types::SourceDomain;
use synthkit_core::Value;
use synthkit_testutil::{demographics, labs};

/// Repeat every row of `domain` `times` times, suffixing the subject key.
fn scaled(domain: &SourceDomain, times: usize) -> SourceDomain {
    let mut out = SourceDomain::new(
        domain.name.clone(),
        domain.subject_key.clone(),
        domain.columns.clone(),
    );
    for t in 0..times {
        for row in &domain.rows {
            let mut row = row.clone();
            if let Some(key) = row.get(&domain.subject_key).map(Value::to_csv_string) {
                row.insert(
                    domain.subject_key.clone(),
                    Value::Text(format!("{}-{}", key, t)),
                );
            }
            out.push_row(row);
        }
    }
    out
}

fn bench_profile_domain(c: &mut Criterion) {
    let mut group = c.benchmark_group("profile/domain");
    let options = ProfileOptions::default();
    let base = demographics();

    for times in [10usize, 100, 500] {
        let domain = scaled(&base, times);
        group.throughput(Throughput::Elements(domain.record_count() as u64));
        group.bench_with_input(
            BenchmarkId::new("rows", domain.record_count()),
            &domain,
            |b, d| {
                b.iter(|| profile_domain(d, &options));
            },
        );
    }
    group.finish();
}

fn bench_detect_relationships(c: &mut Criterion) {
    let mut group = c.benchmark_group("profile/relationships");
    let options = ProfileOptions::default();
    let detection = DetectionOptions::default();

    for times in [10usize, 100] {
        let domains = vec![scaled(&demographics(), times), scaled(&labs(), times)];
        let profiles: Vec<_> = domains.iter().map(|d| profile_domain(d, &options)).collect();

        group.throughput(Throughput::Elements((20 * times) as u64));
        group.bench_with_input(BenchmarkId::new("subjects", 20 * times), &times, |b, _| {
            b.iter(|| detect_relationships(&domains, &profiles, &detection));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_profile_domain, bench_detect_relationships);
criterion_main!(benches);
