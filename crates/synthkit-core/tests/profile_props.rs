//! Property tests for the profiler and cell parsing.

use proptest::prelude::*;

use synthkit_core::profile::{profile_domain, profile_variable, ProfileOptions, ProfileStats};
use synthkit_core::{SourceDomain, Value};

fn cell() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("NA".to_string()),
        (0u32..200).prop_map(|n| n.to_string()),
        (-500.0f64..500.0).prop_map(|x| format!("{:.2}", x)),
        prop::sample::select(vec!["M", "F", "U"]).prop_map(str::to_string),
        (2000i32..2024, 1u32..13, 1u32..29).prop_map(|(y, m, d)| format!("{:04}-{:02}-{:02}", y, m, d)),
        "[A-Za-z ]{1,12}",
    ]
}

proptest! {
    #[test]
    fn prop_missing_rate_in_unit_range(cells in prop::collection::vec(cell(), 0..60)) {
        let values: Vec<Value> = cells.iter().map(|c| Value::parse_cell(c)).collect();
        let refs: Vec<&Value> = values.iter().collect();
        let profile = profile_variable("X", &refs, false, &ProfileOptions::default());

        prop_assert!((0.0..=1.0).contains(&profile.missing_rate));
        prop_assert_eq!(profile.record_count, cells.len());
        prop_assert!(profile.missing_count <= profile.record_count);
    }

    #[test]
    fn prop_frequency_counts_sum_to_observed(cells in prop::collection::vec(cell(), 1..60)) {
        let values: Vec<Value> = cells.iter().map(|c| Value::parse_cell(c)).collect();
        let refs: Vec<&Value> = values.iter().collect();
        let profile = profile_variable("X", &refs, false, &ProfileOptions::default());

        if let ProfileStats::Frequencies(table) = &profile.stats {
            let sum: usize = table.entries().map(|e| e.count).sum();
            prop_assert_eq!(sum, table.total());
            prop_assert_eq!(sum, profile.record_count - profile.missing_count);
        }
    }

    #[test]
    fn prop_numeric_profile_bounds(xs in prop::collection::vec(-1e6f64..1e6, 1..80)) {
        let values: Vec<Value> = xs.iter().map(|&x| Value::Number(x)).collect();
        let refs: Vec<&Value> = values.iter().collect();
        let profile = profile_variable("X", &refs, false, &ProfileOptions::default());

        let stats = profile.numeric().expect("numeric column");
        prop_assert!(stats.min <= stats.mean + 1e-6 && stats.mean <= stats.max + 1e-6);
        prop_assert!(stats.std_dev >= 0.0);
        prop_assert_eq!(stats.histogram.total(), xs.len());
    }

    #[test]
    fn prop_domain_profiling_never_panics(
        rows in prop::collection::vec((0u8..10, cell(), cell()), 0..40)
    ) {
        let records: Vec<Vec<String>> = rows
            .iter()
            .map(|(k, a, b)| vec![format!("S-{}", k), a.clone(), b.clone()])
            .collect();
        let domain = SourceDomain::from_records(
            "DM",
            "USUBJID",
            vec!["USUBJID".into(), "A".into(), "B".into()],
            records,
        );
        let profile = profile_domain(&domain, &ProfileOptions::default());
        prop_assert_eq!(profile.record_count, rows.len());
        prop_assert_eq!(profile.variables.len(), 3);
        prop_assert_eq!(
            profile.rows_per_subject.iter().map(|(n, c)| n * c).sum::<usize>(),
            rows.len()
        );
    }
}
