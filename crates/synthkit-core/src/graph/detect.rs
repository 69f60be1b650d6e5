//! # RelationshipDetector
//!
//! Discovers dependencies between variables, within and across domains.
//! Rows of different domains are joined by subject key: row `r` of one
//! domain pairs with row `min(r, k-1)` of a subject's `k` rows in the
//! other, so repeated-measures domains align with single-row ones.
//!
//! Measures per type pair:
//!
//! | source × target          | relationship            | strength       |
//! |--------------------------|-------------------------|----------------|
//! | NUMERIC × NUMERIC        | CORRELATION             | \|Pearson r\|  |
//! | CATEGORICAL × CATEGORICAL| CATEGORICAL_DEPENDENCE  | Cramér's V     |
//! | NUMERIC × CATEGORICAL    | CATEGORICAL_DEPENDENCE  | eta            |
//! | DATE × DATE (same domain)| TEMPORAL_SEQUENCE       | consistency    |
//!
//! Linked domains sharing a visit column (`VISITNUM`, `VISIT`, `VISITDY`)
//! also get a structural VISIT_ALIGNMENT edge between those columns.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::graph::relationships::{
    ConditionalTable, DependenceMeasure, Relationship, RelationshipDetail, RelationshipGraph,
    RelationshipType, VariableRef,
};
use crate::profile::domain::DomainProfile;
use crate::profile::stats::{date_to_ordinal, mean_and_std, Histogram};
use crate::schema::types::{DataType, SourceDomain};
use crate::schema::value::Value;

/// Default relationship-strength threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// Visit schedule columns, in preference order.
pub const VISIT_VARIABLES: &[&str] = &["VISITNUM", "VISIT", "VISITDY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOptions {
    /// Statistical relationships are kept only when strength exceeds this.
    pub threshold: f64,
    /// Pairs with fewer joined observations are never related.
    pub min_paired_observations: usize,
    /// Minimum share of consistently ordered date pairs.
    pub temporal_consistency: f64,
    /// Bins for offset histograms.
    pub histogram_bins: usize,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_paired_observations: 5,
            temporal_consistency: 0.9,
            histogram_bins: crate::profile::DEFAULT_HISTOGRAM_BINS,
        }
    }
}

/// Groups of domains connected by KEY_LINKAGE, as domain indices.
///
/// Components are ordered by their first domain; domains within a
/// component keep input order.
pub fn linkage_components(profiles: &[DomainProfile]) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::<usize>::new(profiles.len());
    for i in 0..profiles.len() {
        for j in (i + 1)..profiles.len() {
            if profiles[i].subject_key == profiles[j].subject_key {
                uf.union(i, j);
            }
        }
    }

    let mut components: IndexMap<usize, Vec<usize>> = IndexMap::new();
    for i in 0..profiles.len() {
        components.entry(uf.find(i)).or_default().push(i);
    }
    components.into_values().collect()
}

/// A candidate variable for statistical detection.
struct Candidate<'a> {
    domain: usize,
    name: &'a str,
    data_type: DataType,
    component: usize,
}

/// Detect every relationship among the given domains.
///
/// `domains` and `profiles` must be parallel slices.
pub fn detect_relationships(
    domains: &[SourceDomain],
    profiles: &[DomainProfile],
    options: &DetectionOptions,
) -> RelationshipGraph {
    let mut graph = RelationshipGraph::new();

    for profile in profiles {
        for name in profile.variable_names() {
            graph.add_variable(VariableRef::new(&profile.name, name));
        }
    }

    let subject_rows: Vec<IndexMap<String, Vec<usize>>> =
        domains.iter().map(|d| d.subject_rows()).collect();

    // KEY_LINKAGE
    for i in 0..profiles.len() {
        for j in (i + 1)..profiles.len() {
            if profiles[i].subject_key != profiles[j].subject_key {
                continue;
            }
            let a: HashSet<&String> = subject_rows[i].keys().collect();
            let b: HashSet<&String> = subject_rows[j].keys().collect();
            let union = a.union(&b).count();
            let overlap = if union == 0 {
                0.0
            } else {
                a.intersection(&b).count() as f64 / union as f64
            };
            graph.add_relationship(Relationship {
                source: VariableRef::new(&profiles[i].name, &profiles[i].subject_key),
                target: VariableRef::new(&profiles[j].name, &profiles[j].subject_key),
                kind: RelationshipType::KeyLinkage,
                strength: 1.0,
                detail: RelationshipDetail::Linkage { overlap },
            });
            if let Some(rel) = visit_alignment(&domains[i], &domains[j]) {
                tracing::debug!(
                    "Detected {} {} -> {} (overlap {:.3})",
                    rel.kind,
                    rel.source,
                    rel.target,
                    rel.strength
                );
                graph.add_relationship(rel);
            }
        }
    }

    let components = linkage_components(profiles);
    let mut component_of = vec![0; profiles.len()];
    for (c, members) in components.iter().enumerate() {
        for &d in members {
            component_of[d] = c;
        }
    }

    let candidates: Vec<Candidate> = profiles
        .iter()
        .enumerate()
        .flat_map(|(d, profile)| {
            let component = component_of[d];
            profile
                .variables
                .values()
                .filter(|v| v.data_type.is_statistical() && !v.is_degraded())
                .map(move |v| Candidate {
                    domain: d,
                    name: v.name.as_str(),
                    data_type: v.data_type,
                    component,
                })
        })
        .collect();

    let detector = PairDetector {
        domains,
        profiles,
        subject_rows: &subject_rows,
        options,
    };

    for (i, a) in candidates.iter().enumerate() {
        for b in &candidates[i + 1..] {
            if a.component != b.component {
                continue;
            }
            if let Some(rel) = detector.detect_pair(a, b) {
                tracing::debug!(
                    "Detected {} {} -> {} (strength {:.3})",
                    rel.kind,
                    rel.source,
                    rel.target,
                    rel.strength
                );
                graph.add_relationship(rel);
            }
        }
    }

    tracing::info!(
        "Detected {} relationships across {} domains",
        graph.relationship_count(),
        profiles.len()
    );

    graph
}

/// VISIT_ALIGNMENT between two linked domains, anchored on the first
/// visit column both record. Strength is the overlap of its distinct
/// values.
fn visit_alignment(a: &SourceDomain, b: &SourceDomain) -> Option<Relationship> {
    let has = |d: &SourceDomain, name: &str| d.columns.iter().any(|c| c == name);
    let shared: Vec<String> = VISIT_VARIABLES
        .iter()
        .filter(|v| has(a, v) && has(b, v))
        .map(|v| v.to_string())
        .collect();
    let first = shared.first()?.clone();

    let distinct = |d: &SourceDomain| -> HashSet<String> {
        d.column_values(&first)
            .into_iter()
            .filter(|v| !v.is_missing())
            .map(|v| v.to_csv_string())
            .collect()
    };
    let (va, vb) = (distinct(a), distinct(b));
    let union = va.union(&vb).count();
    let overlap = if union == 0 {
        0.0
    } else {
        va.intersection(&vb).count() as f64 / union as f64
    };

    Some(Relationship {
        source: VariableRef::new(&a.name, &first),
        target: VariableRef::new(&b.name, &first),
        kind: RelationshipType::VisitAlignment,
        strength: overlap,
        detail: RelationshipDetail::Visit {
            variables: shared,
            overlap,
        },
    })
}

struct PairDetector<'a> {
    domains: &'a [SourceDomain],
    profiles: &'a [DomainProfile],
    subject_rows: &'a [IndexMap<String, Vec<usize>>],
    options: &'a DetectionOptions,
}

impl<'a> PairDetector<'a> {
    fn detect_pair(&self, a: &Candidate, b: &Candidate) -> Option<Relationship> {
        use DataType::*;
        match (a.data_type, b.data_type) {
            (Numeric, Numeric) => self.correlation(a, b),
            (Categorical, Categorical) => self.cramers_v(a, b),
            (Numeric, Categorical) => self.correlation_ratio(a, b),
            (Categorical, Numeric) => self.correlation_ratio(b, a),
            (Date, Date) if a.domain == b.domain => self.temporal(a, b),
            _ => None,
        }
    }

    /// Joined, both-present value pairs for two variables.
    fn paired_values(&self, a: &Candidate, b: &Candidate) -> Vec<(&'a Value, &'a Value)> {
        let domains = self.domains;
        let da = &domains[a.domain];
        let db = &domains[b.domain];
        let get = |domain: &'a SourceDomain, row: usize, name: &str| -> &'a Value {
            domain.rows[row].get(name).unwrap_or(&Value::Missing)
        };

        let mut pairs = Vec::new();
        if a.domain == b.domain {
            for row in 0..da.record_count() {
                let (va, vb) = (get(da, row, a.name), get(db, row, b.name));
                if !va.is_missing() && !vb.is_missing() {
                    pairs.push((va, vb));
                }
            }
            return pairs;
        }

        let subject_rows = self.subject_rows;
        let rows_b = &subject_rows[b.domain];
        for (key, rows_a) in &subject_rows[a.domain] {
            let Some(rows_b) = rows_b.get(key) else {
                continue;
            };
            let depth = rows_a.len().max(rows_b.len());
            for r in 0..depth {
                let ra = rows_a[r.min(rows_a.len() - 1)];
                let rb = rows_b[r.min(rows_b.len() - 1)];
                let (va, vb) = (get(da, ra, a.name), get(db, rb, b.name));
                if !va.is_missing() && !vb.is_missing() {
                    pairs.push((va, vb));
                }
            }
        }
        pairs
    }

    fn node(&self, c: &Candidate) -> VariableRef {
        VariableRef::new(&self.profiles[c.domain].name, c.name)
    }

    fn correlation(&self, a: &Candidate, b: &Candidate) -> Option<Relationship> {
        let pairs: Vec<(f64, f64)> = self
            .paired_values(a, b)
            .into_iter()
            .filter_map(|(x, y)| Some((x.as_number()?, y.as_number()?)))
            .collect();
        if pairs.len() < self.options.min_paired_observations {
            return None;
        }

        let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        let r = pearson(&xs, &ys);
        if r.abs() <= self.options.threshold {
            return None;
        }
        let (source_mean, source_std) = mean_and_std(&xs)?;
        let (target_mean, target_std) = mean_and_std(&ys)?;

        Some(Relationship {
            source: self.node(a),
            target: self.node(b),
            kind: RelationshipType::Correlation,
            strength: r.abs().min(1.0),
            detail: RelationshipDetail::Correlation {
                coefficient: r.clamp(-1.0, 1.0),
                source_mean,
                source_std,
                target_mean,
                target_std,
                paired: pairs.len(),
            },
        })
    }

    fn cramers_v(&self, a: &Candidate, b: &Candidate) -> Option<Relationship> {
        let pairs = self.paired_values(a, b);
        if pairs.len() < self.options.min_paired_observations {
            return None;
        }

        let v = cramers_v(&pairs);
        if v <= self.options.threshold {
            return None;
        }

        let mut conditional = ConditionalTable::new(None);
        for (x, y) in &pairs {
            conditional.record(x, y);
        }

        Some(Relationship {
            source: self.node(a),
            target: self.node(b),
            kind: RelationshipType::CategoricalDependence,
            strength: v.min(1.0),
            detail: RelationshipDetail::Dependence {
                measure: DependenceMeasure::CramersV,
                conditional,
                paired: pairs.len(),
            },
        })
    }

    /// `numeric` is always the source; the categorical target is
    /// conditioned on the numeric value's histogram bin.
    fn correlation_ratio(&self, numeric: &Candidate, categorical: &Candidate) -> Option<Relationship> {
        let pairs: Vec<(f64, &Value)> = self
            .paired_values(numeric, categorical)
            .into_iter()
            .filter_map(|(x, y)| Some((x.as_number()?, y)))
            .collect();
        if pairs.len() < self.options.min_paired_observations {
            return None;
        }

        let eta = correlation_ratio(&pairs);
        if eta <= self.options.threshold {
            return None;
        }

        let bins = self.profiles[numeric.domain]
            .variables
            .get(numeric.name)
            .and_then(|p| p.numeric())
            .map(|s| s.histogram.clone())?;
        let mut conditional = ConditionalTable::new(Some(bins));
        for (x, y) in &pairs {
            conditional.record(&Value::Number(*x), y);
        }

        Some(Relationship {
            source: self.node(numeric),
            target: self.node(categorical),
            kind: RelationshipType::CategoricalDependence,
            strength: eta.min(1.0),
            detail: RelationshipDetail::Dependence {
                measure: DependenceMeasure::CorrelationRatio,
                conditional,
                paired: pairs.len(),
            },
        })
    }

    fn temporal(&self, a: &Candidate, b: &Candidate) -> Option<Relationship> {
        let pairs: Vec<(f64, f64)> = self
            .paired_values(a, b)
            .into_iter()
            .filter_map(|(x, y)| Some((date_to_ordinal(x.as_date()?), date_to_ordinal(y.as_date()?))))
            .collect();
        if pairs.len() < self.options.min_paired_observations {
            return None;
        }

        let n = pairs.len() as f64;
        let forward = pairs.iter().filter(|(x, y)| y >= x).count() as f64 / n;
        let backward = pairs.iter().filter(|(x, y)| x >= y).count() as f64 / n;

        let (source, target, consistency, offsets): (&Candidate, &Candidate, f64, Vec<f64>) =
            if forward >= backward {
                (a, b, forward, pairs.iter().map(|(x, y)| y - x).collect())
            } else {
                (b, a, backward, pairs.iter().map(|(x, y)| x - y).collect())
            };

        if consistency < self.options.temporal_consistency {
            return None;
        }
        let offsets = Histogram::build(&offsets, self.options.histogram_bins)?;

        Some(Relationship {
            source: self.node(source),
            target: self.node(target),
            kind: RelationshipType::TemporalSequence,
            strength: consistency,
            detail: RelationshipDetail::Temporal {
                consistency,
                offsets,
                paired: pairs.len(),
            },
        })
    }
}

/// Pearson correlation. Zero variance on either side yields 0.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Cramér's V of a contingency table built from value pairs.
pub fn cramers_v(pairs: &[(&Value, &Value)]) -> f64 {
    let mut rows: IndexMap<String, usize> = IndexMap::new();
    let mut cols: IndexMap<String, usize> = IndexMap::new();
    let mut cells: HashMap<(usize, usize), f64> = HashMap::new();

    for (x, y) in pairs {
        let next_row = rows.len();
        let r = *rows.entry(x.to_unique_key()).or_insert(next_row);
        let next_col = cols.len();
        let c = *cols.entry(y.to_unique_key()).or_insert(next_col);
        *cells.entry((r, c)).or_insert(0.0) += 1.0;
    }

    let k = rows.len().min(cols.len());
    if k < 2 {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let mut row_totals = vec![0.0; rows.len()];
    let mut col_totals = vec![0.0; cols.len()];
    for (&(r, c), &count) in &cells {
        row_totals[r] += count;
        col_totals[c] += count;
    }

    let mut chi2 = 0.0;
    for (r, row_total) in row_totals.iter().enumerate() {
        for (c, col_total) in col_totals.iter().enumerate() {
            let expected = row_total * col_total / n;
            let observed = cells.get(&(r, c)).copied().unwrap_or(0.0);
            chi2 += (observed - expected).powi(2) / expected;
        }
    }

    (chi2 / (n * (k as f64 - 1.0))).sqrt()
}

/// Correlation ratio (eta) of numeric values grouped by category.
pub fn correlation_ratio(pairs: &[(f64, &Value)]) -> f64 {
    if pairs.len() < 2 {
        return 0.0;
    }
    let n = pairs.len() as f64;
    let mean = pairs.iter().map(|p| p.0).sum::<f64>() / n;

    let mut groups: IndexMap<String, (f64, usize)> = IndexMap::new();
    for (x, category) in pairs {
        let entry = groups.entry(category.to_unique_key()).or_insert((0.0, 0));
        entry.0 += x;
        entry.1 += 1;
    }
    if groups.len() < 2 {
        return 0.0;
    }

    let ss_total: f64 = pairs.iter().map(|p| (p.0 - mean).powi(2)).sum();
    if ss_total <= f64::EPSILON {
        return 0.0;
    }
    let ss_between: f64 = groups
        .values()
        .map(|(sum, count)| {
            let group_mean = sum / *count as f64;
            *count as f64 * (group_mean - mean).powi(2)
        })
        .sum();

    (ss_between / ss_total).sqrt()
}
