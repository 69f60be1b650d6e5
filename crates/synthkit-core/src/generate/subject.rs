use std::collections::HashMap;

use indexmap::IndexMap;
use rand::Rng;

use crate::error::{Result, SynthKitError};
use crate::generate::anonymize::{KeyIssuer, PiiAnonymizer};
use crate::generate::constraint::ConstraintMap;
use crate::generate::sampler::{Conditioning, SubjectValueSampler};
use crate::graph::order::SamplingOrder;
use crate::graph::relationships::{RelationshipDetail, RelationshipGraph};
use crate::profile::domain::DomainProfile;
use crate::schema::types::{Row, SourceDomain};
use crate::schema::value::Value;

/// One generated individual: a synthetic key plus that subject's rows in
/// every domain of its linkage component.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSubject {
    /// 0-based position within the component.
    pub index: usize,
    pub component: usize,
    pub key: String,
    /// Domain name to rows, in column order. Domains where the subject has
    /// no rows map to an empty list.
    pub rows: IndexMap<String, Vec<Row>>,
}

impl SyntheticSubject {
    pub fn row_count(&self) -> usize {
        self.rows.values().map(|r| r.len()).sum()
    }
}

/// Domains linked by KEY_LINKAGE plus their observed joint rows-per-subject
/// vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPlan {
    /// Domain indices, in input order.
    pub domains: Vec<usize>,
    /// One entry per real subject: its row count in each of `domains`.
    pub row_counts: Vec<Vec<usize>>,
}

impl ComponentPlan {
    pub fn new(domains: &[SourceDomain], members: Vec<usize>) -> Self {
        let mut by_key: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (pos, &d) in members.iter().enumerate() {
            for (key, rows) in domains[d].subject_rows() {
                by_key.entry(key).or_insert_with(|| vec![0; members.len()])[pos] = rows.len();
            }
        }
        Self {
            domains: members,
            row_counts: by_key.into_values().collect(),
        }
    }

    pub fn contains(&self, domain: usize) -> bool {
        self.domains.contains(&domain)
    }

    fn draw_row_counts(&self, rng: &mut impl Rng) -> Option<&[usize]> {
        if self.row_counts.is_empty() {
            return None;
        }
        Some(&self.row_counts[rng.random_range(0..self.row_counts.len())])
    }
}

/// Generates complete synthetic subjects from immutable, shared analysis
/// results.
pub struct SubjectGenerator<'a> {
    pub domains: &'a [SourceDomain],
    pub profiles: &'a [DomainProfile],
    pub relationships: &'a RelationshipGraph,
    pub order: &'a SamplingOrder,
    pub sampler: SubjectValueSampler,
    pub anonymizer: &'a PiiAnonymizer,
    pub keys: &'a KeyIssuer,
    pub components: &'a [ComponentPlan],
    pub constraints: &'a ConstraintMap,
}

impl SubjectGenerator<'_> {
    fn domain_index(&self, name: &str) -> Option<usize> {
        self.profiles.iter().position(|p| p.name == name)
    }

    /// Generate subject `index` of linkage component `component`.
    ///
    /// Statistical variables are sampled in planned order, each conditioned
    /// on its dependency's value in the aligned row; identifier variables
    /// are substituted afterwards, and the subject key is issued last so a
    /// failed attempt never consumes one.
    pub fn generate(
        &self,
        component: usize,
        index: usize,
        rng: &mut impl Rng,
    ) -> Result<SyntheticSubject> {
        let plan = self.components.get(component).ok_or_else(|| {
            SynthKitError::Other(format!("unknown linkage component {}", component))
        })?;
        let counts = plan.draw_row_counts(rng).ok_or_else(|| SynthKitError::Sampling {
            domain: self.profiles[plan.domains[0]].name.clone(),
            variable: self.profiles[plan.domains[0]].subject_key.clone(),
            message: "no source subject to draw a row count from".to_string(),
        })?;
        let mut row_count: HashMap<usize, usize> = HashMap::new();
        for (pos, &d) in plan.domains.iter().enumerate() {
            row_count.insert(d, counts[pos]);
        }

        let mut sampled: HashMap<usize, Vec<Row>> = plan
            .domains
            .iter()
            .map(|&d| (d, vec![Row::new(); row_count[&d]]))
            .collect();

        for node in &self.order.variables {
            let Some(d) = self.domain_index(&node.domain) else {
                continue;
            };
            if !plan.contains(d) {
                continue;
            }
            let profile = self.profiles[d].get_variable(&node.variable)?;
            if profile.is_identifier() {
                continue;
            }

            let edge = self
                .order
                .conditioning_for(node)
                .map(|e| &self.relationships.graph[e]);

            for r in 0..row_count[&d] {
                // Value of the conditioning source in the aligned row.
                let source = edge.and_then(|rel| {
                    let sd = self.domain_index(&rel.source.domain)?;
                    let rows = sampled.get(&sd)?;
                    let row = rows.get(r.min(rows.len().checked_sub(1)?))?;
                    row.get(&rel.source.variable).cloned()
                });

                let conditioning = match (edge, &source) {
                    (Some(rel), Some(value)) => conditioning_from(&rel.detail, rel.strength, value),
                    _ => Conditioning::None,
                };
                let constraint = self
                    .constraints
                    .get(&node.domain)
                    .and_then(|c| c.get(&node.variable));
                let value = self.sampler.sample_constrained(
                    &node.domain,
                    profile,
                    conditioning,
                    constraint,
                    rng,
                )?;
                if let Some(rows) = sampled.get_mut(&d) {
                    rows[r].insert(node.variable.clone(), value);
                }
            }
        }

        // Identifier substitutes: one per variable name for the whole subject,
        // repeated on every row and in every domain that carries it.
        let mut substitutes: HashMap<String, Value> = HashMap::new();
        for &d in &plan.domains {
            let profile = &self.profiles[d];
            for variable in profile.variables.values() {
                let Some(stats) = variable.identifier() else {
                    continue;
                };
                if variable.name == profile.subject_key || substitutes.contains_key(&variable.name) {
                    continue;
                }
                let value = if variable.missing_rate > 0.0
                    && rng.random_bool(variable.missing_rate.clamp(0.0, 1.0))
                {
                    Value::Missing
                } else {
                    self.anonymizer.substitute(&variable.name, stats, rng)?
                };
                substitutes.insert(variable.name.clone(), value);
            }
        }

        let key_component = if self.components.len() > 1 {
            Some(component)
        } else {
            None
        };
        let key = self.keys.issue(key_component, index + 1);

        let mut rows = IndexMap::new();
        for &d in &plan.domains {
            let domain = &self.domains[d];
            let domain_rows = sampled.remove(&d).unwrap_or_default();
            let assembled: Vec<Row> = domain_rows
                .into_iter()
                .map(|mut values| {
                    domain
                        .columns
                        .iter()
                        .map(|column| {
                            let value = if *column == domain.subject_key {
                                Value::Text(key.clone())
                            } else if let Some(sub) = substitutes.get(column) {
                                sub.clone()
                            } else {
                                values.swap_remove(column).unwrap_or(Value::Missing)
                            };
                            (column.clone(), value)
                        })
                        .collect()
                })
                .collect();
            rows.insert(domain.name.clone(), assembled);
        }

        Ok(SyntheticSubject {
            index,
            component,
            key,
            rows,
        })
    }
}

fn conditioning_from<'a>(
    detail: &'a RelationshipDetail,
    strength: f64,
    source: &'a Value,
) -> Conditioning<'a> {
    match detail {
        RelationshipDetail::Correlation {
            coefficient,
            source_mean,
            source_std,
            target_mean,
            target_std,
            ..
        } => match source.as_number() {
            Some(value) => Conditioning::Correlated {
                value,
                coefficient: *coefficient,
                source_mean: *source_mean,
                source_std: *source_std,
                target_mean: *target_mean,
                target_std: *target_std,
            },
            None => Conditioning::None,
        },
        RelationshipDetail::Dependence { conditional, .. } if !source.is_missing() => {
            Conditioning::Categorical {
                source,
                table: conditional,
            }
        }
        RelationshipDetail::Temporal { offsets, .. } => match source.as_date() {
            Some(anchor) => Conditioning::Anchored {
                anchor,
                offsets,
                strength,
            },
            None => Conditioning::None,
        },
        _ => Conditioning::None,
    }
}
