//! # GenerationOrchestrator
//!
//! Runs one generation job end to end:
//!
//! 1. validate the request (target count, domains, subject keys)
//! 2. profile every domain and detect relationships, through the
//!    [`AnalysisCache`]
//! 3. plan the sampling order and the linkage components
//! 4. fan subject generation out over a scoped worker pool
//! 5. re-assemble subjects in order, score fidelity, build the report
//!
//! Analysis happens on the calling thread; workers only read the finished
//! profiles and graph. The key issuer is the one shared mutable piece.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::{Result, SynthKitError};
use crate::generate::anonymize::{KeyIssuer, PiiAnonymizer};
use crate::generate::cache::{domain_hash, graph_hash, AnalysisCache};
use crate::generate::constraint::check_constraints;
use crate::generate::options::GenerateOptions;
use crate::generate::sampler::SubjectValueSampler;
use crate::generate::subject::{ComponentPlan, SubjectGenerator, SyntheticSubject};
use crate::graph::detect::{detect_relationships, linkage_components};
use crate::graph::order::plan_sampling_order;
use crate::graph::relationships::RelationshipGraph;
use crate::profile::domain::{profile_domain, DomainProfile};
use crate::quality::{mean, score_domain, QualityReport};
use crate::schema::types::{Row, SourceDomain};

/// Cooperative cancellation flag shared between the caller and workers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Optional hooks into a running generation.
#[derive(Clone, Copy, Default)]
pub struct RunControl<'a> {
    pub cancel: Option<&'a CancellationToken>,
    /// Called from workers with (completed, total) after each subject.
    pub progress: Option<&'a (dyn Fn(usize, usize) + Sync)>,
}

impl RunControl<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.is_cancelled())
    }
}

/// Profiles and relationship graph of one set of domains.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Parallel to the input domains.
    pub profiles: Vec<DomainProfile>,
    pub relationships: Arc<RelationshipGraph>,
}

/// Synthetic tables plus the quality report of one run.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Domain name to synthetic rows, domains in input order.
    pub tables: IndexMap<String, Vec<Row>>,
    pub report: QualityReport,
}

/// Result of one subject after all of its attempts.
enum SubjectOutcome {
    Generated {
        subject: SyntheticSubject,
        retries: usize,
    },
    Failed {
        component: usize,
        index: usize,
        retries: usize,
        message: String,
    },
}

impl SubjectOutcome {
    fn position(&self) -> (usize, usize) {
        match self {
            SubjectOutcome::Generated { subject, .. } => (subject.component, subject.index),
            SubjectOutcome::Failed {
                component, index, ..
            } => (*component, *index),
        }
    }
}

/// Owns the options and the analysis cache across runs.
#[derive(Debug)]
pub struct GenerationOrchestrator {
    options: GenerateOptions,
    cache: AnalysisCache,
}

impl GenerationOrchestrator {
    pub fn new(options: GenerateOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            cache: AnalysisCache::new(),
        })
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut AnalysisCache {
        &mut self.cache
    }

    /// Profile every domain and detect relationships, reusing cached
    /// results for unchanged content.
    pub fn analyze(&mut self, domains: &[SourceDomain]) -> Result<Analysis> {
        validate_domains(domains)?;

        let profile_options = self.options.profile_options();
        let mut hashes = Vec::with_capacity(domains.len());
        let mut profiles = Vec::with_capacity(domains.len());
        for domain in domains {
            let hash = domain_hash(domain, &profile_options);
            let profile = match self.cache.profile(&hash) {
                Some(cached) => {
                    debug!("Reusing cached profile for {}", domain.name);
                    cached
                }
                None => {
                    let fresh = Arc::new(profile_domain(domain, &profile_options));
                    self.cache.insert_profile(&hash, Arc::clone(&fresh));
                    fresh
                }
            };
            profiles.push(DomainProfile::clone(&profile));
            hashes.push(hash);
        }

        let detection = self.options.detection_options();
        let hash = graph_hash(&hashes, &detection);
        let relationships = match self.cache.graph(&hash) {
            Some(cached) => cached,
            None => {
                let fresh = Arc::new(detect_relationships(domains, &profiles, &detection));
                self.cache.insert_graph(&hash, Arc::clone(&fresh));
                fresh
            }
        };

        Ok(Analysis {
            profiles,
            relationships,
        })
    }

    /// Generate `target` synthetic subjects per linkage component.
    ///
    /// A subject whose attempts all fail is skipped and counted in the
    /// report. The run fails only if a required domain ends up with no
    /// subjects at all, and never when it was cancelled.
    pub fn generate(
        &mut self,
        domains: &[SourceDomain],
        target: i64,
        control: RunControl<'_>,
    ) -> Result<GenerationOutput> {
        let target = match usize::try_from(target) {
            Ok(n) if n >= 1 => n,
            _ => {
                return Err(SynthKitError::config(format!(
                    "target subject count must be at least 1, got {}",
                    target
                )))
            }
        };

        let analysis = self.analyze(domains)?;
        let options = &self.options;
        check_constraints(&options.constraints, &analysis.profiles)?;
        let seed = options.seed.unwrap_or_else(|| rand::rng().random());
        info!(
            "Generating {} subjects from {} domains (seed {}, {} mode)",
            target,
            domains.len(),
            seed,
            options.mode
        );

        let order = plan_sampling_order(&analysis.relationships, options.mode.uses_relationships());
        let components: Vec<ComponentPlan> = linkage_components(&analysis.profiles)
            .into_iter()
            .map(|members| ComponentPlan::new(domains, members))
            .collect();

        let real_keys: HashSet<String> = domains
            .iter()
            .flat_map(|d| d.subject_rows().into_keys())
            .collect();
        let keys = KeyIssuer::new(&options.key_prefix, target, real_keys);
        let anonymizer = PiiAnonymizer::new(domains, &analysis.profiles);
        let generator = SubjectGenerator {
            domains,
            profiles: &analysis.profiles,
            relationships: &analysis.relationships,
            order: &order,
            sampler: SubjectValueSampler::new(options.mode),
            anonymizer: &anonymizer,
            keys: &keys,
            components: &components,
            constraints: &options.constraints,
        };

        let tasks: Vec<(usize, usize)> = (0..components.len())
            .flat_map(|c| (0..target).map(move |i| (c, i)))
            .collect();
        let workers = options
            .workers
            .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .clamp(1, tasks.len().max(1));

        let mut outcomes = run_workers(&generator, &tasks, workers, seed, options.retry_count, control)?;
        outcomes.sort_by_key(|o| o.position());
        let cancelled = control.is_cancelled();

        // Assembly
        let mut tables: IndexMap<String, Vec<Row>> = domains
            .iter()
            .map(|d| (d.name.clone(), Vec::new()))
            .collect();
        let mut subjects_with_rows: Vec<usize> = vec![0; domains.len()];
        let mut generated_per_component = vec![0usize; components.len()];
        let mut failed = 0;
        let mut retries = 0;
        let mut warnings = Vec::new();

        for outcome in outcomes {
            match outcome {
                SubjectOutcome::Generated {
                    subject,
                    retries: r,
                } => {
                    retries += r;
                    generated_per_component[subject.component] += 1;
                    for (name, rows) in subject.rows {
                        if let Some(d) = domains.iter().position(|d| d.name == name) {
                            if !rows.is_empty() {
                                subjects_with_rows[d] += 1;
                            }
                        }
                        if let Some(table) = tables.get_mut(&name) {
                            table.extend(rows);
                        }
                    }
                }
                SubjectOutcome::Failed {
                    component,
                    index,
                    retries: r,
                    message,
                } => {
                    retries += r;
                    failed += 1;
                    warnings.push(format!(
                        "subject {} of component {} skipped: {}",
                        index + 1,
                        component + 1,
                        message
                    ));
                }
            }
        }

        let component_of = |d: usize| components.iter().position(|c| c.contains(d));
        if !cancelled {
            for (d, domain) in domains.iter().enumerate() {
                let generated = component_of(d).map(|c| generated_per_component[c]).unwrap_or(0);
                if generated == 0 && options.is_required(&domain.name) {
                    return Err(SynthKitError::ExhaustedGeneration {
                        domain: domain.name.clone(),
                        requested: target,
                    });
                }
            }
        }

        let mut degraded_variables = Vec::new();
        for profile in &analysis.profiles {
            for variable in profile.degraded_variables() {
                degraded_variables.push(format!("{}.{}", profile.name, variable));
                warnings.push(format!(
                    "{}.{} could not be profiled and is always missing",
                    profile.name, variable
                ));
            }
        }
        for edge in &order.dropped {
            warnings.push(format!(
                "dependency cycle broken by dropping {} -> {} (strength {:.2})",
                edge.source, edge.target, edge.strength
            ));
        }
        if cancelled {
            warnings.push("generation cancelled before completion".to_string());
        }

        let mut domain_quality = IndexMap::new();
        let mut leaked_values = 0;
        for (d, (domain, profile)) in domains.iter().zip(&analysis.profiles).enumerate() {
            let rows = tables.get(&domain.name).map(Vec::as_slice).unwrap_or(&[]);
            let generated = component_of(d).map(|c| generated_per_component[c]).unwrap_or(0);
            let quality = score_domain(
                profile,
                rows,
                target,
                generated,
                subjects_with_rows[d],
                |variable, value| {
                    if variable == domain.subject_key {
                        keys.is_real(&value.to_csv_string())
                    } else {
                        anonymizer.is_real(variable, value)
                    }
                },
            );
            leaked_values += quality.variables.values().map(|v| v.leaked).sum::<usize>();
            domain_quality.insert(domain.name.clone(), quality);
        }
        if leaked_values > 0 {
            warn!("{} synthetic identifier values equal real source values", leaked_values);
        }

        let overall_score = mean(domain_quality.values().map(|q| q.score));
        let generated_subjects: usize = generated_per_component.iter().sum();
        info!(
            "Generated {} subjects ({} failed, {} retries), quality {:.3}",
            generated_subjects, failed, retries, overall_score
        );

        let report = QualityReport {
            seed,
            mode: options.mode,
            requested_subjects: target,
            generated_subjects,
            failed_subjects: failed,
            retries,
            cancelled,
            overall_score,
            domains: domain_quality,
            dropped_edges: order.dropped.clone(),
            degraded_variables,
            leaked_values,
            warnings,
        };
        Ok(GenerationOutput { tables, report })
    }
}

/// Reject requests that cannot produce anything.
fn validate_domains(domains: &[SourceDomain]) -> Result<()> {
    if domains.is_empty() {
        return Err(SynthKitError::config("at least one domain is required"));
    }
    let mut names = HashSet::new();
    for domain in domains {
        if !names.insert(domain.name.as_str()) {
            return Err(SynthKitError::config(format!(
                "domain {} is supplied more than once",
                domain.name
            )));
        }
        if !domain.has_column(&domain.subject_key) {
            return Err(SynthKitError::config(format!(
                "domain {} has no subject-key column {}",
                domain.name, domain.subject_key
            )));
        }
        if domain.subject_rows().is_empty() {
            return Err(SynthKitError::config(format!(
                "domain {} has no rows with a subject key",
                domain.name
            )));
        }
    }
    Ok(())
}

fn run_workers(
    generator: &SubjectGenerator<'_>,
    tasks: &[(usize, usize)],
    workers: usize,
    seed: u64,
    retry_count: usize,
    control: RunControl<'_>,
) -> Result<Vec<SubjectOutcome>> {
    let next = &AtomicUsize::new(0);
    let completed = &AtomicUsize::new(0);
    let total = tasks.len();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut local = Vec::new();
                    loop {
                        if control.is_cancelled() {
                            break;
                        }
                        let t = next.fetch_add(1, Ordering::SeqCst);
                        let Some(&(component, index)) = tasks.get(t) else {
                            break;
                        };
                        local.push(generate_with_retry(
                            generator,
                            component,
                            index,
                            seed,
                            retry_count,
                        ));
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        if let Some(progress) = control.progress {
                            progress(done, total);
                        }
                    }
                    local
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(total);
        for handle in handles {
            match handle.join() {
                Ok(local) => outcomes.extend(local),
                Err(_) => return Err(SynthKitError::Other("generation worker panicked".to_string())),
            }
        }
        Ok(outcomes)
    })
}

fn generate_with_retry(
    generator: &SubjectGenerator<'_>,
    component: usize,
    index: usize,
    seed: u64,
    retry_count: usize,
) -> SubjectOutcome {
    let mut last_error = String::new();
    for attempt in 0..=retry_count {
        let mut rng = StdRng::seed_from_u64(subject_seed(seed, component, index, attempt));
        match generator.generate(component, index, &mut rng) {
            Ok(subject) => {
                return SubjectOutcome::Generated {
                    subject,
                    retries: attempt,
                }
            }
            Err(e) => {
                warn!(
                    "Subject {} of component {} failed on attempt {}: {}",
                    index + 1,
                    component + 1,
                    attempt + 1,
                    e
                );
                last_error = e.to_string();
            }
        }
    }
    SubjectOutcome::Failed {
        component,
        index,
        retries: retry_count,
        message: last_error,
    }
}

/// Seed of one subject attempt, independent of which worker runs it.
pub fn subject_seed(seed: u64, component: usize, index: usize, attempt: usize) -> u64 {
    let mut h = splitmix64(seed);
    for part in [component, index, attempt] {
        h = splitmix64(h ^ part as u64);
    }
    h
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
