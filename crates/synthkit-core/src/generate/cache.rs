//! Owned cache of analysis results.
//!
//! Entries are keyed by `(content hash, kind)`. A domain's hash covers its
//! name, subject key, columns, every cell and the profile options; the
//! relationship graph's hash covers every domain hash plus the detection
//! options. Changed input therefore hashes differently and simply never
//! hits a stale entry.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::graph::detect::DetectionOptions;
use crate::graph::relationships::RelationshipGraph;
use crate::profile::domain::DomainProfile;
use crate::profile::ProfileOptions;
use crate::schema::types::SourceDomain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    DomainProfile,
    RelationshipGraph,
}

#[derive(Debug, Clone)]
enum CachedAnalysis {
    Profile(Arc<DomainProfile>),
    Graph(Arc<RelationshipGraph>),
}

#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: HashMap<(String, AnalysisKind), CachedAnalysis>,
    hits: usize,
    misses: usize,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&mut self, hash: &str) -> Option<Arc<DomainProfile>> {
        let found = match self.entries.get(&(hash.to_string(), AnalysisKind::DomainProfile)) {
            Some(CachedAnalysis::Profile(p)) => Some(Arc::clone(p)),
            _ => None,
        };
        self.count(found.is_some());
        found
    }

    pub fn insert_profile(&mut self, hash: &str, profile: Arc<DomainProfile>) {
        self.entries.insert(
            (hash.to_string(), AnalysisKind::DomainProfile),
            CachedAnalysis::Profile(profile),
        );
    }

    pub fn graph(&mut self, hash: &str) -> Option<Arc<RelationshipGraph>> {
        let found = match self
            .entries
            .get(&(hash.to_string(), AnalysisKind::RelationshipGraph))
        {
            Some(CachedAnalysis::Graph(g)) => Some(Arc::clone(g)),
            _ => None,
        };
        self.count(found.is_some());
        found
    }

    pub fn insert_graph(&mut self, hash: &str, graph: Arc<RelationshipGraph>) {
        self.entries.insert(
            (hash.to_string(), AnalysisKind::RelationshipGraph),
            CachedAnalysis::Graph(graph),
        );
    }

    /// Drop every entry computed from content with this hash.
    pub fn invalidate(&mut self, hash: &str) {
        self.entries.retain(|(h, _), _| h != hash);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    fn count(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }
}

/// Content hash of a domain under the given profile options.
pub fn domain_hash(domain: &SourceDomain, options: &ProfileOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(domain.subject_key.as_bytes());
    hasher.update([0u8]);
    for column in &domain.columns {
        hasher.update(column.as_bytes());
        hasher.update([0x1f]);
    }
    for row in &domain.rows {
        hasher.update([0x1e]);
        for column in &domain.columns {
            if let Some(value) = row.get(column) {
                hasher.update(value.to_unique_key().as_bytes());
            }
            hasher.update([0x1f]);
        }
    }
    hasher.update(serde_json::to_string(options).unwrap_or_default().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash of a relationship graph's inputs.
pub fn graph_hash(domain_hashes: &[String], options: &DetectionOptions) -> String {
    let mut hasher = Sha256::new();
    for hash in domain_hashes {
        hasher.update(hash.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(serde_json::to_string(options).unwrap_or_default().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::profile_domain;

    fn demographics(age: &str) -> SourceDomain {
        SourceDomain::from_records(
            "DM",
            "USUBJID",
            vec!["USUBJID".into(), "AGE".into()],
            vec![vec!["S-1", "45"], vec!["S-2", age]],
        )
    }

    #[test]
    fn test_hash_changes_with_content() {
        let options = ProfileOptions::default();
        let a = domain_hash(&demographics("52"), &options);
        let b = domain_hash(&demographics("52"), &options);
        let c = domain_hash(&demographics("53"), &options);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_options() {
        let domain = demographics("52");
        let a = domain_hash(&domain, &ProfileOptions::default());
        let b = domain_hash(
            &domain,
            &ProfileOptions {
                histogram_bins: 3,
                ..Default::default()
            },
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_hit_and_invalidate() {
        let options = ProfileOptions::default();
        let domain = demographics("52");
        let hash = domain_hash(&domain, &options);
        let mut cache = AnalysisCache::new();

        assert!(cache.profile(&hash).is_none());
        cache.insert_profile(&hash, Arc::new(profile_domain(&domain, &options)));
        assert_eq!(cache.profile(&hash).unwrap().record_count, 2);
        assert_eq!(cache.stats(), (1, 1));

        // Same hash, other kind: no hit.
        assert!(cache.graph(&hash).is_none());

        cache.invalidate(&hash);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_graph_hash_depends_on_options() {
        let hashes = vec!["a".to_string(), "b".to_string()];
        let a = graph_hash(&hashes, &DetectionOptions::default());
        let b = graph_hash(
            &hashes,
            &DetectionOptions {
                threshold: 0.5,
                ..Default::default()
            },
        );
        assert_ne!(a, b);
    }
}
