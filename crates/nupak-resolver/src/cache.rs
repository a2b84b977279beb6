//! Shared caches for restore operations running resolvers in parallel.
//!
//! A restore may resolve several target graphs concurrently (one resolver
//! per graph, each owning its tracker exclusively). The surfaces they share
//! are concurrent maps with single-writer-wins semantics: a lookup miss
//! builds a value and attempts to publish it, and when another writer raced
//! and published first, the newcomer is discarded. Published values are
//! immutable behind `Arc`s.

use std::sync::Arc;

use dashmap::DashMap;

use nupak_core::library::LibraryIdentity;

use crate::conflict::AnalyzeResult;

/// Key for a published per-graph analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphKey {
    pub graph: String,
    pub framework: Option<String>,
}

impl GraphKey {
    pub fn new(graph: impl Into<String>, framework: Option<String>) -> Self {
        Self {
            graph: graph.into(),
            framework,
        }
    }
}

/// Concurrent cache shared by parallel restore targets.
#[derive(Debug, Default)]
pub struct AnalysisCache {
    results: DashMap<GraphKey, Arc<AnalyzeResult>>,
    identities: DashMap<String, Arc<LibraryIdentity>>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self, key: &GraphKey) -> Option<Arc<AnalyzeResult>> {
        self.results.get(key).map(|entry| entry.value().clone())
    }

    /// Publish an analysis for a graph. When another writer already
    /// published for the same key, the existing value wins and `result` is
    /// dropped.
    pub fn publish(&self, key: GraphKey, result: AnalyzeResult) -> Arc<AnalyzeResult> {
        self.results
            .entry(key)
            .or_insert_with(|| Arc::new(result))
            .value()
            .clone()
    }

    /// Intern a resolved identity so equal identities share one allocation
    /// across graphs. Keys are case-insensitive on the package name.
    pub fn intern(&self, identity: LibraryIdentity) -> Arc<LibraryIdentity> {
        let version = identity
            .version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let key = format!("{}@{version}", identity.name.to_lowercase());
        self.identities
            .entry(key)
            .or_insert_with(|| Arc::new(identity))
            .value()
            .clone()
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use nupak_core::version::Version;

    #[test]
    fn first_publish_wins() {
        let cache = AnalysisCache::new();
        let key = GraphKey::new("net8.0", None);

        let first = AnalyzeResult {
            version_conflicts: vec![],
            cycles: vec![NodeId(3)],
            downgrades: vec![],
        };
        let second = AnalyzeResult::default();

        let published = cache.publish(key.clone(), first);
        let raced = cache.publish(key.clone(), second);

        // the racing writer gets the already-published value back
        assert!(Arc::ptr_eq(&published, &raced));
        assert_eq!(raced.cycles, vec![NodeId(3)]);
        assert_eq!(cache.result_count(), 1);
        assert!(cache.result(&key).is_some());
    }

    #[test]
    fn framework_override_is_part_of_the_key() {
        let cache = AnalysisCache::new();
        cache.publish(GraphKey::new("net8.0", None), AnalyzeResult::default());
        cache.publish(
            GraphKey::new("net8.0", Some("win-x64".to_string())),
            AnalyzeResult::default(),
        );
        assert_eq!(cache.result_count(), 2);
    }

    #[test]
    fn intern_dedups_case_insensitively() {
        let cache = AnalysisCache::new();
        let a = cache.intern(LibraryIdentity::package("Serilog", Version::new(2, 10, 0)));
        let b = cache.intern(LibraryIdentity::package("serilog", Version::new(2, 10, 0)));
        let c = cache.intern(LibraryIdentity::package("serilog", Version::new(2, 11, 0)));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
