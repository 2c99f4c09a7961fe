//! The cross-plugin shared class cache.
//!
//! For each runtime version the cache holds the plugin classes already
//! defined by some loader, plus the list of active plugin-scoped loaders for
//! that version (the fallback search path during resolution and the
//! bookkeeping handle during teardown).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use stratum_sdk::{ClassName, VersionId};
use tracing::debug;

use crate::class::{ClassRecord, LoadedClass};
use crate::scoped::PluginClassLoader;

#[derive(Default)]
struct VersionBucket {
    classes: HashMap<ClassName, LoadedClass>,
    loaders: Vec<Arc<PluginClassLoader>>,
}

/// Process-wide class cache keyed by runtime version.
///
/// Safe for concurrent lookup during resolution alongside publish-on-load
/// and remove-on-unload. An explicit service: construct once at host startup
/// and pass by reference to the orchestrator.
#[derive(Default)]
pub struct SharedClassCache {
    buckets: DashMap<VersionId, VersionBucket>,
}

impl SharedClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a plugin-defined class for `version`. First writer wins.
    ///
    /// Classes that originated from a runtime environment are refused:
    /// runtime-library internals are never republished as plugin classes.
    /// Returns whether the class was inserted.
    pub fn publish(&self, version: &VersionId, class: &LoadedClass) -> bool {
        if class.is_runtime() {
            return false;
        }

        let mut bucket = self.buckets.entry(version.clone()).or_default();
        match bucket.classes.entry(class.name().clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(class.clone());
                debug!(version = %version, class = %class.name(), "published shared class");
                true
            }
        }
    }

    /// Look up an already-shared class.
    pub fn lookup(&self, version: &VersionId, name: &ClassName) -> Option<LoadedClass> {
        self.buckets
            .get(version)
            .and_then(|bucket| bucket.classes.get(name).cloned())
    }

    /// Fallback search: ask each active loader of `version` to define the
    /// class from its own archive. The defining loader publishes the class
    /// itself, so a hit needs no republication here.
    ///
    /// `skip` excludes the asking loader from the search.
    pub fn find_in_loaders(
        &self,
        version: &VersionId,
        name: &ClassName,
        skip: Option<&PluginClassLoader>,
    ) -> Option<LoadedClass> {
        // Clone the list out so no shard lock is held while loaders run
        // (defining a class publishes back into this cache).
        let loaders: Vec<_> = self
            .buckets
            .get(version)?
            .loaders
            .iter()
            .filter(|loader| skip.map(|s| s.id() != loader.id()).unwrap_or(true))
            .cloned()
            .collect();

        loaders.iter().find_map(|loader| loader.find_own(name))
    }

    /// Add a loader to the active list for `version`.
    pub fn attach_loader(&self, version: &VersionId, loader: Arc<PluginClassLoader>) {
        self.buckets
            .entry(version.clone())
            .or_default()
            .loaders
            .push(loader);
    }

    /// Remove a loader from the active list for `version`.
    pub fn detach_loader(&self, version: &VersionId, loader: &PluginClassLoader) {
        if let Some(mut bucket) = self.buckets.get_mut(version) {
            bucket.loaders.retain(|l| l.id() != loader.id());
        }
        self.drop_bucket_if_empty(version);
    }

    /// Remove exactly the given definitions from `version`'s bucket.
    ///
    /// Removal compares definition identity, not class name: when another
    /// still-active loader republished the same name with its own
    /// definition, that entry stays.
    pub fn remove_contributed(&self, version: &VersionId, classes: &[LoadedClass]) {
        if let Some(mut bucket) = self.buckets.get_mut(version) {
            for class in classes {
                let shared = bucket.classes.get(class.name());
                if shared.map(|c| ClassRecord::same_definition(c, class)) == Some(true) {
                    bucket.classes.remove(class.name());
                }
            }
        }
        self.drop_bucket_if_empty(version);
    }

    /// Number of shared classes for `version`.
    pub fn class_count(&self, version: &VersionId) -> usize {
        self.buckets
            .get(version)
            .map(|bucket| bucket.classes.len())
            .unwrap_or(0)
    }

    /// Number of active loaders for `version`.
    pub fn loader_count(&self, version: &VersionId) -> usize {
        self.buckets
            .get(version)
            .map(|bucket| bucket.loaders.len())
            .unwrap_or(0)
    }

    /// Whether a bucket exists for `version`.
    pub fn has_version(&self, version: &VersionId) -> bool {
        self.buckets.contains_key(version)
    }

    fn drop_bucket_if_empty(&self, version: &VersionId) {
        self.buckets
            .remove_if(version, |_, bucket| {
                bucket.classes.is_empty() && bucket.loaders.is_empty()
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassOrigin, LoaderId};

    fn plugin_class(name: &str) -> LoadedClass {
        ClassRecord::define(
            ClassName::from(name),
            Arc::from(b"bytes".to_vec().into_boxed_slice()),
            ClassOrigin::Plugin(LoaderId::next()),
            "/plugins/a.jar",
        )
    }

    fn runtime_class(name: &str, version: &VersionId) -> LoadedClass {
        ClassRecord::define(
            ClassName::from(name),
            Arc::from(b"bytes".to_vec().into_boxed_slice()),
            ClassOrigin::Runtime(version.clone()),
            "/runtimes/runtime.jar",
        )
    }

    #[test]
    fn test_publish_and_lookup() {
        let cache = SharedClassCache::new();
        let version = VersionId::from("2.13.8");
        let class = plugin_class("a.Shared");

        assert!(cache.publish(&version, &class));
        let hit = cache.lookup(&version, &ClassName::from("a.Shared")).unwrap();
        assert!(ClassRecord::same_definition(&hit, &class));

        // First writer wins.
        let other = plugin_class("a.Shared");
        assert!(!cache.publish(&version, &other));
        let hit = cache.lookup(&version, &ClassName::from("a.Shared")).unwrap();
        assert!(ClassRecord::same_definition(&hit, &class));
    }

    #[test]
    fn test_runtime_classes_are_refused() {
        let cache = SharedClassCache::new();
        let version = VersionId::from("2.13.8");
        let class = runtime_class("rt.Prelude", &version);

        assert!(!cache.publish(&version, &class));
        assert!(!cache.has_version(&version));
    }

    #[test]
    fn test_remove_contributed_compares_identity() {
        let cache = SharedClassCache::new();
        let version = VersionId::from("2.13.8");
        let mine = plugin_class("a.Shared");
        let theirs = plugin_class("a.Shared");

        // Their definition got in first; removing mine must not clobber it.
        assert!(cache.publish(&version, &theirs));
        cache.remove_contributed(&version, &[mine]);
        assert_eq!(cache.class_count(&version), 1);

        cache.remove_contributed(&version, &[theirs]);
        assert_eq!(cache.class_count(&version), 0);
        // Bucket dropped once empty.
        assert!(!cache.has_version(&version));
    }

    #[test]
    fn test_versions_are_isolated() {
        let cache = SharedClassCache::new();
        let v213 = VersionId::from("2.13.8");
        let v31 = VersionId::from("3.1.0");

        cache.publish(&v213, &plugin_class("a.Shared"));
        assert!(cache.lookup(&v31, &ClassName::from("a.Shared")).is_none());
    }
}
