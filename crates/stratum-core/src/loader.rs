//! The plugin loader orchestrator.
//!
//! Ties the scanner, registry, shared cache and scoped loaders together:
//! `describe` resolves an archive to a registered plugin, `load` verifies
//! dependencies and runs the load hook, `enable`/`disable` drive the
//! lifecycle, and disable tears the plugin's classes out of the shared
//! cache again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use stratum_sdk::{ArchiveDescriptor, ManagedPlugin, PluginDescription, VersionId};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::host::{HostServices, LifecycleEvent, LifecyclePhase, ListenerRegistration};
use crate::instantiate::{InstanceProvider, ShapeInspector};
use crate::runtime::RuntimeRegistry;
use crate::scanner::{scan_archive, MetadataExtractor};
use crate::scoped::PluginClassLoader;
use crate::shared::SharedClassCache;

/// Default filename filter when the host-native loader declares none.
const DEFAULT_FILE_FILTER: &str = r"\.jar$";

/// One loaded plugin.
pub struct PluginRecord {
    path: PathBuf,
    description: PluginDescription,
    plugin: Arc<dyn ManagedPlugin>,
    class_loader: Arc<PluginClassLoader>,
    /// Cached instantiation decision for the main class.
    provider: InstanceProvider,
    enabled: AtomicBool,
    /// Serializes enable/disable transitions so each hook runs at most once.
    lifecycle: Mutex<()>,
    loaded_at: DateTime<Utc>,
}

impl PluginRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn description(&self) -> &PluginDescription {
        &self.description
    }

    pub fn plugin(&self) -> &Arc<dyn ManagedPlugin> {
        &self.plugin
    }

    pub fn class_loader(&self) -> &Arc<PluginClassLoader> {
        &self.class_loader
    }

    pub fn provider(&self) -> &InstanceProvider {
        &self.provider
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

impl std::fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("path", &self.path)
            .field("name", &self.description.name)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[derive(Default)]
struct Records {
    /// Keyed by lowercase plugin name; uniqueness is case-insensitive.
    by_name: HashMap<String, Arc<PluginRecord>>,
    by_path: HashMap<PathBuf, Arc<PluginRecord>>,
}

/// Orchestrator for managed plugin archives.
///
/// All services are injected: the registry and shared cache are
/// process-scoped state owned by the host, the inspector/extractor are the
/// bytecode seams, and [`HostServices`] bundles the host collaborators.
/// Every operation is synchronous and safe to call from multiple threads.
pub struct PluginLoader {
    registry: Arc<RuntimeRegistry>,
    cache: Arc<SharedClassCache>,
    locator: Arc<dyn crate::host::RuntimeLocator>,
    inspector: Arc<dyn ShapeInspector>,
    extractor: Arc<dyn MetadataExtractor>,
    host: HostServices,
    records: Mutex<Records>,
}

impl PluginLoader {
    pub fn new(
        registry: Arc<RuntimeRegistry>,
        cache: Arc<SharedClassCache>,
        locator: Arc<dyn crate::host::RuntimeLocator>,
        inspector: Arc<dyn ShapeInspector>,
        extractor: Arc<dyn MetadataExtractor>,
        host: HostServices,
    ) -> Self {
        Self {
            registry,
            cache,
            locator,
            inspector,
            extractor,
            host,
            records: Mutex::new(Records::default()),
        }
    }

    /// Resolve the archive at `path` to a plugin description, loading and
    /// registering the plugin on first call. A repeated call for the same
    /// path is a pure cache hit.
    ///
    /// When no class in the archive is a main-class candidate, resolution
    /// falls back to the host-native loader. Every other failure surfaces as
    /// [`Error::InvalidDescription`] wrapping the cause.
    pub fn describe(&self, path: &Path) -> Result<PluginDescription> {
        if let Some(record) = self.records.lock().by_path.get(path) {
            debug!(archive = %path.display(), "describe cache hit");
            return Ok(record.description.clone());
        }

        let best = scan_archive(path, self.extractor.as_ref())
            .map_err(|e| Error::invalid_description(path, e))?;

        let Some(candidate) = best else {
            warn!(
                archive = %path.display(),
                "no main class candidate found, delegating to the host-native loader"
            );
            return self.host.native.describe(path);
        };

        self.resolve_managed(path, candidate)
            .map_err(|e| match e {
                already @ Error::InvalidDescription { .. } => already,
                cause => Error::invalid_description(path, cause),
            })
    }

    fn resolve_managed(
        &self,
        path: &Path,
        candidate: ArchiveDescriptor,
    ) -> Result<PluginDescription> {
        // Selection guarantees a main class is present.
        let main_class = candidate
            .main_class
            .clone()
            .ok_or(Error::NoMainClass { path: path.into() })?;
        let version = candidate
            .runtime_version
            .clone()
            .ok_or(Error::MissingRuntimeVersion {
                class: main_class.clone(),
            })?;

        let environment = self
            .registry
            .obtain(&version, || self.locator.locate(&version))?;

        // The environment attachment must not outlive a failed loader open.
        let class_loader = match PluginClassLoader::new(path, environment, self.cache.clone()) {
            Ok(class_loader) => class_loader,
            Err(e) => {
                self.registry.release(&version);
                return Err(e);
            }
        };
        self.cache.attach_loader(&version, class_loader.clone());

        // Every failure from here on must unwind the loader attachment.
        match self.instantiate_and_register(path, candidate, main_class, class_loader.clone()) {
            Ok(description) => Ok(description),
            Err(e) => {
                self.unwind_loader(&version, &class_loader);
                Err(e)
            }
        }
    }

    fn instantiate_and_register(
        &self,
        path: &Path,
        candidate: ArchiveDescriptor,
        main_class: stratum_sdk::ClassName,
        class_loader: Arc<PluginClassLoader>,
    ) -> Result<PluginDescription> {
        let class = class_loader.resolve(&main_class)?;
        let provider = InstanceProvider::for_class(self.inspector.as_ref(), &class)?;
        let plugin = provider.instance().map_err(Error::Instantiation)?;

        // The plugin supplies name, version and dependencies; the scan
        // supplies what was detected from the archive metadata.
        let mut description = plugin.description().clone();
        description.main_class = main_class;
        description.runtime_version = class_loader.version().clone();
        if description.compat_version.is_none() {
            description.compat_version = candidate.compat_version;
        }

        let record = Arc::new(PluginRecord {
            path: path.to_path_buf(),
            description: description.clone(),
            plugin,
            class_loader,
            provider,
            enabled: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            loaded_at: Utc::now(),
        });

        let key = description.name.to_lowercase();
        let mut records = self.records.lock();
        // A concurrent describe for the same path may have won the race;
        // idempotence says hand back its result, after unwinding the loader
        // this call attached.
        if let Some(existing) = records.by_path.get(path) {
            let existing = existing.description.clone();
            drop(records);
            let version = record.class_loader.version().clone();
            self.unwind_loader(&version, &record.class_loader);
            return Ok(existing);
        }
        if records.by_name.contains_key(&key) {
            return Err(Error::DuplicateName {
                name: description.name.clone(),
            });
        }
        records.by_name.insert(key, record.clone());
        records.by_path.insert(path.to_path_buf(), record);
        drop(records);

        info!(
            plugin = %description.full_name(),
            archive = %path.display(),
            runtime = %description.runtime_version,
            "registered plugin"
        );
        Ok(description)
    }

    /// Undo a loader attachment after a failed resolution.
    fn unwind_loader(&self, version: &VersionId, class_loader: &Arc<PluginClassLoader>) {
        self.cache
            .remove_contributed(version, &class_loader.defined_classes());
        self.cache.detach_loader(version, class_loader);
        self.registry.release(version);
        if let Err(e) = class_loader.release() {
            warn!(error = %e, "failed to release plugin class loader resources");
        }
    }

    /// Load a previously described plugin: verify every declared dependency
    /// is present among loaded plugins, then run the load hook.
    pub fn load(&self, path: &Path) -> Result<Arc<dyn ManagedPlugin>> {
        let record = self
            .records
            .lock()
            .by_path
            .get(path)
            .cloned()
            .ok_or_else(|| Error::InvalidPlugin { path: path.into() })?;

        for dependency in &record.description.depends {
            if !self.dependency_present(dependency) {
                return Err(Error::UnknownDependency {
                    plugin: record.description.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        info!(plugin = %record.description.full_name(), "loading plugin");
        record.plugin.on_load();
        Ok(record.plugin.clone())
    }

    fn dependency_present(&self, name: &str) -> bool {
        self.host.registry.is_loaded(name)
            || self
                .records
                .lock()
                .by_name
                .contains_key(&name.to_lowercase())
    }

    /// Enable a plugin. Instances without a managed record are handed to
    /// the host-native loader.
    ///
    /// For managed records: no-op when already enabled; a handler
    /// cancelling the notification aborts with no state change. The plugin
    /// is marked enabled before its hook runs.
    pub fn enable(&self, plugin: &Arc<dyn ManagedPlugin>) {
        let Some(record) = self.get_plugin(plugin.name()) else {
            debug!(plugin = %plugin.name(), "no managed record, delegating enable");
            self.host.native.enable(plugin.as_ref());
            return;
        };
        self.enable_record(&record);
    }

    fn enable_record(&self, record: &PluginRecord) {
        let _transition = record.lifecycle.lock();
        if record.is_enabled() {
            return;
        }

        let mut event = LifecycleEvent::new(&record.description.name, LifecyclePhase::Enable);
        self.host.events.fire(&mut event);
        if event.is_cancelled() {
            debug!(plugin = %record.description.name, "enable cancelled by handler");
            return;
        }

        record.enabled.store(true, Ordering::SeqCst);
        info!(plugin = %record.description.full_name(), "enabling plugin");
        record.plugin.on_enable();
    }

    /// Disable a plugin and tear its contribution out of the shared state.
    /// Instances without a managed record are handed to the host-native
    /// loader.
    ///
    /// For managed records: no-op when already disabled; cancellation
    /// aborts with no state change. The disable hook runs before the plugin
    /// is marked disabled. Teardown always runs every step; a
    /// resource-release failure is logged, never propagated.
    pub fn disable(&self, plugin: &Arc<dyn ManagedPlugin>) {
        let Some(record) = self.get_plugin(plugin.name()) else {
            debug!(plugin = %plugin.name(), "no managed record, delegating disable");
            self.host.native.disable(plugin.as_ref());
            return;
        };
        self.disable_record(&record);
    }

    fn disable_record(&self, record: &PluginRecord) {
        let _transition = record.lifecycle.lock();
        if !record.is_enabled() {
            return;
        }

        let mut event = LifecycleEvent::new(&record.description.name, LifecyclePhase::Disable);
        self.host.events.fire(&mut event);
        if event.is_cancelled() {
            debug!(plugin = %record.description.name, "disable cancelled by handler");
            return;
        }

        info!(plugin = %record.description.full_name(), "disabling plugin");
        record.plugin.on_disable();
        record.enabled.store(false, Ordering::SeqCst);

        let version = record.class_loader.version().clone();
        self.unwind_loader(&version, &record.class_loader);

        // Logically remove the record: the name becomes free again and the
        // archive can be described afresh.
        let key = record.description.name.to_lowercase();
        let mut records = self.records.lock();
        if records
            .by_name
            .get(&key)
            .map(|r| Arc::ptr_eq(&r.class_loader, &record.class_loader))
            .unwrap_or(false)
        {
            records.by_name.remove(&key);
            records.by_path.remove(&record.path);
        }
    }

    /// Look up a loaded plugin by name, case-insensitively.
    pub fn get_plugin(&self, name: &str) -> Option<Arc<PluginRecord>> {
        self.records.lock().by_name.get(&name.to_lowercase()).cloned()
    }

    /// Look up a loaded plugin by its archive path.
    pub fn get_by_path(&self, path: &Path) -> Option<Arc<PluginRecord>> {
        self.records.lock().by_path.get(path).cloned()
    }

    /// Names of all loaded plugins.
    pub fn plugin_names(&self) -> Vec<String> {
        self.records
            .lock()
            .by_name
            .values()
            .map(|record| record.description.name.clone())
            .collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.records.lock().by_name.len()
    }

    /// Filename filter patterns: the host-native loader's when it declares
    /// any, the built-in jar filter otherwise.
    pub fn file_filters(&self) -> Vec<String> {
        self.host
            .native
            .file_filters()
            .unwrap_or_else(|| vec![DEFAULT_FILE_FILTER.to_string()])
    }

    /// Listener registration is delegated to the host-native loader.
    pub fn registered_listeners(&self, plugin: &dyn ManagedPlugin) -> Vec<ListenerRegistration> {
        self.host.native.registered_listeners(plugin)
    }

    /// A plugin's private data directory: sibling of its archive, named
    /// after the plugin.
    pub fn data_directory(&self, record: &PluginRecord) -> PathBuf {
        record
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&record.description.name)
    }
}
