//! Runtime-library environments and the per-version registry.
//!
//! A [`RuntimeEnvironment`] exposes the classes of one shared runtime-library
//! version. The [`RuntimeRegistry`] creates at most one environment per
//! version, lazily, and hands every plugin declaring that version the same
//! instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use stratum_sdk::{ClassName, VersionId};
use tracing::{debug, info};

use crate::class::{ClassIndex, ClassOrigin, ClassRecord, LoadedClass};
use crate::error::{Error, Result};

/// The loaded class set of one runtime-library version.
///
/// Owned by the registry; plugin loaders hold non-owning `Arc` handles.
#[derive(Debug)]
pub struct RuntimeEnvironment {
    version: VersionId,
    index: ClassIndex,
    defined: RwLock<HashMap<ClassName, LoadedClass>>,
}

impl RuntimeEnvironment {
    /// Load the runtime-library archive at `path`.
    fn open(version: VersionId, path: &Path) -> Result<Arc<Self>> {
        let index = ClassIndex::open(path)?;
        info!(version = %version, archive = %path.display(),
            classes = index.len(), "loaded runtime library");
        Ok(Arc::new(Self {
            version,
            index,
            defined: RwLock::new(HashMap::new()),
        }))
    }

    pub fn version(&self) -> &VersionId {
        &self.version
    }

    /// Archive the runtime library was loaded from.
    pub fn binary_path(&self) -> &Path {
        self.index.path()
    }

    pub fn class_count(&self) -> usize {
        self.index.len()
    }

    /// Resolve a runtime-library class, defining it on first use.
    ///
    /// Definitions carry [`ClassOrigin::Runtime`] so they are never
    /// republished as shared plugin classes.
    pub fn resolve(&self, name: &ClassName) -> Option<LoadedClass> {
        if let Some(class) = self.defined.read().get(name) {
            return Some(class.clone());
        }

        let bytes = self.index.get(name)?;
        let mut defined = self.defined.write();
        // Another thread may have defined it while we read the archive.
        let class = defined
            .entry(name.clone())
            .or_insert_with(|| {
                ClassRecord::define(
                    name.clone(),
                    bytes,
                    ClassOrigin::Runtime(self.version.clone()),
                    self.index.path(),
                )
            })
            .clone();
        Some(class)
    }
}

/// Registry behavior knobs.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Evict a runtime environment once no plugin loader is attached to it
    /// anymore. Off by default: environments stay warm for the process
    /// lifetime, so a plugin reload never pays the load cost twice.
    pub evict_unused: bool,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    environment: Option<Arc<RuntimeEnvironment>>,
    attached: usize,
}

/// Process-wide map of runtime version to lazily-created environment.
///
/// Construction per version is a one-time, synchronized, idempotent
/// operation: concurrent callers for the same version block on that
/// version's slot and all receive the same environment, while different
/// versions construct in parallel. A failed construction leaves the slot
/// empty, so a later retry for the same version is allowed.
pub struct RuntimeRegistry {
    config: RegistryConfig,
    slots: Mutex<HashMap<VersionId, Arc<Slot>>>,
}

impl RuntimeRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Get the environment for `version`, creating it on first use.
    ///
    /// `locate` maps the version to the path of its runtime-library binary;
    /// it runs only when the environment does not exist yet.
    pub fn obtain<F>(&self, version: &VersionId, locate: F) -> Result<Arc<RuntimeEnvironment>>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(version.clone()).or_default().clone()
        };

        // The global lock is already released: construction for one version
        // never blocks other versions.
        let mut state = slot.state.lock();
        if let Some(environment) = state.environment.clone() {
            state.attached += 1;
            debug!(version = %version, "reusing runtime environment");
            return Ok(environment);
        }

        let path = locate()?;
        let environment = RuntimeEnvironment::open(version.clone(), &path).map_err(|e| {
            Error::RuntimeResolution {
                version: version.clone(),
                reason: e.to_string(),
            }
        })?;
        state.environment = Some(environment.clone());
        state.attached += 1;
        Ok(environment)
    }

    /// Drop one attachment for `version`, evicting the environment when the
    /// count reaches zero and eviction is enabled.
    pub fn release(&self, version: &VersionId) {
        let slot = {
            let slots = self.slots.lock();
            match slots.get(version) {
                Some(slot) => slot.clone(),
                None => return,
            }
        };

        let mut state = slot.state.lock();
        state.attached = state.attached.saturating_sub(1);
        if state.attached == 0 && self.config.evict_unused && state.environment.take().is_some() {
            info!(version = %version, "evicted unused runtime environment");
        }
    }

    /// Whether an environment currently exists for `version`.
    pub fn contains(&self, version: &VersionId) -> bool {
        let slot = {
            let slots = self.slots.lock();
            slots.get(version).cloned()
        };
        slot.map(|s| s.state.lock().environment.is_some())
            .unwrap_or(false)
    }
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
