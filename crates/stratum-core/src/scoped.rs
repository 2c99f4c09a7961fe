//! The per-plugin class loader.
//!
//! One instance per loaded plugin archive. Resolution walks an ordered chain
//! of strategies, short-circuiting on the first hit: the shared class cache,
//! the plugin's own archive, the runtime environment, then the other active
//! loaders of the same version. A class defined from the plugin's own
//! archive is published into the shared cache immediately, so later plugins
//! on the same runtime version resolve it without reloading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use stratum_sdk::{ClassName, VersionId};
use tracing::debug;

use crate::class::{ClassIndex, ClassOrigin, ClassRecord, LoadedClass, LoaderId};
use crate::error::{Error, Result};
use crate::runtime::RuntimeEnvironment;
use crate::shared::SharedClassCache;

/// Class loader scoped to one plugin archive.
pub struct PluginClassLoader {
    id: LoaderId,
    archive_path: PathBuf,
    version: VersionId,
    runtime: Arc<RuntimeEnvironment>,
    cache: Arc<SharedClassCache>,
    /// Dropped on [`release`](Self::release); `None` afterwards.
    index: Mutex<Option<ClassIndex>>,
    /// Classes this loader personally defined, for teardown.
    defined: RwLock<HashMap<ClassName, LoadedClass>>,
}

impl PluginClassLoader {
    /// Open the archive at `path` and wire the loader into the lookup chain
    /// for `runtime`'s version.
    pub fn new(
        path: &Path,
        runtime: Arc<RuntimeEnvironment>,
        cache: Arc<SharedClassCache>,
    ) -> Result<Arc<Self>> {
        let index = ClassIndex::open(path)?;
        Ok(Arc::new(Self {
            id: LoaderId::next(),
            archive_path: path.to_path_buf(),
            version: runtime.version().clone(),
            runtime,
            cache,
            index: Mutex::new(Some(index)),
            defined: RwLock::new(HashMap::new()),
        }))
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    pub fn version(&self) -> &VersionId {
        &self.version
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Resolve a class through the full lookup chain.
    pub fn resolve(&self, name: &ClassName) -> Result<LoadedClass> {
        // (a) already shared by some plugin on this runtime version.
        if let Some(class) = self.cache.lookup(&self.version, name) {
            debug!(loader = %self.id, class = %name, "shared cache hit");
            return Ok(class);
        }

        // (b) this plugin's own archive.
        if let Some(class) = self.find_own(name) {
            return Ok(class);
        }

        // (c) delegate to the runtime environment.
        if let Some(class) = self.runtime.resolve(name) {
            return Ok(class);
        }

        // (d) fallback: other active loaders of this version.
        if let Some(class) = self.cache.find_in_loaders(&self.version, name, Some(self)) {
            return Ok(class);
        }

        Err(Error::ClassNotFound { name: name.clone() })
    }

    /// Define a class from this loader's own archive, if the archive holds
    /// it. The definition is recorded for teardown and published into the
    /// shared cache. Safe against concurrent resolution of the same name:
    /// the class is defined exactly once.
    pub fn find_own(&self, name: &ClassName) -> Option<LoadedClass> {
        if let Some(class) = self.defined.read().get(name) {
            return Some(class.clone());
        }

        let bytes = {
            let index = self.index.lock();
            index.as_ref()?.get(name)?
        };

        let (class, freshly_defined) = {
            let mut defined = self.defined.write();
            // Double-check: a concurrent resolver may have defined the class
            // between the read above and taking the write lock.
            match defined.get(name) {
                Some(class) => (class.clone(), false),
                None => {
                    let class = ClassRecord::define(
                        name.clone(),
                        bytes,
                        ClassOrigin::Plugin(self.id),
                        &self.archive_path,
                    );
                    defined.insert(name.clone(), class.clone());
                    (class, true)
                }
            }
        };

        if freshly_defined {
            self.cache.publish(&self.version, &class);
        }
        Some(class)
    }

    /// The classes this loader personally defined.
    pub fn defined_classes(&self) -> Vec<LoadedClass> {
        self.defined.read().values().cloned().collect()
    }

    /// Release held resources. Idempotent; the archive index is dropped and
    /// later own-archive lookups miss.
    pub fn release(&self) -> Result<()> {
        self.index.lock().take();
        debug!(loader = %self.id, archive = %self.archive_path.display(), "released loader resources");
        Ok(())
    }
}

impl std::fmt::Debug for PluginClassLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginClassLoader")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("archive", &self.archive_path)
            .finish()
    }
}
