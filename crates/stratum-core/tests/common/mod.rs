//! Shared fixtures for the loader integration tests: archive builders, a
//! table-driven shape inspector, and stub host collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use stratum_core::{
    ClassShape, Error, HostEvents, HostRegistry, HostServices, InstantiationError, LifecycleEvent,
    LifecyclePhase, ListenerRegistration, LoadedClass, NativeLoader, PluginLoader, RegistryConfig,
    Result, RuntimeLocator, RuntimeRegistry, ShapeInspector, SharedClassCache, BincodeExtractor,
};
use stratum_sdk::{
    ClassName, DescriptorRecord, ManagedPlugin, PluginDescription, PluginResult, VersionId,
    CLASS_MAGIC,
};

/// Class entry carrying an embedded descriptor record.
pub fn class_bytes(record: &DescriptorRecord) -> Vec<u8> {
    let mut bytes = CLASS_MAGIC.to_vec();
    bytes.extend(bincode::serialize(record).unwrap());
    bytes
}

/// Record for a main class compiled against `runtime`.
pub fn main_class_record(runtime: &str) -> DescriptorRecord {
    DescriptorRecord {
        main: true,
        runtime_version: Some(runtime.to_string()),
        ..Default::default()
    }
}

/// Write a zip archive with raw entries.
pub fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

/// Plugin with hook counters; shared into the inspector table as a
/// singleton-slot instance.
pub struct TestPlugin {
    description: PluginDescription,
    pub loads: AtomicUsize,
    pub enables: AtomicUsize,
    pub disables: AtomicUsize,
}

impl TestPlugin {
    pub fn shared(name: &str, main: &str, runtime: &str, depends: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            description: PluginDescription::new(
                name,
                ClassName::from(main),
                VersionId::from(runtime),
            )
            .with_version("1.0.0")
            .with_depends(depends.iter().map(|d| d.to_string()).collect()),
            loads: AtomicUsize::new(0),
            enables: AtomicUsize::new(0),
            disables: AtomicUsize::new(0),
        })
    }
}

impl ManagedPlugin for TestPlugin {
    fn description(&self) -> &PluginDescription {
        &self.description
    }

    fn on_load(&self) {
        self.loads.fetch_add(1, Ordering::SeqCst);
    }

    fn on_enable(&self) {
        self.enables.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disable(&self) {
        self.disables.fetch_add(1, Ordering::SeqCst);
    }
}

/// Declared shape of one test class.
pub enum Shape {
    Singleton(Arc<dyn ManagedPlugin>),
    Ctor(Arc<dyn Fn() -> PluginResult<Arc<dyn ManagedPlugin>> + Send + Sync>),
    HiddenCtor,
}

/// Table-driven stand-in for the bytecode shape seam.
#[derive(Default)]
pub struct TableInspector {
    shapes: Mutex<HashMap<ClassName, Shape>>,
    pub inspections: AtomicUsize,
}

impl TableInspector {
    pub fn register(&self, class: &str, shape: Shape) {
        self.shapes.lock().insert(ClassName::from(class), shape);
    }

    pub fn register_singleton(&self, class: &str, plugin: Arc<dyn ManagedPlugin>) {
        self.register(class, Shape::Singleton(plugin));
    }
}

impl ShapeInspector for TableInspector {
    fn inspect(&self, class: &LoadedClass) -> std::result::Result<ClassShape, InstantiationError> {
        self.inspections.fetch_add(1, Ordering::SeqCst);
        match self.shapes.lock().get(class.name()) {
            Some(Shape::Singleton(plugin)) => Ok(ClassShape {
                singleton: Some(plugin.clone()),
                // A singleton's constructor must never run.
                constructor: Some(Box::new(|| panic!("constructor invoked for singleton"))),
                constructor_public: true,
            }),
            Some(Shape::Ctor(factory)) => {
                let factory = factory.clone();
                Ok(ClassShape {
                    singleton: None,
                    constructor: Some(Box::new(move || factory())),
                    constructor_public: true,
                })
            }
            Some(Shape::HiddenCtor) => Ok(ClassShape {
                singleton: None,
                constructor: Some(Box::new(|| panic!("hidden constructor invoked"))),
                constructor_public: false,
            }),
            None => Ok(ClassShape {
                singleton: None,
                constructor: None,
                constructor_public: false,
            }),
        }
    }
}

/// Locator over a fixed version → binary map.
#[derive(Default)]
pub struct MapLocator {
    binaries: Mutex<HashMap<VersionId, PathBuf>>,
    pub locations: AtomicUsize,
}

impl MapLocator {
    pub fn insert(&self, version: &str, path: PathBuf) {
        self.binaries.lock().insert(VersionId::from(version), path);
    }
}

impl RuntimeLocator for MapLocator {
    fn locate(&self, version: &VersionId) -> Result<PathBuf> {
        self.locations.fetch_add(1, Ordering::SeqCst);
        self.binaries
            .lock()
            .get(version)
            .cloned()
            .ok_or_else(|| Error::RuntimeResolution {
                version: version.clone(),
                reason: "no binary for this version".to_string(),
            })
    }
}

/// Event sink with switchable cancellation.
#[derive(Default)]
pub struct RecordingEvents {
    pub cancel_enable: AtomicBool,
    pub cancel_disable: AtomicBool,
    pub fired: Mutex<Vec<(String, LifecyclePhase)>>,
}

impl HostEvents for RecordingEvents {
    fn fire(&self, event: &mut LifecycleEvent) {
        self.fired
            .lock()
            .push((event.plugin().to_string(), event.phase()));
        let cancel = match event.phase() {
            LifecyclePhase::Enable => self.cancel_enable.load(Ordering::SeqCst),
            LifecyclePhase::Disable => self.cancel_disable.load(Ordering::SeqCst),
        };
        if cancel {
            event.cancel();
        }
    }
}

/// Host plugin registry backed by a name set.
#[derive(Default)]
pub struct SetRegistry {
    names: Mutex<HashSet<String>>,
}

impl SetRegistry {
    pub fn add(&self, name: &str) {
        self.names.lock().insert(name.to_lowercase());
    }
}

impl HostRegistry for SetRegistry {
    fn is_loaded(&self, name: &str) -> bool {
        self.names.lock().contains(&name.to_lowercase())
    }
}

/// Host-native loader stub: counts fallback calls, optionally answering
/// with a canned description.
#[derive(Default)]
pub struct StubNative {
    pub fallback: Mutex<Option<PluginDescription>>,
    pub describes: AtomicUsize,
    pub enables: AtomicUsize,
    pub disables: AtomicUsize,
}

impl NativeLoader for StubNative {
    fn describe(&self, path: &Path) -> Result<PluginDescription> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        self.fallback
            .lock()
            .clone()
            .ok_or_else(|| Error::InvalidPlugin { path: path.into() })
    }

    fn enable(&self, _plugin: &dyn ManagedPlugin) {
        self.enables.fetch_add(1, Ordering::SeqCst);
    }

    fn disable(&self, _plugin: &dyn ManagedPlugin) {
        self.disables.fetch_add(1, Ordering::SeqCst);
    }

    fn registered_listeners(&self, plugin: &dyn ManagedPlugin) -> Vec<ListenerRegistration> {
        vec![ListenerRegistration {
            event: "native".to_string(),
            plugin: plugin.name().to_string(),
        }]
    }
}

/// Full test fixture: one loader wired to stub collaborators and a temp
/// plugin directory with runtime binaries for two versions.
pub struct TestHost {
    pub dir: tempfile::TempDir,
    pub registry: Arc<RuntimeRegistry>,
    pub cache: Arc<SharedClassCache>,
    pub inspector: Arc<TableInspector>,
    pub locator: Arc<MapLocator>,
    pub events: Arc<RecordingEvents>,
    pub host_registry: Arc<SetRegistry>,
    pub native: Arc<StubNative>,
    pub loader: PluginLoader,
}

impl TestHost {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("stratum_core=debug")
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(RuntimeRegistry::new(config));
        let cache = Arc::new(SharedClassCache::new());
        let inspector = Arc::new(TableInspector::default());
        let locator = Arc::new(MapLocator::default());
        let events = Arc::new(RecordingEvents::default());
        let host_registry = Arc::new(SetRegistry::default());
        let native = Arc::new(StubNative::default());

        for version in ["2.13.8", "3.1.0"] {
            let path = dir.path().join(format!("runtime-{version}.jar"));
            write_archive(
                &path,
                &[
                    ("rt/Prelude.class", b"runtime class"),
                    ("rt/Collections.class", b"runtime class"),
                ],
            );
            locator.insert(version, path);
        }

        let loader = PluginLoader::new(
            registry.clone(),
            cache.clone(),
            locator.clone(),
            inspector.clone(),
            Arc::new(BincodeExtractor),
            HostServices {
                events: events.clone(),
                registry: host_registry.clone(),
                native: native.clone(),
            },
        );

        Self {
            dir,
            registry,
            cache,
            inspector,
            locator,
            events,
            host_registry,
            native,
            loader,
        }
    }

    /// Write a plugin archive whose `main` class declares `runtime`, plus
    /// any extra plain classes.
    pub fn write_plugin(&self, file: &str, main: &str, runtime: &str, extra: &[&str]) -> PathBuf {
        let path = self.dir.path().join(file);
        let main_entry = ClassName::from(main).to_entry_path();
        let main_bytes = class_bytes(&main_class_record(runtime));

        let mut entries: Vec<(String, Vec<u8>)> = vec![(main_entry, main_bytes)];
        for class in extra {
            entries.push((
                ClassName::from(*class).to_entry_path(),
                format!("plain bytes of {class}").into_bytes(),
            ));
        }
        let borrowed: Vec<(&str, &[u8])> = entries
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
            .collect();
        write_archive(&path, &borrowed);
        path
    }

    /// Write a plugin archive and register a singleton-shaped plugin for its
    /// main class.
    pub fn singleton_plugin(
        &self,
        file: &str,
        name: &str,
        main: &str,
        runtime: &str,
        extra: &[&str],
    ) -> (PathBuf, Arc<TestPlugin>) {
        let path = self.write_plugin(file, main, runtime, extra);
        let plugin = TestPlugin::shared(name, main, runtime, &[]);
        self.inspector.register_singleton(main, plugin.clone());
        (path, plugin)
    }
}
