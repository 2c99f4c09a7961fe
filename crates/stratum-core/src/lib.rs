//! Stratum core: the host-side multi-version plugin class-loading engine.
//!
//! Given a directory of `.jar`-style archives, this crate discovers each
//! archive's entry-point class, materializes an isolated runtime environment
//! for the runtime-library version the plugin was compiled against, and wires
//! a layered lookup chain per plugin so that plugins on the same runtime
//! version transparently share already-defined classes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    PluginLoader                      │
//! │  - scans archives for descriptor metadata            │
//! │  - selects the main-class candidate                  │
//! │  - drives enable/disable lifecycle and teardown      │
//! └──────────────────────────────────────────────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌──────────────┐   ┌───────────────┐   ┌───────────────┐
//! │ RuntimeReg-  │   │ SharedClass-  │   │ PluginClass-  │
//! │ istry (one   │   │ Cache (per-   │   │ Loader (one   │
//! │ env/version) │   │ version map)  │   │ per plugin)   │
//! └──────────────┘   └───────────────┘   └───────────────┘
//! ```
//!
//! Class resolution through a [`scoped::PluginClassLoader`] walks an ordered
//! chain: shared cache, the plugin's own archive, the runtime environment,
//! then the other active loaders of the same version. A class defined from
//! the plugin's own archive is published into the shared cache so later
//! plugins on the same runtime version reuse it instead of loading a private
//! duplicate.
//!
//! All operations are synchronous and safe to call from multiple host
//! threads. The registry and cache are explicit services handed to the
//! orchestrator, never ambient singletons, so tests can build isolated
//! instances per case.

pub mod class;
pub mod error;
pub mod host;
pub mod instantiate;
pub mod loader;
pub mod runtime;
pub mod scanner;
pub mod scoped;
pub mod shared;

pub use class::{ClassIndex, ClassOrigin, ClassRecord, LoadedClass, LoaderId};
pub use error::{Error, InstantiationError, Result};
pub use host::{
    HostEvents, HostRegistry, HostServices, LifecycleEvent, LifecyclePhase, ListenerRegistration,
    NativeLoader, NullEvents, RuntimeLocator,
};
pub use instantiate::{ClassShape, InstanceProvider, ShapeInspector, SymbolShapeInspector};
pub use loader::{PluginLoader, PluginRecord};
pub use runtime::{RegistryConfig, RuntimeEnvironment, RuntimeRegistry};
pub use scanner::{scan_archive, select_main_class, BincodeExtractor, MetadataExtractor};
pub use scoped::PluginClassLoader;
pub use shared::SharedClassCache;
