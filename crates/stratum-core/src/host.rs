//! Contracts the host application fulfils for the loading engine.
//!
//! The engine treats the host's plugin manager, event system, and native
//! (single-version) plugin loader as external collaborators: each is a trait
//! here, implemented host-side and injected into the orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stratum_sdk::{ManagedPlugin, PluginDescription, VersionId};

use crate::error::Result;

/// Lifecycle transition a cancelable notification is fired for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Enable,
    Disable,
}

/// Cancelable notification fired before a plugin is enabled or disabled.
///
/// A handler that cancels the event aborts the transition with no state
/// change.
#[derive(Debug)]
pub struct LifecycleEvent {
    plugin: String,
    phase: LifecyclePhase,
    cancelled: bool,
}

impl LifecycleEvent {
    pub fn new(plugin: impl Into<String>, phase: LifecyclePhase) -> Self {
        Self {
            plugin: plugin.into(),
            phase,
            cancelled: false,
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// The host's event system.
pub trait HostEvents: Send + Sync {
    /// Deliver the event to handlers; handlers may cancel it.
    fn fire(&self, event: &mut LifecycleEvent);
}

/// Event sink that never cancels anything.
#[derive(Debug, Default)]
pub struct NullEvents;

impl HostEvents for NullEvents {
    fn fire(&self, _event: &mut LifecycleEvent) {}
}

/// The host's plugin registry, queried by declared dependency name.
pub trait HostRegistry: Send + Sync {
    /// Whether a plugin of any kind with this name is already loaded.
    fn is_loaded(&self, name: &str) -> bool;
}

/// Maps a runtime version to the path of its already-located library binary.
///
/// How binaries are fetched or provisioned is the host's concern; the engine
/// only consumes a local path.
pub trait RuntimeLocator: Send + Sync {
    fn locate(&self, version: &VersionId) -> Result<PathBuf>;
}

/// A listener registration produced by the host-native loader.
#[derive(Debug, Clone)]
pub struct ListenerRegistration {
    /// Event type the listener subscribes to.
    pub event: String,
    /// Owning plugin name.
    pub plugin: String,
}

/// The host's native single-version plugin loader.
///
/// The engine delegates to it for host-native plugin types and as the
/// fallback when an archive yields no managed main-class candidate.
pub trait NativeLoader: Send + Sync {
    fn describe(&self, path: &Path) -> Result<PluginDescription>;

    fn enable(&self, plugin: &dyn ManagedPlugin);

    fn disable(&self, plugin: &dyn ManagedPlugin);

    fn registered_listeners(&self, plugin: &dyn ManagedPlugin) -> Vec<ListenerRegistration>;

    /// Filename filter patterns, when the native loader declares its own.
    fn file_filters(&self) -> Option<Vec<String>> {
        None
    }
}

/// The collaborator handles the orchestrator needs from its host.
#[derive(Clone)]
pub struct HostServices {
    pub events: Arc<dyn HostEvents>,
    pub registry: Arc<dyn HostRegistry>,
    pub native: Arc<dyn NativeLoader>,
}
