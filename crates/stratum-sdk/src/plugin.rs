//! The base plugin type and its description.

use crate::descriptor::{ClassName, VersionId};

/// Resolved description of a loadable plugin.
///
/// Built by the host once an archive's main class has been selected and
/// instantiated; plugins read it back through
/// [`ManagedPlugin::description`].
#[derive(Debug, Clone)]
pub struct PluginDescription {
    /// Unique plugin name. Uniqueness is enforced case-insensitively by the
    /// host.
    pub name: String,
    /// Plugin version string, if declared.
    pub version: Option<String>,
    /// Fully-qualified name of the entry-point class.
    pub main_class: ClassName,
    /// Runtime-library version the plugin was compiled against.
    pub runtime_version: VersionId,
    /// Declared host compatibility version, if any.
    pub compat_version: Option<String>,
    /// Names of plugins that must be loaded before this one.
    pub depends: Vec<String>,
}

impl PluginDescription {
    pub fn new(
        name: impl Into<String>,
        main_class: ClassName,
        runtime_version: VersionId,
    ) -> Self {
        Self {
            name: name.into(),
            version: None,
            main_class,
            runtime_version,
            compat_version: None,
            depends: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_compat_version(mut self, version: impl Into<String>) -> Self {
        self.compat_version = Some(version.into());
        self
    }

    pub fn with_depends(mut self, depends: Vec<String>) -> Self {
        self.depends = depends;
        self
    }

    /// `name vX.Y.Z` when a version is declared, bare name otherwise.
    pub fn full_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{} v{}", self.name, version),
            None => self.name.clone(),
        }
    }

    /// Declared version parsed as semver, when it is one.
    pub fn semver_version(&self) -> Option<semver::Version> {
        self.version.as_deref().and_then(|v| v.parse().ok())
    }
}

/// Base trait every Stratum-managed plugin implements.
///
/// Lifecycle hooks default to no-ops. Instances are shared behind `Arc`
/// across host threads, so hooks take `&self`; plugins needing mutable state
/// bring their own interior mutability.
pub trait ManagedPlugin: Send + Sync {
    /// The plugin's resolved description.
    fn description(&self) -> &PluginDescription;

    /// The plugin's unique name.
    fn name(&self) -> &str {
        &self.description().name
    }

    /// Called once after dependency verification, before any enable.
    fn on_load(&self) {}

    /// Called when the host enables the plugin. The plugin is already marked
    /// enabled when this runs.
    fn on_enable(&self) {}

    /// Called when the host disables the plugin, before it is marked
    /// disabled.
    fn on_disable(&self) {}
}
