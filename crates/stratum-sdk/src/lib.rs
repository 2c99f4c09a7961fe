//! Plugin-facing SDK for the Stratum loader.
//!
//! This crate defines the types a plugin archive is compiled against: the
//! [`ManagedPlugin`] base trait, the value types that appear in class-entry
//! metadata, and the on-wire descriptor record that the host's descriptor
//! scanner reads back out of an archive. The host-side engine lives in
//! `stratum-core`; plugin authors never depend on it.

pub mod descriptor;
pub mod error;
pub mod plugin;

pub use descriptor::{
    ArchiveDescriptor, ClassName, DescriptorRecord, VersionId, CLASS_ENTRY_SUFFIX, CLASS_MAGIC,
};
pub use error::{PluginError, PluginResult};
pub use plugin::{ManagedPlugin, PluginDescription};

/// Well-known static slot read for singleton-shaped plugin classes.
///
/// A main class whose metadata marks it as a singleton exposes its one
/// instance through this slot instead of a constructor.
pub const SINGLETON_SLOT: &str = "INSTANCE";

/// Exported symbol a singleton-shaped class provides its instance under.
pub const SINGLETON_SYMBOL: &[u8] = b"stratum_plugin_instance";

/// Exported symbol a constructible class provides its zero-argument factory
/// under.
pub const CONSTRUCTOR_SYMBOL: &[u8] = b"stratum_plugin_create";
