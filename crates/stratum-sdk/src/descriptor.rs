//! Descriptor value types shared between plugin archives and the host.
//!
//! A Stratum archive is an ordinary zip whose compiled class entries end in
//! [`CLASS_ENTRY_SUFFIX`]. An entry that carries plugin metadata starts with
//! the [`CLASS_MAGIC`] bytes followed by a bincode-encoded
//! [`DescriptorRecord`]; the host's scanner turns that record into an
//! [`ArchiveDescriptor`]. How the metadata got into the entry (build tooling,
//! post-processing) is not this crate's concern.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File suffix of compiled class entries inside an archive.
pub const CLASS_ENTRY_SUFFIX: &str = ".class";

/// Magic prefix of a class entry that carries a [`DescriptorRecord`].
pub const CLASS_MAGIC: &[u8; 4] = b"STR1";

/// Identifier of a shared runtime-library version, e.g. `"2.13.8"`.
///
/// Opaque to the loader: two versions are the same environment iff the
/// strings are equal. No ordering semantics are assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Fully-qualified, dot-separated class name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of dot-separated segments, the package depth used by
    /// main-class selection.
    pub fn package_depth(&self) -> usize {
        self.0.split('.').count()
    }

    /// Last segment of the name.
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Class name an archive entry path maps to (`a/b/C.class` -> `a.b.C`).
    pub fn from_entry_path(path: &str) -> Option<Self> {
        let stripped = path.strip_suffix(CLASS_ENTRY_SUFFIX)?;
        Some(Self(stripped.replace('/', ".")))
    }

    /// Entry path this class name maps to inside an archive.
    pub fn to_entry_path(&self) -> String {
        format!("{}{}", self.0.replace('.', "/"), CLASS_ENTRY_SUFFIX)
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// On-wire metadata record embedded at the head of a class entry.
///
/// Plugin name, version and dependencies are not part of the record; they
/// come from the instantiated plugin's own description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorRecord {
    /// Whether this class is declared as the archive's entry point.
    pub main: bool,
    /// Whether the class extends the base plugin type directly.
    pub extends_base_plugin: bool,
    /// Declared runtime-library version requirement.
    pub runtime_version: Option<String>,
    /// Declared host compatibility version.
    pub compat_version: Option<String>,
    /// Whether the class is a singleton object exposing a static instance
    /// slot rather than a public zero-argument constructor.
    pub singleton: bool,
}

/// Metadata the scanner extracted from one class entry.
///
/// Ephemeral: produced and consumed within a single archive scan, then
/// discarded. One descriptor per readable class entry.
#[derive(Debug, Clone, Default)]
pub struct ArchiveDescriptor {
    /// Entry-point class name, present only for main-class candidates.
    pub main_class: Option<ClassName>,
    /// Whether the scanned class extends the base plugin type directly.
    pub extends_base_plugin: bool,
    /// Declared runtime-library version requirement, if any.
    pub runtime_version: Option<VersionId>,
    /// Declared host compatibility version, if any.
    pub compat_version: Option<String>,
}

impl ArchiveDescriptor {
    /// Whether this descriptor names an entry-point class.
    pub fn has_main_class(&self) -> bool {
        self.main_class.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_equality_by_content() {
        assert_eq!(VersionId::new("2.13.8"), VersionId::from("2.13.8"));
        assert_ne!(VersionId::new("2.13.8"), VersionId::new("3.1.0"));
    }

    #[test]
    fn test_package_depth() {
        assert_eq!(ClassName::from("Main").package_depth(), 1);
        assert_eq!(ClassName::from("a.Main").package_depth(), 2);
        assert_eq!(ClassName::from("a.b.Main").package_depth(), 3);
    }

    #[test]
    fn test_entry_path_round_trip() {
        let name = ClassName::from("com.example.Main");
        assert_eq!(name.to_entry_path(), "com/example/Main.class");
        assert_eq!(
            ClassName::from_entry_path("com/example/Main.class"),
            Some(name)
        );
        assert_eq!(ClassName::from_entry_path("META-INF/MANIFEST.MF"), None);
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(ClassName::from("a.b.Main").simple_name(), "Main");
        assert_eq!(ClassName::from("Main").simple_name(), "Main");
    }
}
