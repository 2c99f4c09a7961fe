//! Loaded-class records and the per-archive class index.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stratum_sdk::{ClassName, DescriptorRecord, VersionId, CLASS_MAGIC};

use crate::error::Result;

/// Identity of one plugin-scoped loader, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(u64);

impl LoaderId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for LoaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loader-{}", self.0)
    }
}

/// Where a class definition came from.
///
/// Runtime-origin classes are never republished into the shared class cache;
/// the cache holds plugin classes only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassOrigin {
    /// Defined by the runtime environment of the given version.
    Runtime(VersionId),
    /// Defined by the plugin-scoped loader with the given identity.
    Plugin(LoaderId),
}

/// One defined class. Shared as [`LoadedClass`]; two handles refer to the
/// same definition iff they point at the same record.
#[derive(Debug)]
pub struct ClassRecord {
    name: ClassName,
    bytes: Arc<[u8]>,
    origin: ClassOrigin,
    /// Archive the bytes were read from.
    source: PathBuf,
}

pub type LoadedClass = Arc<ClassRecord>;

impl ClassRecord {
    pub fn define(
        name: ClassName,
        bytes: Arc<[u8]>,
        origin: ClassOrigin,
        source: impl Into<PathBuf>,
    ) -> LoadedClass {
        Arc::new(Self {
            name,
            bytes,
            origin,
            source: source.into(),
        })
    }

    pub fn name(&self) -> &ClassName {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn origin(&self) -> &ClassOrigin {
        &self.origin
    }

    /// Archive file this class was defined from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self.origin, ClassOrigin::Runtime(_))
    }

    /// Identity comparison: same definition, not merely same name.
    pub fn same_definition(a: &LoadedClass, b: &LoadedClass) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// Metadata record embedded in the class bytes, when present.
    pub fn metadata(&self) -> Option<DescriptorRecord> {
        decode_metadata(&self.bytes)
    }

    /// Whether the class declares itself a singleton object, either through
    /// its embedded metadata or the `$` name suffix convention.
    pub fn declared_singleton(&self) -> bool {
        self.name.as_str().ends_with('$')
            || self.metadata().map(|m| m.singleton).unwrap_or(false)
    }
}

/// Decode the metadata record at the head of class bytes. `None` for plain
/// classes and for bytes too mangled to decode.
pub(crate) fn decode_metadata(bytes: &[u8]) -> Option<DescriptorRecord> {
    let payload = bytes.strip_prefix(&CLASS_MAGIC[..])?;
    bincode::deserialize(payload).ok()
}

/// In-memory index of the class entries of one archive.
///
/// Built once when a loader opens its archive; entries are keyed by
/// fully-qualified class name.
#[derive(Debug)]
pub struct ClassIndex {
    path: PathBuf,
    entries: HashMap<ClassName, Arc<[u8]>>,
}

impl ClassIndex {
    /// Read every class entry of the archive at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

        let mut entries = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if !entry.is_file() {
                continue;
            }
            let Some(name) = ClassName::from_entry_path(entry.name()) else {
                continue;
            };
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            entries.insert(name, Arc::from(bytes.into_boxed_slice()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &ClassName) -> Option<Arc<[u8]>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &ClassName) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &ClassName> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_ids_are_unique() {
        let a = LoaderId::next();
        let b = LoaderId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_definition_is_identity() {
        let bytes: Arc<[u8]> = Arc::from(vec![0u8; 4].into_boxed_slice());
        let a = ClassRecord::define(
            ClassName::from("a.Main"),
            bytes.clone(),
            ClassOrigin::Plugin(LoaderId::next()),
            "/plugins/a.jar",
        );
        let b = ClassRecord::define(
            ClassName::from("a.Main"),
            bytes,
            ClassOrigin::Plugin(LoaderId::next()),
            "/plugins/a.jar",
        );
        assert!(ClassRecord::same_definition(&a, &a.clone()));
        assert!(!ClassRecord::same_definition(&a, &b));
    }

    #[test]
    fn test_declared_singleton_from_name_suffix() {
        let bytes: Arc<[u8]> = Arc::from(Vec::new().into_boxed_slice());
        let class = ClassRecord::define(
            ClassName::from("a.Main$"),
            bytes,
            ClassOrigin::Plugin(LoaderId::next()),
            "/plugins/a.jar",
        );
        assert!(class.declared_singleton());
    }

    #[test]
    fn test_metadata_decoding() {
        let record = DescriptorRecord {
            main: true,
            singleton: true,
            ..Default::default()
        };
        let mut bytes = CLASS_MAGIC.to_vec();
        bytes.extend(bincode::serialize(&record).unwrap());
        let decoded = decode_metadata(&bytes).unwrap();
        assert!(decoded.main);
        assert!(decoded.singleton);

        assert!(decode_metadata(b"plain class bytes").is_none());
    }
}
