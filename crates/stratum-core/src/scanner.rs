//! Descriptor scanning and main-class selection.
//!
//! The scanner walks every class entry of one archive, hands the raw bytes
//! to a pluggable [`MetadataExtractor`], and folds the resulting descriptors
//! into at most one best main-class candidate. How metadata is physically
//! encoded in the bytecode is the extractor's business; the selection
//! algorithm only sees [`ArchiveDescriptor`] values.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use stratum_sdk::{ArchiveDescriptor, ClassName, VersionId, CLASS_ENTRY_SUFFIX, CLASS_MAGIC};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Archive entry that marks a host-native plugin; unexpected in a managed
/// archive and ignored with a warning.
const NATIVE_METADATA_ENTRY: &str = "plugin.yml";

/// Extracts descriptor metadata out of one class entry's raw bytes.
///
/// Returns `Ok(None)` when the entry is synthetic or otherwise not a class
/// candidate at all. Malformed-but-parseable bytes still produce a
/// descriptor (an empty one); only unreadable bytes fail, with
/// [`Error::MalformedClass`], which the archive scan skips over.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, entry: &str, bytes: &[u8]) -> Result<Option<ArchiveDescriptor>>;
}

/// Default extractor for the Stratum class-entry encoding: a [`CLASS_MAGIC`]
/// prefix followed by a bincode descriptor record. Entries without the magic
/// are plain classes and yield an empty descriptor.
#[derive(Debug, Default)]
pub struct BincodeExtractor;

impl MetadataExtractor for BincodeExtractor {
    fn extract(&self, entry: &str, bytes: &[u8]) -> Result<Option<ArchiveDescriptor>> {
        if bytes.is_empty() {
            return Err(Error::MalformedClass {
                entry: entry.to_string(),
                reason: "empty class entry".to_string(),
            });
        }

        let Some(payload) = bytes.strip_prefix(&CLASS_MAGIC[..]) else {
            // Plain class: participates in selection but can never win.
            return Ok(Some(ArchiveDescriptor::default()));
        };

        let record: stratum_sdk::DescriptorRecord =
            bincode::deserialize(payload).map_err(|e| Error::MalformedClass {
                entry: entry.to_string(),
                reason: e.to_string(),
            })?;

        let main_class = if record.main {
            ClassName::from_entry_path(entry)
        } else {
            None
        };

        Ok(Some(ArchiveDescriptor {
            main_class,
            extends_base_plugin: record.extends_base_plugin,
            runtime_version: record.runtime_version.map(VersionId::new),
            compat_version: record.compat_version,
        }))
    }
}

/// Total order over descriptors; `Less` is the better candidate.
///
/// 1. a present main class beats an absent one;
/// 2. not directly extending the base plugin type beats extending it
///    (favors the most-derived declaration);
/// 3. shallower package depth;
/// 4. lexicographically smaller fully-qualified name.
pub fn candidate_order(a: &ArchiveDescriptor, b: &ArchiveDescriptor) -> Ordering {
    let (a_main, b_main) = match (&a.main_class, &b.main_class) {
        (Some(a_main), Some(b_main)) => (a_main, b_main),
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => return a.extends_base_plugin.cmp(&b.extends_base_plugin),
    };

    a.extends_base_plugin
        .cmp(&b.extends_base_plugin)
        .then_with(|| a_main.package_depth().cmp(&b_main.package_depth()))
        .then_with(|| a_main.cmp(b_main))
}

/// Select the best main-class candidate, or `None` when no descriptor names
/// a main class at all.
pub fn select_main_class(
    descriptors: impl IntoIterator<Item = ArchiveDescriptor>,
) -> Option<ArchiveDescriptor> {
    descriptors
        .into_iter()
        .min_by(candidate_order)
        .filter(ArchiveDescriptor::has_main_class)
}

/// Scan every class entry of the archive at `path` and select the best
/// main-class candidate.
///
/// Unreadable entries are skipped with a debug log; a `plugin.yml` entry
/// inside a managed archive is warned about and ignored. An unreadable
/// archive fails with the underlying io/zip error.
pub fn scan_archive(
    path: &Path,
    extractor: &dyn MetadataExtractor,
) -> Result<Option<ArchiveDescriptor>> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    let mut best: Option<ArchiveDescriptor> = None;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.is_file() {
            continue;
        }
        let entry_name = entry.name().to_string();

        if entry_name == NATIVE_METADATA_ENTRY {
            warn!(
                archive = %path.display(),
                "found plugin.yml in managed plugin archive, ignoring"
            );
            continue;
        }
        if !entry_name.ends_with(CLASS_ENTRY_SUFFIX) {
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;

        let descriptor = match extractor.extract(&entry_name, &bytes) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => continue,
            Err(e) => {
                debug!(archive = %path.display(), entry = %entry_name, error = %e,
                    "skipping unreadable class entry");
                continue;
            }
        };

        if descriptor.extends_base_plugin && descriptor.runtime_version.is_none() {
            warn!(
                archive = %path.display(),
                entry = %entry_name,
                "class extends the base plugin type but declares no runtime version"
            );
        }

        best = Some(match best.take() {
            None => descriptor,
            Some(current) => {
                if candidate_order(&descriptor, &current) == Ordering::Less {
                    descriptor
                } else {
                    current
                }
            }
        });
    }

    Ok(best.filter(ArchiveDescriptor::has_main_class))
}
