//! Error taxonomy of the loading engine.
//!
//! Recovery rules: a `MalformedClass` is local to one archive entry and the
//! scan skips it; an `InvalidDescription` aborts loading one archive without
//! affecting others; a `RuntimeResolution` failure never poisons the registry
//! for future retries; resource-release failures during unload are logged
//! and swallowed by the orchestrator.

use std::path::PathBuf;

use stratum_sdk::{ClassName, PluginError, VersionId};
use thiserror::Error;

/// Errors surfaced by the loading engine.
#[derive(Debug, Error)]
pub enum Error {
    /// One class entry was unreadable. Scanning skips the entry.
    #[error("malformed class entry {entry}: {reason}")]
    MalformedClass { entry: String, reason: String },

    /// The archive could not be resolved to a loadable plugin.
    #[error("invalid plugin description for {}: {source}", path.display())]
    InvalidDescription {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// No class in the archive is a main-class candidate.
    #[error("no main class candidate found in {}", path.display())]
    NoMainClass { path: PathBuf },

    /// The selected main class declares no runtime-version requirement.
    #[error("main class {class} declares no runtime version requirement")]
    MissingRuntimeVersion { class: ClassName },

    /// The runtime-library binary for a version could not be located or
    /// loaded.
    #[error("could not resolve runtime library {version}: {reason}")]
    RuntimeResolution { version: VersionId, reason: String },

    /// A declared dependency is not present among loaded plugins.
    #[error("unknown dependency {dependency} while loading plugin {plugin}")]
    UnknownDependency { plugin: String, dependency: String },

    /// `load` was called for a file that never passed `describe`.
    #[error("{} does not contain a managed plugin", path.display())]
    InvalidPlugin { path: PathBuf },

    /// Obtaining a plugin instance from the main class failed.
    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    /// Two plugins resolved to the same case-insensitive name.
    #[error("duplicate plugin name: {name}")]
    DuplicateName { name: String },

    /// A class could not be found through the loader chain.
    #[error("class {name} not found in any loaded plugin or runtime")]
    ClassNotFound { name: ClassName },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a cause as an archive-level description failure.
    pub fn invalid_description(path: impl Into<PathBuf>, source: Error) -> Self {
        Error::InvalidDescription {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Reasons a resolved main class could not yield a living plugin instance.
#[derive(Debug, Error)]
pub enum InstantiationError {
    /// The singleton slot exists but could not be read.
    #[error("could not access the singleton slot of {class}: {reason}")]
    InaccessibleSingleton { class: ClassName, reason: String },

    /// The zero-argument constructor exists but is not public.
    #[error("the constructor of {class} is not public")]
    InaccessibleConstructor { class: ClassName },

    /// The constructor ran and failed.
    #[error("the constructor of {class} failed: {source}")]
    ConstructorFailed {
        class: ClassName,
        #[source]
        source: PluginError,
    },

    /// No zero-argument constructor is declared.
    #[error("no zero-argument constructor found in {class}")]
    MissingConstructor { class: ClassName },

    /// The class shape admits no instance at all.
    #[error("class {class} cannot be instantiated: {reason}")]
    NotInstantiable { class: ClassName, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
