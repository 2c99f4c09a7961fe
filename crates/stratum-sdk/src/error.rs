//! Errors raised from plugin-authored code.

use thiserror::Error;

/// Error a plugin's own code (factory or lifecycle hook) may raise back into
/// the host.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin's factory refused to build an instance.
    #[error("construction failed: {0}")]
    ConstructionFailed(String),

    /// A lifecycle hook failed.
    #[error("lifecycle hook failed: {0}")]
    HookFailed(String),

    /// Plugin-defined failure.
    #[error("{0}")]
    Custom(String),
}

pub type PluginResult<T> = std::result::Result<T, PluginError>;
