//! Error types for cfgagent-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration and manifest loading.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error on load. Includes file path and line context from serde_json.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// The configuration parsed but violates a startup requirement.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A manifest is missing a usable name or target path.
    #[error("invalid manifest '{name}': {reason}")]
    InvalidManifest { name: String, reason: String },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
