//! Error types for cfgagent-sync.

use std::path::PathBuf;

use thiserror::Error;

use cfgagent_core::CoreError;
use cfgagent_renderer::RenderError;

/// Errors from reconciling a single manifest.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The manifest itself is unusable (empty name, relative path).
    #[error("invalid manifest: {0}")]
    Invalid(#[from] CoreError),

    /// An error from the rendering engine.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The post-write command could not be started or exited unsuccessfully.
    #[error("post_cmd `{command}` failed: {message}")]
    PostCmd { command: String, message: String },

    /// A spawned task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Display text including the full cause chain.
    pub fn detail(&self) -> String {
        match self {
            SyncError::Render(err) => err.detail(),
            other => other.to_string(),
        }
    }
}

/// Errors from fetching an instance's configuration.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The authority answered with an unexpected status.
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The request never produced a response (connect, DNS, timeout, ...).
    #[error("GET {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The response body was not a valid configuration document.
    #[error("invalid configuration document from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
