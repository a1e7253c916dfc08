use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error surface for agent startup and the reconciliation loop.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] cfgagent_core::CoreError),

    #[error("cannot determine zone: {0}")]
    Probe(#[from] cfgagent_detector::ProbeError),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("signal handler failed: {0}")]
    Signal(String),

    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("reconciliation failed for {} instance(s): {}", .0.len(), .0.join(", "))]
    PassFailed(Vec<String>),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
