//! Change-gated file writer and post-write command.
//!
//! ## `FileSynchronizer::sync`
//!
//! 1. Create the parent directory (failure is logged, not fatal).
//! 2. Read the current file; any read failure counts as "no content".
//! 3. Byte-equal content → [`WriteResult::Unchanged`], nothing else happens.
//! 4. Write to `<path>.cfgagent.tmp`, then rename over the target.
//! 5. Run the manifest's `post_cmd`, if any. Its failure is logged only.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::fs;
use tokio::process::Command;

use cfgagent_core::Manifest;

use crate::error::{io_err, SyncError};

const SHELL: &str = "/bin/sh";

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of an individual file sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped; the rendered content matches what is on disk.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path } | WriteResult::Unchanged { path } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// FileSynchronizer
// ---------------------------------------------------------------------------

/// Installs rendered manifests on disk.
#[derive(Debug, Clone, Default)]
pub struct FileSynchronizer {
    shell: Option<PathBuf>,
}

impl FileSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run post-write commands with `shell -c` instead of `/bin/sh -c`.
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        FileSynchronizer {
            shell: Some(shell.into()),
        }
    }

    /// Install `contents` at `manifest.path` if it differs from what is there.
    pub async fn sync(&self, manifest: &Manifest, contents: &str) -> Result<WriteResult, SyncError> {
        let path = manifest.path.as_path();

        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent).await {
                tracing::warn!(dir = %parent.display(), error = %err, "failed to create directory");
            }
        }

        let existing = match fs::read(path).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "no existing file content");
                None
            }
        };

        if existing.as_deref() == Some(contents.as_bytes()) {
            tracing::debug!(manifest = %manifest.name, path = %path.display(), "file unchanged");
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }

        replace_file(path, contents).await?;
        tracing::info!(manifest = %manifest.name, path = %path.display(), "wrote file");

        if let Some(command) = manifest.post_cmd() {
            // Post-write command failures never fail the manifest.
            if let Err(err) = self.post_cmd(command).await {
                tracing::warn!(manifest = %manifest.name, error = %err, "post_cmd failed");
            }
        }

        Ok(WriteResult::Written {
            path: path.to_path_buf(),
        })
    }

    async fn post_cmd(&self, command: &str) -> Result<(), SyncError> {
        let shell = self.shell.as_deref().unwrap_or(Path::new(SHELL));
        tracing::info!(cmd = %command, "running post_cmd");

        let output = Command::new(shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| SyncError::PostCmd {
                command: command.to_string(),
                message: err.to_string(),
            })?;

        if !output.status.success() {
            return Err(SyncError::PostCmd {
                command: command.to_string(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        tracing::debug!(
            cmd = %command,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "post_cmd finished",
        );
        Ok(())
    }
}

/// Replace `path` in full via a sibling temp file, keeping the old mode.
async fn replace_file(path: &Path, contents: &str) -> Result<(), SyncError> {
    let tmp = PathBuf::from(format!("{}.cfgagent.tmp", path.display()));
    fs::write(&tmp, contents).await.map_err(|e| io_err(&tmp, e))?;

    if let Ok(meta) = fs::metadata(path).await {
        if let Err(err) = fs::set_permissions(&tmp, meta.permissions()).await {
            tracing::debug!(path = %tmp.display(), error = %err, "could not copy permissions");
        }
    }

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
