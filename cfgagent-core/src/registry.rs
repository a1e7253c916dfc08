//! Instance registration drop-ins.
//!
//! # Storage layout
//!
//! ```text
//! /opt/smartdc/agents/etc/config-agent.d/
//!   <anything>.json   { "instance": "<uuid>", "localManifestDirs": ["/dir", ...] }
//! ```
//!
//! The directory is scanned once at startup, in the global context only.
//! Files that are not `.json`, cannot be parsed, or do not have the expected
//! shape are skipped with a warning; none of them is fatal.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::ManifestDirMap;
use crate::error::{io_err, CoreError};
use crate::types::InstanceId;

/// One parsed registration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRegistration {
    pub instance: InstanceId,
    pub local_manifest_dirs: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse a single registration file.
///
/// Returns `CoreError::Parse` if the file is not a well-formed registration.
pub fn load_registration_at(path: &Path) -> Result<InstanceRegistration, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let registration: InstanceRegistration =
        serde_json::from_str(&contents).map_err(|e| CoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    if registration.instance.as_str().trim().is_empty() {
        return Err(CoreError::InvalidConfig(format!(
            "{}: instance must not be empty",
            path.display()
        )));
    }
    Ok(registration)
}

/// Scan `dir` for registration files, sorted by file name.
///
/// A missing or unreadable directory yields no registrations.
pub fn list_registrations_at(dir: &Path) -> Vec<InstanceRegistration> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "cannot read registration directory");
            return vec![];
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    files.sort();

    let mut registrations = Vec::new();
    for file in files {
        let is_json = file
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            tracing::warn!(file = %file.display(), "not a .json file, ignoring");
            continue;
        }
        match load_registration_at(&file) {
            Ok(registration) => registrations.push(registration),
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "invalid registration, ignoring");
            }
        }
    }
    registrations
}

/// Merge registrations into the managed instance list and directory map.
///
/// New instances are appended in registration order; a registration replaces
/// any directories configured for the same instance.
pub fn apply_registrations(
    registrations: Vec<InstanceRegistration>,
    instances: &mut Vec<InstanceId>,
    dirs: &mut ManifestDirMap,
) {
    for registration in registrations {
        if !instances.contains(&registration.instance) {
            instances.push(registration.instance.clone());
        }
        tracing::info!(
            instance = %registration.instance,
            dirs = registration.local_manifest_dirs.len(),
            "registered instance from drop-in",
        );
        dirs.insert(registration.instance, registration.local_manifest_dirs);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
