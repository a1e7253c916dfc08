//! Local manifest store.
//!
//! # Storage layout
//!
//! ```text
//! <configured dir>/
//!   sapi_manifests/
//!     <manifest>/
//!       manifest.json   { "name": "...", "path": "/abs/target", "post_cmd": "..." }
//!       template
//! ```
//!
//! Local manifests override authority manifests sharing a name or path. The
//! store is read once per instance at startup; unreadable directories and
//! malformed manifests are skipped with a warning.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{io_err, CoreError};
use crate::types::Manifest;

/// Subdirectory holding manifests inside each configured directory.
pub const MANIFEST_DIR_NAME: &str = "sapi_manifests";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const TEMPLATE_FILE: &str = "template";

#[derive(Debug, Deserialize)]
struct ManifestFile {
    name: String,
    path: PathBuf,
    #[serde(default)]
    post_cmd: Option<String>,
}

// ---------------------------------------------------------------------------
// Directory discovery
// ---------------------------------------------------------------------------

/// The `sapi_manifests` directory for a configured directory.
///
/// Relative paths are resolved against the working directory. A directory that
/// already ends in `sapi_manifests` is used as-is.
pub fn manifest_search_dir(dir: &Path) -> PathBuf {
    let dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    };
    if dir.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_DIR_NAME) {
        dir
    } else {
        dir.join(MANIFEST_DIR_NAME)
    }
}

/// Keep the search directories that can actually be read, in input order.
pub fn find_manifest_dirs(dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .map(|dir| manifest_search_dir(dir))
        .filter(|dir| match std::fs::read_dir(dir) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "failed to read manifest directory");
                false
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read one manifest from `<dir>/manifest.json` and `<dir>/template`.
pub fn read_manifest_at(dir: &Path) -> Result<Manifest, CoreError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = std::fs::read_to_string(&manifest_path).map_err(|e| io_err(&manifest_path, e))?;
    let file: ManifestFile = serde_json::from_str(&raw).map_err(|e| CoreError::Parse {
        path: manifest_path.clone(),
        source: e,
    })?;

    let template_path = dir.join(TEMPLATE_FILE);
    let template =
        std::fs::read_to_string(&template_path).map_err(|e| io_err(&template_path, e))?;

    let manifest = Manifest {
        name: file.name,
        template,
        path: file.path,
        post_cmd: file.post_cmd,
    };
    manifest.validate()?;
    Ok(manifest)
}

/// Read every manifest under one `sapi_manifests` directory, sorted by entry name.
pub fn read_manifests_in(dir: &Path) -> Result<Vec<Manifest>, CoreError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    entries.sort();

    let mut manifests = Vec::with_capacity(entries.len());
    for entry in entries {
        match read_manifest_at(&entry) {
            Ok(manifest) => manifests.push(manifest),
            Err(err) => {
                tracing::warn!(dir = %entry.display(), error = %err, "skipping unreadable local manifest");
            }
        }
    }
    tracing::debug!(dir = %dir.display(), count = manifests.len(), "read local manifests");
    Ok(manifests)
}

/// Load all local manifests for one instance from its configured directories.
///
/// Order follows `dirs`, then entry name within each directory.
pub fn load_local_manifests(dirs: &[PathBuf]) -> Vec<Manifest> {
    let mut manifests = Vec::new();
    for dir in find_manifest_dirs(dirs) {
        match read_manifests_in(&dir) {
            Ok(found) => manifests.extend(found),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "failed to read manifest directory");
            }
        }
    }
    manifests
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(root: &Path, entry: &str, json: &str, template: &str) {
        let dir = root.join(MANIFEST_DIR_NAME).join(entry);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(MANIFEST_FILE), json).expect("write manifest.json");
        fs::write(dir.join(TEMPLATE_FILE), template).expect("write template");
    }

    #[test]
    fn search_dir_appends_suffix_once() {
        assert_eq!(
            manifest_search_dir(Path::new("/opt/smartdc/vmapi")),
            PathBuf::from("/opt/smartdc/vmapi/sapi_manifests")
        );
        assert_eq!(
            manifest_search_dir(Path::new("/opt/smartdc/vmapi/sapi_manifests")),
            PathBuf::from("/opt/smartdc/vmapi/sapi_manifests")
        );
    }

    #[test]
    fn reads_manifest_with_template() {
        let tmp = TempDir::new().expect("tempdir");
        write_manifest(
            tmp.path(),
            "vmapi",
            r#"{"name": "vmapi", "path": "/opt/smartdc/vmapi/config.json", "post_cmd": "svcadm restart vmapi"}"#,
            "{\"port\": {{PORT}}}",
        );
        let manifests = load_local_manifests(&[tmp.path().to_path_buf()]);
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].name, "vmapi");
        assert_eq!(manifests[0].template, "{\"port\": {{PORT}}}");
        assert_eq!(manifests[0].post_cmd(), Some("svcadm restart vmapi"));
    }

    #[test]
    fn unreadable_directory_is_skipped() {
        let tmp = TempDir::new().expect("tempdir");
        let manifests = load_local_manifests(&[tmp.path().join("does-not-exist")]);
        assert!(manifests.is_empty());
    }

    #[test]
    fn manifest_without_template_is_skipped() {
        let tmp = TempDir::new().expect("tempdir");
        write_manifest(tmp.path(), "good", r#"{"name": "good", "path": "/etc/good"}"#, "ok");
        let broken = tmp.path().join(MANIFEST_DIR_NAME).join("broken");
        fs::create_dir_all(&broken).expect("mkdir");
        fs::write(broken.join(MANIFEST_FILE), r#"{"name": "broken", "path": "/etc/broken"}"#)
            .expect("write");

        let manifests = load_local_manifests(&[tmp.path().to_path_buf()]);
        let names: Vec<_> = manifests.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["good"]);
    }
}
