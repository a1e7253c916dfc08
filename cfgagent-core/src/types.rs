//! Domain types shared by every config-agent crate.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Free-form metadata supplied by the authority (and the local overlay).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of one managed instance: usually a UUID, or [`InstanceId::GLOBAL`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Zone name reported by the host itself.
    pub const GLOBAL: &'static str = "global";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when this identifier names the host's global context.
    pub fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque change token (an HTTP entity tag) returned by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(pub String);

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ChangeToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChangeToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A configuration manifest: named template, install path, optional post-write command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    /// Template source, rendered against the instance metadata.
    pub template: String,
    /// Absolute path of the installed file.
    pub path: PathBuf,
    /// Shell command run after the file is (re)written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_cmd: Option<String>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            path: path.into(),
            post_cmd: None,
        }
    }

    pub fn with_post_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.post_cmd = Some(cmd.into());
        self
    }

    /// Reject manifests that cannot be installed: empty name or relative path.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidManifest {
                name: self.name.clone(),
                reason: "name is empty".to_string(),
            });
        }
        if !self.path.is_absolute() {
            return Err(CoreError::InvalidManifest {
                name: self.name.clone(),
                reason: format!("path {} is not absolute", self.path.display()),
            });
        }
        Ok(())
    }

    /// An empty `post_cmd` is treated the same as an absent one.
    pub fn post_cmd(&self) -> Option<&str> {
        self.post_cmd
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }
}

// ---------------------------------------------------------------------------
// ManifestSet
// ---------------------------------------------------------------------------

/// Resolved manifests for one instance, keyed by name.
///
/// Iteration is ordered by manifest name. Path uniqueness is maintained by the
/// resolver that builds the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSet {
    manifests: BTreeMap<String, Manifest>,
}

impl ManifestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert by name, returning the manifest previously stored under that name.
    pub fn insert(&mut self, manifest: Manifest) -> Option<Manifest> {
        self.manifests.insert(manifest.name.clone(), manifest)
    }

    pub fn remove(&mut self, name: &str) -> Option<Manifest> {
        self.manifests.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Manifest> {
        self.manifests.get(name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.manifests.contains_key(name)
    }

    /// Name of the manifest installed at `path`, if any.
    pub fn name_for_path(&self, path: &Path) -> Option<&str> {
        self.manifests
            .values()
            .find(|m| m.path == path)
            .map(|m| m.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.manifests.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests.values()
    }
}

impl IntoIterator for ManifestSet {
    type Item = Manifest;
    type IntoIter = std::collections::btree_map::IntoValues<String, Manifest>;

    fn into_iter(self) -> Self::IntoIter {
        self.manifests.into_values()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
