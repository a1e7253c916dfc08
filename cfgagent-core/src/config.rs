//! Agent configuration file.
//!
//! # File format
//!
//! ```json
//! {
//!   "logLevel": "info",
//!   "pollInterval": 120000,
//!   "sapi": { "url": "http://sapi.example.com" },
//!   "instances": ["<uuid>"],
//!   "localManifestDirs": { "<uuid>": ["/opt/smartdc/vmapi"] },
//!   "localMetadata": { "key": "value" }
//! }
//! ```
//!
//! `localManifestDirs` also accepts a bare list of directories, which only makes
//! sense when exactly one instance is managed. Both shapes are normalized into a
//! [`ManifestDirMap`] by [`AgentConfig::manifest_dirs`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{io_err, CoreError};
use crate::types::{InstanceId, Metadata};

/// Default location of the agent configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/opt/smartdc/config-agent/etc/config.json";

/// Default registration drop-in directory (global context only).
pub const DEFAULT_INSTANCES_DIR: &str = "/opt/smartdc/agents/etc/config-agent.d";

const DEFAULT_SAPI_TIMEOUT_MS: u64 = 30_000;

/// Local manifest directories per instance, after normalization.
pub type ManifestDirMap = BTreeMap<InstanceId, Vec<PathBuf>>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Log output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Connection settings for the configuration authority.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SapiConfig {
    pub url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_sapi_timeout")]
    pub timeout: u64,
}

impl SapiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

/// The two accepted shapes of `localManifestDirs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LocalManifestDirs {
    /// `["/dir/one", "/dir/two"]`: belongs to the single managed instance.
    Shared(Vec<PathBuf>),
    /// `{ "<uuid>": ["/dir/one"] }`
    PerInstance(BTreeMap<InstanceId, Vec<PathBuf>>),
}

impl LocalManifestDirs {
    /// Resolve either shape into a per-instance map.
    ///
    /// The shared shape is rejected unless exactly one instance is managed.
    pub fn normalize(self, instances: &[InstanceId]) -> Result<ManifestDirMap, CoreError> {
        match self {
            LocalManifestDirs::PerInstance(map) => Ok(map),
            LocalManifestDirs::Shared(dirs) => match instances {
                [only] => Ok(BTreeMap::from([(only.clone(), dirs)])),
                _ => Err(CoreError::InvalidConfig(format!(
                    "localManifestDirs given as a list requires exactly one instance, found {}",
                    instances.len()
                ))),
            },
        }
    }
}

/// Parsed contents of the agent configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Base poll interval in milliseconds.
    pub poll_interval: u64,
    pub sapi: SapiConfig,
    #[serde(default)]
    pub instances: Vec<InstanceId>,
    #[serde(default)]
    pub local_manifest_dirs: Option<LocalManifestDirs>,
    #[serde(default)]
    pub local_metadata: Metadata,
    /// Static entries for the `auto` metadata section; derived facts win.
    #[serde(default)]
    pub auto_metadata: Metadata,
    #[serde(default = "default_instances_dir")]
    pub instances_dir: PathBuf,
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    /// Check the requirements serde cannot express.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.log_level.trim().is_empty() {
            return Err(CoreError::InvalidConfig("logLevel must not be empty".to_string()));
        }
        if self.poll_interval == 0 {
            return Err(CoreError::InvalidConfig(
                "pollInterval must be greater than zero".to_string(),
            ));
        }
        if self.sapi.url.trim().is_empty() {
            return Err(CoreError::InvalidConfig("sapi.url must not be empty".to_string()));
        }
        if let Some(bad) = self.instances.iter().find(|i| i.as_str().trim().is_empty()) {
            return Err(CoreError::InvalidConfig(format!(
                "instances contains an empty identifier ({bad:?})"
            )));
        }
        Ok(())
    }

    /// Normalized per-instance manifest directories for `instances`.
    pub fn manifest_dirs(&self, instances: &[InstanceId]) -> Result<ManifestDirMap, CoreError> {
        match &self.local_manifest_dirs {
            Some(dirs) => dirs.clone().normalize(instances),
            None => Ok(ManifestDirMap::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and validate the configuration at `path`.
///
/// Returns `CoreError::ConfigNotFound` if absent,
/// `CoreError::Parse` (with path + line context) on malformed JSON or missing
/// required fields, `CoreError::InvalidConfig` if validation fails.
pub fn load_at(path: &Path) -> Result<AgentConfig, CoreError> {
    if !path.exists() {
        return Err(CoreError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: AgentConfig = serde_json::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper for [`DEFAULT_CONFIG_PATH`].
pub fn load() -> Result<AgentConfig, CoreError> {
    load_at(Path::new(DEFAULT_CONFIG_PATH))
}

fn default_sapi_timeout() -> u64 {
    DEFAULT_SAPI_TIMEOUT_MS
}

fn default_instances_dir() -> PathBuf {
    PathBuf::from(DEFAULT_INSTANCES_DIR)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
