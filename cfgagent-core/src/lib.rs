//! config-agent core library: domain types, agent configuration, registration
//! drop-ins, local manifest store, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes, [`Manifest`] and [`ManifestSet`]
//! - [`config`]: [`AgentConfig`] loading and validation
//! - [`registry`]: per-instance registration files (`config-agent.d/`)
//! - [`store`]: local manifest directories (`sapi_manifests/`)
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod registry;
pub mod store;
pub mod types;

pub use config::{AgentConfig, LocalManifestDirs, LogFormat, ManifestDirMap, SapiConfig};
pub use error::CoreError;
pub use types::{ChangeToken, InstanceId, Manifest, ManifestSet, Metadata};
