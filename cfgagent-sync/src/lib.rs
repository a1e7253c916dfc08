//! # cfgagent-sync
//!
//! The reconciliation pipeline: fetch an instance's configuration from the
//! authority, [`resolve`] it against local manifests, render every manifest
//! and install the result with change-gated writes.
//!
//! [`ReconciliationEngine::reconcile_all`] runs one pass over every managed
//! instance and returns a [`PassReport`]. Scheduling passes is the daemon's job.

pub mod client;
pub mod engine;
pub mod error;
pub mod report;
pub mod resolver;
pub mod writer;

pub use client::{ConfigClient, FetchOutcome, InstanceConfig, SapiClient};
pub use engine::{EngineBuilder, ReconciliationEngine};
pub use error::{ClientError, SyncError};
pub use report::{InstanceOutcome, InstanceReport, ManifestOutcome, ManifestReport, PassReport};
pub use resolver::resolve;
pub use writer::{FileSynchronizer, WriteResult};
