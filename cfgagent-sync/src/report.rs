//! Outcome reports for one reconciliation pass.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use cfgagent_core::InstanceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOutcome {
    Written,
    Unchanged,
    Failed { error: String },
}

/// What happened to one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestReport {
    pub name: String,
    pub path: PathBuf,
    pub outcome: ManifestOutcome,
}

impl ManifestReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, ManifestOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceOutcome {
    /// The authority reported no change since the cached token.
    NotModified,
    /// A configuration was fetched and its manifests processed.
    Reconciled,
    /// The instance pass failed before any manifest was processed.
    Failed { error: String },
}

/// What happened to one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceReport {
    pub instance: InstanceId,
    pub outcome: InstanceOutcome,
    /// Sorted by manifest name.
    pub manifests: Vec<ManifestReport>,
}

impl InstanceReport {
    pub fn not_modified(instance: InstanceId) -> Self {
        InstanceReport {
            instance,
            outcome: InstanceOutcome::NotModified,
            manifests: Vec::new(),
        }
    }

    pub fn failed(instance: InstanceId, error: impl Into<String>) -> Self {
        InstanceReport {
            instance,
            outcome: InstanceOutcome::Failed {
                error: error.into(),
            },
            manifests: Vec::new(),
        }
    }

    pub fn reconciled(instance: InstanceId, mut manifests: Vec<ManifestReport>) -> Self {
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        InstanceReport {
            instance,
            outcome: InstanceOutcome::Reconciled,
            manifests,
        }
    }

    /// False if the fetch failed or any manifest failed.
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, InstanceOutcome::Failed { .. })
            && self.manifests.iter().all(ManifestReport::is_success)
    }

    pub fn written(&self) -> usize {
        self.manifests
            .iter()
            .filter(|m| m.outcome == ManifestOutcome::Written)
            .count()
    }
}

/// Result of one pass over every managed instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Sorted by instance id.
    pub instances: Vec<InstanceReport>,
}

impl PassReport {
    pub fn is_success(&self) -> bool {
        self.instances.iter().all(InstanceReport::is_success)
    }

    pub fn failed_instances(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances.iter().filter(|i| !i.is_success())
    }

    pub fn written(&self) -> usize {
        self.instances.iter().map(InstanceReport::written).sum()
    }

    /// Log one summary line, plus one line per failed instance.
    pub fn log_summary(&self) {
        let failed = self.failed_instances().count();
        for report in self.failed_instances() {
            let reason = match &report.outcome {
                InstanceOutcome::Failed { error } => error.clone(),
                _ => report
                    .manifests
                    .iter()
                    .filter_map(|m| match &m.outcome {
                        ManifestOutcome::Failed { error } => Some(format!("{}: {error}", m.name)),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("; "),
            };
            tracing::error!(instance = %report.instance, reason = %reason, "instance reconciliation failed");
        }
        tracing::info!(
            started_at = %self.started_at.to_rfc3339(),
            duration_ms = self.duration.as_millis() as u64,
            instances = self.instances.len(),
            failed,
            written = self.written(),
            "reconciliation pass complete",
        );
    }
}
