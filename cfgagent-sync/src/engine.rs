//! One reconciliation pass across every managed instance.
//!
//! ## Per instance
//!
//! 1. Conditional fetch with the cached change token. `NotModified` ends the
//!    instance pass successfully; a fetch error fails it and keeps the token.
//! 2. A token in the response replaces the cached one.
//! 3. Resolve authority manifests against the instance's local manifests.
//! 4. Build the render context: authority metadata, local overlay, `auto`.
//! 5. Per manifest, in parallel: render → write → post_cmd. A failure stops
//!    that manifest only.
//!
//! Instances run in parallel too. Each instance's state sits behind its own
//! lock, so a refresh that overlaps a scheduled pass waits for it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use cfgagent_core::{ChangeToken, InstanceId, Manifest, ManifestSet, Metadata};
use cfgagent_detector::AutoMetadata;
use cfgagent_renderer::{RenderContext, Renderer};

use crate::client::{ConfigClient, FetchOutcome, InstanceConfig};
use crate::error::SyncError;
use crate::report::{InstanceReport, ManifestOutcome, ManifestReport, PassReport};
use crate::resolver::resolve;
use crate::writer::FileSynchronizer;

/// Mutable per-instance state owned by the engine.
#[derive(Debug, Default)]
struct InstanceState {
    token: Option<ChangeToken>,
    local_manifests: Vec<Manifest>,
}

struct Inner {
    client: Arc<dyn ConfigClient>,
    renderer: Arc<dyn Renderer>,
    synchronizer: FileSynchronizer,
    auto: AutoMetadata,
    local_metadata: Metadata,
    instances: BTreeMap<InstanceId, Arc<Mutex<InstanceState>>>,
}

/// Drives reconciliation passes. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<Inner>,
}

/// Builder for [`ReconciliationEngine`].
pub struct EngineBuilder {
    client: Arc<dyn ConfigClient>,
    renderer: Arc<dyn Renderer>,
    synchronizer: FileSynchronizer,
    auto: AutoMetadata,
    local_metadata: Metadata,
    instances: BTreeMap<InstanceId, InstanceState>,
}

impl EngineBuilder {
    pub fn new(client: Arc<dyn ConfigClient>, renderer: Arc<dyn Renderer>) -> Self {
        EngineBuilder {
            client,
            renderer,
            synchronizer: FileSynchronizer::new(),
            auto: AutoMetadata::default(),
            local_metadata: Metadata::new(),
            instances: BTreeMap::new(),
        }
    }

    pub fn auto_metadata(mut self, auto: AutoMetadata) -> Self {
        self.auto = auto;
        self
    }

    pub fn local_metadata(mut self, local_metadata: Metadata) -> Self {
        self.local_metadata = local_metadata;
        self
    }

    pub fn synchronizer(mut self, synchronizer: FileSynchronizer) -> Self {
        self.synchronizer = synchronizer;
        self
    }

    /// Manage `instance` with the given local manifests. Repeating an
    /// instance replaces its manifests.
    pub fn instance(mut self, instance: InstanceId, local_manifests: Vec<Manifest>) -> Self {
        self.instances.insert(
            instance,
            InstanceState {
                token: None,
                local_manifests,
            },
        );
        self
    }

    pub fn build(self) -> ReconciliationEngine {
        ReconciliationEngine {
            inner: Arc::new(Inner {
                client: self.client,
                renderer: self.renderer,
                synchronizer: self.synchronizer,
                auto: self.auto,
                local_metadata: self.local_metadata,
                instances: self
                    .instances
                    .into_iter()
                    .map(|(id, state)| (id, Arc::new(Mutex::new(state))))
                    .collect(),
            }),
        }
    }
}

impl ReconciliationEngine {
    pub fn builder(client: Arc<dyn ConfigClient>, renderer: Arc<dyn Renderer>) -> EngineBuilder {
        EngineBuilder::new(client, renderer)
    }

    /// Managed instances, sorted.
    pub fn instances(&self) -> impl Iterator<Item = &InstanceId> {
        self.inner.instances.keys()
    }

    /// The change token currently cached for `instance`.
    pub async fn cached_token(&self, instance: &InstanceId) -> Option<ChangeToken> {
        let state = self.inner.instances.get(instance)?;
        let token = state.lock().await.token.clone();
        token
    }

    /// Run one pass over every instance, in parallel.
    pub async fn reconcile_all(&self) -> PassReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut tasks = JoinSet::new();
        let mut pending: BTreeSet<InstanceId> = BTreeSet::new();
        for instance in self.inner.instances.keys() {
            pending.insert(instance.clone());
            let engine = self.clone();
            let instance = instance.clone();
            tasks.spawn(async move { engine.reconcile_instance(&instance).await });
        }

        let mut reports = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    pending.remove(&report.instance);
                    reports.push(report);
                }
                Err(err) => tracing::error!(error = %err, "instance task failed"),
            }
        }
        for lost in pending {
            reports.push(InstanceReport::failed(lost, "reconciliation task aborted"));
        }
        reports.sort_by(|a, b| a.instance.cmp(&b.instance));

        PassReport {
            started_at,
            duration: clock.elapsed(),
            instances: reports,
        }
    }

    /// Run one pass for a single instance.
    pub async fn reconcile_instance(&self, instance: &InstanceId) -> InstanceReport {
        let Some(state) = self.inner.instances.get(instance) else {
            return InstanceReport::failed(instance.clone(), "instance is not managed");
        };
        let mut state = state.lock().await;

        let client = Arc::clone(&self.inner.client);
        let token = state.token.clone();
        let id = instance.clone();
        let fetched = tokio::task::spawn_blocking(move || client.fetch(&id, token.as_ref())).await;

        let config = match fetched {
            Ok(Ok(FetchOutcome::NotModified)) => {
                tracing::debug!(instance = %instance, "configuration unchanged, nothing to do");
                return InstanceReport::not_modified(instance.clone());
            }
            Ok(Ok(FetchOutcome::Modified(config))) => config,
            Ok(Err(err)) => {
                tracing::error!(instance = %instance, error = %err, "failed to fetch configuration");
                return InstanceReport::failed(instance.clone(), err.to_string());
            }
            Err(err) => {
                let err = SyncError::from(err);
                tracing::error!(instance = %instance, error = %err, "fetch task failed");
                return InstanceReport::failed(instance.clone(), err.to_string());
            }
        };

        let InstanceConfig {
            manifests,
            metadata,
            token,
        } = config;
        // A response without a token keeps the cached one.
        if let Some(token) = token {
            state.token = Some(token);
        }

        let resolved = resolve(manifests, &state.local_manifests);
        let auto = self.inner.auto.for_instance(instance);
        let context = RenderContext::build(instance, &metadata, &self.inner.local_metadata, &auto);
        let metadata = Arc::new(context.into_metadata());

        let reports = self.reconcile_manifests(instance, resolved, metadata).await;
        InstanceReport::reconciled(instance.clone(), reports)
    }

    async fn reconcile_manifests(
        &self,
        instance: &InstanceId,
        manifests: ManifestSet,
        metadata: Arc<Metadata>,
    ) -> Vec<ManifestReport> {
        let mut tasks = JoinSet::new();
        let mut pending: BTreeMap<String, PathBuf> = BTreeMap::new();

        for manifest in manifests {
            pending.insert(manifest.name.clone(), manifest.path.clone());
            let renderer = Arc::clone(&self.inner.renderer);
            let synchronizer = self.inner.synchronizer.clone();
            let metadata = Arc::clone(&metadata);
            let instance = instance.clone();
            tasks.spawn(async move {
                let outcome = match reconcile_manifest(&*renderer, &synchronizer, &manifest, &metadata).await {
                    Ok(true) => ManifestOutcome::Written,
                    Ok(false) => ManifestOutcome::Unchanged,
                    Err(err) => {
                        let error = err.detail();
                        tracing::error!(
                            instance = %instance,
                            manifest = %manifest.name,
                            path = %manifest.path.display(),
                            error = %error,
                            "failed to reconcile manifest",
                        );
                        ManifestOutcome::Failed { error }
                    }
                };
                ManifestReport {
                    name: manifest.name,
                    path: manifest.path,
                    outcome,
                }
            });
        }

        let mut reports = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    pending.remove(&report.name);
                    reports.push(report);
                }
                Err(err) => tracing::error!(instance = %instance, error = %err, "manifest task failed"),
            }
        }
        for (name, path) in pending {
            reports.push(ManifestReport {
                name,
                path,
                outcome: ManifestOutcome::Failed {
                    error: "manifest task aborted".to_string(),
                },
            });
        }
        reports
    }
}

/// Render → write → post_cmd for one manifest. `Ok(true)` if the file was written.
async fn reconcile_manifest(
    renderer: &dyn Renderer,
    synchronizer: &FileSynchronizer,
    manifest: &Manifest,
    metadata: &Metadata,
) -> Result<bool, SyncError> {
    manifest.validate()?;
    let contents = renderer.render(&manifest.template, metadata)?;
    let result = synchronizer.sync(manifest, &contents).await?;
    Ok(result.written())
}
