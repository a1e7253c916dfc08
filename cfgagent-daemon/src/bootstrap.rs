//! Agent startup: from a loaded configuration to a ready engine.
//!
//! 1. Probe the environment once (zone, host or guest facts).
//! 2. Decide the managed instances. Inside an instance that is exactly the
//!    zone itself; in the global zone it is `instances` from the configuration
//!    plus any registration drop-ins.
//! 3. Normalize `localManifestDirs` and load each instance's local manifests.
//! 4. Build the auto metadata and the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use cfgagent_core::config::ManifestDirMap;
use cfgagent_core::registry::{apply_registrations, list_registrations_at};
use cfgagent_core::store::load_local_manifests;
use cfgagent_core::{AgentConfig, InstanceId, Manifest};
use cfgagent_detector::{gather, AutoMetadataBuilder, FactProbe, ZoneContext};
use cfgagent_renderer::TeraRenderer;
use cfgagent_sync::{ConfigClient, ReconciliationEngine};

use crate::error::DaemonError;

/// A bootstrapped agent, ready to run passes.
#[derive(Clone)]
pub struct Agent {
    pub zone: ZoneContext,
    /// Managed instances in configuration order.
    pub instances: Vec<InstanceId>,
    pub engine: ReconciliationEngine,
}

/// Build an [`Agent`] from `config` using the given probe and authority client.
pub async fn bootstrap(
    config: &AgentConfig,
    probe: Arc<dyn FactProbe>,
    client: Arc<dyn ConfigClient>,
) -> Result<Agent, DaemonError> {
    let facts = tokio::task::spawn_blocking(move || gather(probe.as_ref())).await??;
    let zone = facts.zone.clone();

    let (instances, dirs) = match &zone {
        ZoneContext::Instance(id) => {
            if !config.instances.is_empty() && config.instances != [id.clone()] {
                tracing::warn!(zone = %id, "ignoring configured instances inside a non-global zone");
            }
            let instances = vec![id.clone()];
            let dirs = config.manifest_dirs(&instances)?;
            (instances, dirs)
        }
        ZoneContext::Global => {
            let mut instances = Vec::new();
            for id in &config.instances {
                if !instances.contains(id) {
                    instances.push(id.clone());
                }
            }
            let mut dirs = config.manifest_dirs(&instances)?;
            let drop_in_dir = config.instances_dir.clone();
            let registrations =
                tokio::task::spawn_blocking(move || list_registrations_at(&drop_in_dir)).await?;
            apply_registrations(registrations, &mut instances, &mut dirs);
            (instances, dirs)
        }
    };

    if instances.is_empty() {
        tracing::warn!(zone = %zone, "no instances to manage");
    }
    tracing::info!(zone = %zone, instances = instances.len(), "managing instances");

    let mut local = load_all_local_manifests(&instances, &dirs).await?;
    let auto = AutoMetadataBuilder::with_base(config.auto_metadata.clone()).build(&facts);

    let mut builder = ReconciliationEngine::builder(client, Arc::new(TeraRenderer::new()))
        .auto_metadata(auto)
        .local_metadata(config.local_metadata.clone());
    for id in &instances {
        let manifests = local.remove(id).unwrap_or_default();
        builder = builder.instance(id.clone(), manifests);
    }

    Ok(Agent {
        zone,
        instances,
        engine: builder.build(),
    })
}

/// Load local manifests for every instance in parallel.
async fn load_all_local_manifests(
    instances: &[InstanceId],
    dirs: &ManifestDirMap,
) -> Result<BTreeMap<InstanceId, Vec<Manifest>>, DaemonError> {
    let mut tasks = JoinSet::new();
    for id in instances {
        let id = id.clone();
        let instance_dirs = dirs.get(&id).cloned().unwrap_or_default();
        tasks.spawn_blocking(move || {
            let manifests = load_local_manifests(&instance_dirs);
            tracing::debug!(instance = %id, count = manifests.len(), "loaded local manifests");
            (id, manifests)
        });
    }

    let mut loaded = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (id, manifests) = joined?;
        loaded.insert(id, manifests);
    }
    Ok(loaded)
}
