//! Render context: the merged metadata a manifest's template is rendered against.
//!
//! Overlay order, lowest to highest precedence:
//!
//! 1. metadata supplied by the authority for the instance;
//! 2. the statically configured local metadata overlay;
//! 3. the reserved [`AUTO_KEY`] section, always owned by the agent.

use serde_json::Value;

use cfgagent_core::{InstanceId, Metadata};

/// Reserved key holding locally derived facts.
pub const AUTO_KEY: &str = "auto";

/// Fully merged metadata for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    metadata: Metadata,
}

impl RenderContext {
    /// Merge authority metadata, the local overlay and the auto section.
    ///
    /// A pre-existing `auto` key from either source is discarded with a warning.
    pub fn build(
        instance: &InstanceId,
        authority: &Metadata,
        local: &Metadata,
        auto: &Metadata,
    ) -> Self {
        let mut metadata = authority.clone();

        for (key, value) in local {
            if metadata.contains_key(key) {
                tracing::debug!(instance = %instance, key = %key, "overwriting metadata key with local metadata");
            }
            metadata.insert(key.clone(), value.clone());
        }

        if let Some(old) = metadata.get(AUTO_KEY) {
            tracing::warn!(
                instance = %instance,
                old_auto = %old,
                "overwriting existing \"metadata.auto\" section",
            );
        }
        metadata.insert(AUTO_KEY.to_string(), Value::Object(auto.clone()));

        RenderContext { metadata }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn into_metadata(self) -> Metadata {
        self.metadata
    }
}
