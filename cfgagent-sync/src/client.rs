//! Configuration authority client.
//!
//! [`ConfigClient`] is the fetch boundary the engine talks to; [`SapiClient`]
//! implements it over HTTP. Fetches are conditional: a cached [`ChangeToken`]
//! is sent as `If-None-Match`, and a `304` answer means nothing changed.
//!
//! Calls are blocking; the engine runs them on the blocking thread pool.

use std::time::Duration;

use serde::Deserialize;

use cfgagent_core::{ChangeToken, InstanceId, Manifest, Metadata};

use crate::error::ClientError;

/// A full configuration document for one instance.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub manifests: Vec<Manifest>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Token identifying this version; not part of the document body.
    #[serde(skip)]
    pub token: Option<ChangeToken>,
}

/// Result of a conditional fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The cached token is still current.
    NotModified,
    Modified(InstanceConfig),
}

/// Fetches desired configuration from the authority.
pub trait ConfigClient: Send + Sync {
    /// Fetch `instance`'s configuration. With `token`, the authority may
    /// answer [`FetchOutcome::NotModified`].
    fn fetch(
        &self,
        instance: &InstanceId,
        token: Option<&ChangeToken>,
    ) -> Result<FetchOutcome, ClientError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// [`ConfigClient`] over HTTP: `GET {url}/configs/{instance}`.
#[derive(Debug, Clone)]
pub struct SapiClient {
    base_url: String,
    agent: ureq::Agent,
}

impl SapiClient {
    pub fn new(url: &str, timeout: Duration) -> Self {
        SapiClient {
            base_url: url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn config_url(&self, instance: &InstanceId) -> String {
        format!("{}/configs/{}", self.base_url, instance)
    }
}

impl ConfigClient for SapiClient {
    fn fetch(
        &self,
        instance: &InstanceId,
        token: Option<&ChangeToken>,
    ) -> Result<FetchOutcome, ClientError> {
        let url = self.config_url(instance);
        let mut request = self.agent.get(&url).set("Accept", "application/json");
        if let Some(token) = token {
            request = request.set("If-None-Match", &token.0);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(ClientError::Status { url, status });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(ClientError::Transport {
                    url,
                    message: transport.to_string(),
                });
            }
        };

        match response.status() {
            304 => {
                tracing::debug!(instance = %instance, "configuration not modified");
                Ok(FetchOutcome::NotModified)
            }
            200..=299 => {
                let token = response
                    .header("ETag")
                    .filter(|etag| !etag.is_empty())
                    .map(ChangeToken::from);
                let mut config: InstanceConfig = response
                    .into_json()
                    .map_err(|source| ClientError::Decode {
                        url: url.clone(),
                        source,
                    })?;
                config.token = token;
                tracing::debug!(
                    instance = %instance,
                    manifests = config.manifests.len(),
                    "fetched configuration",
                );
                Ok(FetchOutcome::Modified(config))
            }
            status => Err(ClientError::Status { url, status }),
        }
    }
}
