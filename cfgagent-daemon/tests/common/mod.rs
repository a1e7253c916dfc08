//! In-memory probe and authority shared by the daemon tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use cfgagent_core::{ChangeToken, InstanceId, Manifest};
use cfgagent_detector::{FactProbe, GuestFacts, HostFacts, ProbeError, ZoneContext};
use cfgagent_sync::{ClientError, ConfigClient, FetchOutcome, InstanceConfig};

pub struct FakeProbe {
    pub zone: Option<String>,
}

impl FakeProbe {
    pub fn zone(name: &str) -> Self {
        FakeProbe {
            zone: Some(name.to_string()),
        }
    }

    pub fn broken() -> Self {
        FakeProbe { zone: None }
    }
}

impl FactProbe for FakeProbe {
    fn current_zone(&self) -> Result<ZoneContext, ProbeError> {
        match &self.zone {
            Some(zone) => Ok(ZoneContext::from_zonename(zone)),
            None => Err(ProbeError::Parse {
                command: PathBuf::from("/usr/bin/zonename"),
                message: "empty zone name".to_string(),
            }),
        }
    }

    fn host_facts(&self) -> Result<HostFacts, ProbeError> {
        Ok(HostFacts {
            server_uuid: Some("server-1".to_string()),
            ..HostFacts::default()
        })
    }

    fn guest_facts(&self, _instance: &InstanceId) -> Result<GuestFacts, ProbeError> {
        Ok(GuestFacts::default())
    }
}

/// Serves a fixed manifest list per instance; instances without one fail.
#[derive(Default)]
pub struct FakeClient {
    pub manifests: Mutex<HashMap<InstanceId, Vec<Manifest>>>,
    pub fetches: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeClient {
    pub fn serve(self, instance: &str, manifests: Vec<Manifest>) -> Self {
        self.manifests
            .lock()
            .expect("lock")
            .insert(InstanceId::from(instance), manifests);
        self
    }

    /// Hold every fetch open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ConfigClient for FakeClient {
    fn fetch(
        &self,
        instance: &InstanceId,
        _token: Option<&ChangeToken>,
    ) -> Result<FetchOutcome, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.manifests.lock().expect("lock").get(instance) {
            Some(manifests) => Ok(FetchOutcome::Modified(InstanceConfig {
                manifests: manifests.clone(),
                ..InstanceConfig::default()
            })),
            None => Err(ClientError::Status {
                url: format!("http://sapi/configs/{instance}"),
                status: 404,
            }),
        }
    }
}
