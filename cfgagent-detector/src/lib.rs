//! Environment facts for `cfgagent-detector`.
//!
//! A [`FactProbe`] answers three read-only questions about the machine the agent
//! runs on: which zone are we in, what does the host look like, and what does a
//! guest instance look like from the inside. [`AutoMetadataBuilder`] turns those
//! answers into the `auto` metadata section templates render against.
//!
//! Every probe may fail on its own. [`gather`] only treats a failure to name the
//! current zone as fatal; missing host or guest facts just mean missing keys.

pub mod auto;
pub mod facts;
pub mod probe;

use std::path::PathBuf;

use thiserror::Error;

pub use auto::{AutoMetadata, AutoMetadataBuilder};
pub use facts::{
    Facts, GuestFacts, GuestNic, HostFacts, PhysicalInterface, VirtualInterface, ZoneContext,
};
pub use probe::SystemProbe;

use cfgagent_core::InstanceId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from running or parsing a system probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to parse output of {command}: {message}")]
    Parse { command: PathBuf, message: String },
}

// ---------------------------------------------------------------------------
// Probe boundary
// ---------------------------------------------------------------------------

/// Read-only source of environment facts.
pub trait FactProbe: Send + Sync {
    /// The zone the agent is running in.
    fn current_zone(&self) -> Result<ZoneContext, ProbeError>;

    /// Identity and network interfaces of the physical host (global context).
    fn host_facts(&self) -> Result<HostFacts, ProbeError>;

    /// Identity and NICs as seen from inside `instance`.
    fn guest_facts(&self, instance: &InstanceId) -> Result<GuestFacts, ProbeError>;
}

/// Collect everything the builder needs from `probe`.
///
/// Only the zone lookup can fail; host or guest probe failures are logged and
/// leave the corresponding facts empty.
pub fn gather(probe: &dyn FactProbe) -> Result<Facts, ProbeError> {
    let zone = probe.current_zone()?;
    tracing::debug!(zone = %zone, "determined zone context");

    let mut facts = Facts::new(zone.clone());
    match &zone {
        ZoneContext::Global => match probe.host_facts() {
            Ok(host) => facts.host = Some(host),
            Err(err) => tracing::warn!(error = %err, "failed to probe host facts"),
        },
        ZoneContext::Instance(instance) => match probe.guest_facts(instance) {
            Ok(guest) => facts.guest = Some(guest),
            Err(err) => tracing::warn!(instance = %instance, error = %err, "failed to probe guest facts"),
        },
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenHost;

    impl FactProbe for BrokenHost {
        fn current_zone(&self) -> Result<ZoneContext, ProbeError> {
            Ok(ZoneContext::Global)
        }
        fn host_facts(&self) -> Result<HostFacts, ProbeError> {
            Err(ProbeError::Parse {
                command: PathBuf::from("/usr/bin/sysinfo"),
                message: "garbage".to_string(),
            })
        }
        fn guest_facts(&self, _instance: &InstanceId) -> Result<GuestFacts, ProbeError> {
            unreachable!("global context never asks for guest facts")
        }
    }

    #[test]
    fn host_probe_failure_is_not_fatal() {
        let facts = gather(&BrokenHost).expect("gather");
        assert_eq!(facts.zone, ZoneContext::Global);
        assert!(facts.host.is_none());
        assert!(facts.guest.is_none());
    }
}
