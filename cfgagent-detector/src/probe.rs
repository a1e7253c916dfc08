//! [`SystemProbe`]: facts from the platform's read-only command-line tools.
//!
//! | fact                 | global context            | inside an instance            |
//! |----------------------|---------------------------|-------------------------------|
//! | zone                 | `zonename`                | `zonename`                    |
//! | server / datacenter  | `sysinfo` JSON            | `mdata-get sdc:server_uuid` / `sdc:datacenter_name` |
//! | interfaces           | `sysinfo` JSON            | `mdata-get sdc:nics`          |
//!
//! Execution and parsing are kept apart; the `parse_*` functions are pure.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use cfgagent_core::InstanceId;

use crate::facts::{
    GuestFacts, GuestNic, HostFacts, PhysicalInterface, VirtualInterface, ZoneContext,
};
use crate::{FactProbe, ProbeError};

pub const ZONENAME_CMD: &str = "/usr/bin/zonename";
pub const SYSINFO_CMD: &str = "/usr/bin/sysinfo";
pub const MDATA_GET_CMD: &str = "/usr/sbin/mdata-get";

/// Runs the platform tools to answer [`FactProbe`] queries.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    zonename: PathBuf,
    sysinfo: PathBuf,
    mdata_get: PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        SystemProbe {
            zonename: PathBuf::from(ZONENAME_CMD),
            sysinfo: PathBuf::from(SYSINFO_CMD),
            mdata_get: PathBuf::from(MDATA_GET_CMD),
        }
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use alternative executables, e.g. stand-ins under test.
    pub fn with_commands(
        zonename: impl Into<PathBuf>,
        sysinfo: impl Into<PathBuf>,
        mdata_get: impl Into<PathBuf>,
    ) -> Self {
        SystemProbe {
            zonename: zonename.into(),
            sysinfo: sysinfo.into(),
            mdata_get: mdata_get.into(),
        }
    }

    fn mdata(&self, key: &str) -> Result<String, ProbeError> {
        run(&self.mdata_get, &[key])
    }

    fn mdata_optional(&self, key: &str) -> Option<String> {
        match self.mdata(key) {
            Ok(value) => non_empty(value.trim()),
            Err(err) => {
                tracing::warn!(key, error = %err, "mdata-get failed");
                None
            }
        }
    }
}

impl FactProbe for SystemProbe {
    fn current_zone(&self) -> Result<ZoneContext, ProbeError> {
        let out = run(&self.zonename, &[])?;
        if out.trim().is_empty() {
            return Err(ProbeError::Parse {
                command: self.zonename.clone(),
                message: "empty zone name".to_string(),
            });
        }
        Ok(ZoneContext::from_zonename(&out))
    }

    fn host_facts(&self) -> Result<HostFacts, ProbeError> {
        let out = run(&self.sysinfo, &[])?;
        parse_sysinfo(&out).map_err(|message| ProbeError::Parse {
            command: self.sysinfo.clone(),
            message,
        })
    }

    fn guest_facts(&self, instance: &InstanceId) -> Result<GuestFacts, ProbeError> {
        tracing::debug!(instance = %instance, "probing guest facts");
        let server_uuid = self.mdata_optional("sdc:server_uuid");
        let datacenter_name = self.mdata_optional("sdc:datacenter_name");
        let nics = match self.mdata("sdc:nics") {
            Ok(out) => match parse_nics(&out) {
                Ok(nics) => nics,
                Err(message) => {
                    tracing::warn!(error = %message, "failed to parse sdc:nics");
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to read sdc:nics");
                Vec::new()
            }
        };
        Ok(GuestFacts {
            server_uuid,
            datacenter_name,
            nics,
        })
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn run(command: &Path, args: &[&str]) -> Result<String, ProbeError> {
    let output = Command::new(command)
        .args(args)
        .output()
        .map_err(|source| ProbeError::Spawn {
            command: command.to_path_buf(),
            source,
        })?;
    if !output.status.success() {
        return Err(ProbeError::Failed {
            command: command.to_path_buf(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse `sysinfo` JSON output into [`HostFacts`].
///
/// Interfaces keep the order they appear in the document.
pub fn parse_sysinfo(raw: &str) -> Result<HostFacts, String> {
    let doc: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let Value::Object(doc) = doc else {
        return Err("sysinfo output is not a JSON object".to_string());
    };

    let mut host = HostFacts {
        server_uuid: string_field(&doc, "UUID"),
        datacenter_name: string_field(&doc, "Datacenter Name"),
        ..HostFacts::default()
    };

    if let Some(Value::Object(nics)) = doc.get("Network Interfaces") {
        for (name, nic) in nics {
            let tags = match nic.get("NIC Names") {
                Some(Value::Array(names)) => names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                Some(Value::String(names)) => names
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            host.physical_interfaces.push(PhysicalInterface {
                name: name.clone(),
                ip: nic.as_object().and_then(|o| string_field(o, "ip4addr")),
                tags,
            });
        }
    }

    if let Some(Value::Object(vnics)) = doc.get("Virtual Network Interfaces") {
        for (name, vnic) in vnics {
            let fields = vnic.as_object();
            host.virtual_interfaces.push(VirtualInterface {
                name: name.clone(),
                ip: fields.and_then(|o| string_field(o, "ip4addr")),
                host_interface: fields.and_then(|o| string_field(o, "Host Interface")),
            });
        }
    }

    Ok(host)
}

/// Parse the `sdc:nics` metadata value.
pub fn parse_nics(raw: &str) -> Result<Vec<GuestNic>, String> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

fn string_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).and_then(non_empty)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
