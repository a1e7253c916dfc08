//! Plain fact types produced by a [`crate::FactProbe`].

use std::fmt;

use serde::Deserialize;

use cfgagent_core::InstanceId;

/// Where the agent is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneContext {
    /// The host itself; manages the configured and registered instances.
    Global,
    /// Inside one instance; manages exactly that instance.
    Instance(InstanceId),
}

impl ZoneContext {
    /// Interpret the output of `zonename`.
    pub fn from_zonename(name: &str) -> Self {
        let name = name.trim();
        if name == InstanceId::GLOBAL {
            ZoneContext::Global
        } else {
            ZoneContext::Instance(InstanceId::from(name))
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, ZoneContext::Global)
    }

    /// Value published as `ZONENAME`.
    pub fn zonename(&self) -> &str {
        match self {
            ZoneContext::Global => InstanceId::GLOBAL,
            ZoneContext::Instance(id) => id.as_str(),
        }
    }
}

impl fmt::Display for ZoneContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.zonename())
    }
}

/// A physical NIC on the host and the network tags it carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhysicalInterface {
    pub name: String,
    pub ip: Option<String>,
    pub tags: Vec<String>,
}

/// A virtual NIC on the host, stacked on a physical one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VirtualInterface {
    pub name: String,
    pub ip: Option<String>,
    pub host_interface: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostFacts {
    pub server_uuid: Option<String>,
    pub datacenter_name: Option<String>,
    pub physical_interfaces: Vec<PhysicalInterface>,
    pub virtual_interfaces: Vec<VirtualInterface>,
}

/// One NIC as reported inside an instance (`sdc:nics`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct GuestNic {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default, rename = "nic_tag")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuestFacts {
    pub server_uuid: Option<String>,
    pub datacenter_name: Option<String>,
    pub nics: Vec<GuestNic>,
}

/// Everything known about the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facts {
    pub zone: ZoneContext,
    pub host: Option<HostFacts>,
    pub guest: Option<GuestFacts>,
}

impl Facts {
    /// Facts with nothing but the zone.
    pub fn new(zone: ZoneContext) -> Self {
        Facts {
            zone,
            host: None,
            guest: None,
        }
    }

    pub fn with_host(mut self, host: HostFacts) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_guest(mut self, guest: GuestFacts) -> Self {
        self.guest = Some(guest);
        self
    }
}
