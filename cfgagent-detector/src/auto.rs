//! The `auto` metadata section.
//!
//! # Keys
//!
//! | key               | source                                            |
//! |-------------------|---------------------------------------------------|
//! | `ZONENAME`        | zone context                                      |
//! | `SERVER_UUID`     | host (`sysinfo`) or guest (`sdc:server_uuid`)     |
//! | `DATACENTER_NAME` | host or guest                                     |
//! | `PRIMARY_IP`      | first guest NIC (instance context only)           |
//! | `<TAG>_IP`        | last address bound to `TAG`                       |
//! | `<TAG>_IPS`       | every distinct address bound to `TAG`, first-seen order |
//! | `INSTANCE_UUID`   | added per instance by [`AutoMetadata::for_instance`] |
//!
//! Tags are uppercased. A tag of the form `<BASE>_RACK<suffix>` binds its
//! address under `<BASE>` as well. Binding order is physical interfaces, then
//! virtual interfaces (global context), or NIC order (instance context).

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde_json::Value;

use cfgagent_core::{InstanceId, Metadata};

use crate::facts::{Facts, GuestFacts, HostFacts, ZoneContext};

/// Tag prefix that binds directly on physical interfaces in the global context.
const ADMIN_TAG_PREFIX: &str = "ADMIN";
const RACK_MARKER: &str = "_RACK";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct TagAddresses {
    ip: String,
    ips: Vec<String>,
}

/// Derived facts, built once per process.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AutoMetadata {
    pub zonename: Option<String>,
    pub server_uuid: Option<String>,
    pub datacenter_name: Option<String>,
    pub primary_ip: Option<String>,
    tags: BTreeMap<String, TagAddresses>,
    base: Metadata,
}

impl AutoMetadata {
    /// Representative address for `tag` (`<TAG>_IP`).
    pub fn tag_ip(&self, tag: &str) -> Option<&str> {
        self.tags.get(&tag.to_uppercase()).map(|t| t.ip.as_str())
    }

    /// All addresses for `tag` (`<TAG>_IPS`).
    pub fn tag_ips(&self, tag: &str) -> &[String] {
        self.tags
            .get(&tag.to_uppercase())
            .map(|t| t.ips.as_slice())
            .unwrap_or(&[])
    }

    /// Tags with at least one bound address, sorted.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    /// Flatten into a metadata map: configured base entries, then tag
    /// bindings, then identity fields.
    pub fn to_metadata(&self) -> Metadata {
        let mut md = self.base.clone();
        for (tag, addrs) in &self.tags {
            md.insert(format!("{tag}_IP"), Value::String(addrs.ip.clone()));
            md.insert(
                format!("{tag}_IPS"),
                Value::Array(addrs.ips.iter().cloned().map(Value::String).collect()),
            );
        }
        let identity = [
            ("ZONENAME", &self.zonename),
            ("SERVER_UUID", &self.server_uuid),
            ("DATACENTER_NAME", &self.datacenter_name),
            ("PRIMARY_IP", &self.primary_ip),
        ];
        for (key, value) in identity {
            if let Some(value) = value {
                md.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        md
    }

    /// [`Self::to_metadata`] plus `INSTANCE_UUID`.
    pub fn for_instance(&self, instance: &InstanceId) -> Metadata {
        let mut md = self.to_metadata();
        md.insert(
            "INSTANCE_UUID".to_string(),
            Value::String(instance.as_str().to_string()),
        );
        md
    }

    fn bind(&mut self, tag: &str, ip: &str, all: &[String]) {
        let tag = tag.trim().to_uppercase();
        if tag.is_empty() {
            return;
        }
        if let Some(base) = rack_base(&tag) {
            let base = base.to_string();
            self.assign(&tag, ip, all);
            self.assign(&base, ip, all);
        } else {
            self.assign(&tag, ip, all);
        }
    }

    fn assign(&mut self, tag: &str, ip: &str, all: &[String]) {
        let entry = self.tags.entry(tag.to_string()).or_default();
        entry.ip = ip.to_string();
        for addr in std::iter::once(ip).chain(all.iter().map(String::as_str)) {
            if !entry.ips.iter().any(|known| known == addr) {
                entry.ips.push(addr.to_string());
            }
        }
    }
}

/// Builds [`AutoMetadata`] from [`Facts`].
#[derive(Debug, Clone, Default)]
pub struct AutoMetadataBuilder {
    base: Metadata,
}

impl AutoMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Static entries that derived facts override.
    pub fn with_base(base: Metadata) -> Self {
        AutoMetadataBuilder { base }
    }

    /// Derive the auto section. Never fails; absent facts yield absent keys.
    pub fn build(&self, facts: &Facts) -> AutoMetadata {
        let mut auto = AutoMetadata {
            zonename: Some(facts.zone.zonename().to_string()),
            base: self.base.clone(),
            ..AutoMetadata::default()
        };

        match &facts.zone {
            ZoneContext::Global => {
                if let Some(host) = &facts.host {
                    bind_host(&mut auto, host);
                }
            }
            ZoneContext::Instance(_) => {
                if let Some(guest) = &facts.guest {
                    bind_guest(&mut auto, guest);
                }
            }
        }

        tracing::debug!(
            zonename = auto.zonename.as_deref().unwrap_or_default(),
            tags = auto.tags.len(),
            "built auto metadata",
        );
        auto
    }
}

// ---------------------------------------------------------------------------
// Binding rules
// ---------------------------------------------------------------------------

fn bind_host(auto: &mut AutoMetadata, host: &HostFacts) {
    auto.server_uuid = host.server_uuid.clone();
    auto.datacenter_name = host.datacenter_name.clone();

    for nic in &host.physical_interfaces {
        let Some(ip) = nic.ip.as_deref().and_then(address) else {
            continue;
        };
        for tag in &nic.tags {
            if tag.to_uppercase().starts_with(ADMIN_TAG_PREFIX) {
                auto.bind(tag, &ip, &[]);
            }
        }
    }

    for vnic in &host.virtual_interfaces {
        let Some(ip) = vnic.ip.as_deref().and_then(address) else {
            continue;
        };
        let Some(tag) = vnic_tag(&vnic.name) else {
            continue;
        };
        let carried = vnic
            .host_interface
            .as_deref()
            .and_then(|name| host.physical_interfaces.iter().find(|p| p.name == name))
            .map(|phys| phys.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            .unwrap_or(false);
        if carried {
            auto.bind(tag, &ip, &[]);
        } else {
            tracing::debug!(vnic = %vnic.name, tag, "host interface does not carry tag, skipping");
        }
    }
}

fn bind_guest(auto: &mut AutoMetadata, guest: &GuestFacts) {
    auto.server_uuid = guest.server_uuid.clone();
    auto.datacenter_name = guest.datacenter_name.clone();
    auto.primary_ip = guest
        .nics
        .first()
        .and_then(|nic| nic.ip.as_deref())
        .and_then(address);

    for nic in &guest.nics {
        let all: Vec<String> = nic.ips.iter().filter_map(|ip| address(ip)).collect();
        let Some(ip) = nic.ip.as_deref().and_then(address).or_else(|| all.first().cloned()) else {
            continue;
        };
        if let Some(tag) = nic.tag.as_deref() {
            auto.bind(tag, &ip, &all);
        }
    }
}

/// `MANTA_RACK_A` → `MANTA`.
fn rack_base(tag: &str) -> Option<&str> {
    let idx = tag.find(RACK_MARKER)?;
    let suffix = &tag[idx + RACK_MARKER.len()..];
    if idx == 0 || suffix.is_empty() {
        None
    } else {
        Some(&tag[..idx])
    }
}

/// `manta0` → `manta`; names without a trailing number carry no tag.
fn vnic_tag(name: &str) -> Option<&str> {
    let tag = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if tag.is_empty() || tag.len() == name.len() {
        None
    } else {
        Some(tag)
    }
}

/// Strip a CIDR suffix and keep only real addresses (`dhcp` and friends are dropped).
fn address(raw: &str) -> Option<String> {
    let ip = raw.split('/').next().unwrap_or(raw).trim();
    ip.parse::<IpAddr>().ok().map(|_| ip.to_string())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rack_base_requires_prefix_and_suffix() {
        assert_eq!(rack_base("MANTA_RACK_A"), Some("MANTA"));
        assert_eq!(rack_base("MANTA_RACK12"), Some("MANTA"));
        assert_eq!(rack_base("MANTA_RACK"), None);
        assert_eq!(rack_base("_RACKA"), None);
        assert_eq!(rack_base("ADMIN"), None);
    }

    #[test]
    fn vnic_tag_strips_trailing_digits() {
        assert_eq!(vnic_tag("manta0"), Some("manta"));
        assert_eq!(vnic_tag("external12"), Some("external"));
        assert_eq!(vnic_tag("manta"), None);
        assert_eq!(vnic_tag("0"), None);
    }

    #[test]
    fn address_strips_cidr_and_rejects_keywords() {
        assert_eq!(address("10.0.0.5/24").as_deref(), Some("10.0.0.5"));
        assert_eq!(address("10.0.0.5").as_deref(), Some("10.0.0.5"));
        assert_eq!(address("dhcp"), None);
        assert_eq!(address(""), None);
    }

    #[test]
    fn assign_keeps_ips_distinct() {
        let mut auto = AutoMetadata::default();
        auto.bind("admin", "10.0.0.1", &[]);
        auto.bind("admin", "10.0.0.1", &[]);
        auto.bind("admin", "10.0.0.2", &[]);
        assert_eq!(auto.tag_ip("ADMIN"), Some("10.0.0.2"));
        assert_eq!(auto.tag_ips("admin"), ["10.0.0.1", "10.0.0.2"]);
    }
}
