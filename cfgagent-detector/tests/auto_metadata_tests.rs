//! Auto-metadata derivation tests for `cfgagent-detector`.
//!
//! Facts are constructed in memory; no system tools are run.

use cfgagent_core::InstanceId;
use cfgagent_detector::{
    gather, AutoMetadataBuilder, FactProbe, Facts, GuestFacts, GuestNic, HostFacts,
    PhysicalInterface, ProbeError, VirtualInterface, ZoneContext,
};
use rstest::rstest;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn instance() -> InstanceId {
    InstanceId::from("b4d1b5a4-6d67-4c3e-8a5b-2d5b0b5c4f10")
}

fn nic(ip: &str, tag: Option<&str>) -> GuestNic {
    GuestNic {
        ip: Some(ip.to_string()),
        ips: vec![],
        tag: tag.map(str::to_string),
    }
}

fn guest(nics: Vec<GuestNic>) -> Facts {
    Facts::new(ZoneContext::Instance(instance())).with_guest(GuestFacts {
        server_uuid: Some("server-1".to_string()),
        datacenter_name: Some("dc-1".to_string()),
        nics,
    })
}

fn phys(name: &str, ip: &str, tags: &[&str]) -> PhysicalInterface {
    PhysicalInterface {
        name: name.to_string(),
        ip: Some(ip.to_string()),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn vnic(name: &str, ip: &str, host: &str) -> VirtualInterface {
    VirtualInterface {
        name: name.to_string(),
        ip: Some(ip.to_string()),
        host_interface: Some(host.to_string()),
    }
}

fn host(physical: Vec<PhysicalInterface>, virtual_: Vec<VirtualInterface>) -> Facts {
    Facts::new(ZoneContext::Global).with_host(HostFacts {
        server_uuid: Some("server-1".to_string()),
        datacenter_name: Some("dc-1".to_string()),
        physical_interfaces: physical,
        virtual_interfaces: virtual_,
    })
}

// ---------------------------------------------------------------------------
// Tag precedence
// ---------------------------------------------------------------------------

#[test]
fn rack_tag_feeds_base_and_later_plain_tag_overwrites_ip() {
    let auto = AutoMetadataBuilder::new().build(&guest(vec![
        nic("10.0.0.1", Some("admin")),
        nic("172.25.1.5", Some("manta_rack_a")),
        nic("172.25.9.9", Some("manta")),
    ]));
    let md = auto.to_metadata();

    assert_eq!(md["MANTA_RACK_A_IP"], json!("172.25.1.5"));
    assert_eq!(md["MANTA_RACK_A_IPS"], json!(["172.25.1.5"]));
    assert_eq!(md["MANTA_IP"], json!("172.25.9.9"));
    assert_eq!(md["MANTA_IPS"], json!(["172.25.1.5", "172.25.9.9"]));
    assert_eq!(md["PRIMARY_IP"], json!("10.0.0.1"));
}

#[test]
fn later_rack_tag_overlays_base_ip() {
    let auto = AutoMetadataBuilder::new().build(&guest(vec![
        nic("172.25.1.5", Some("MANTA_RACK_A")),
        nic("172.25.2.5", Some("MANTA_RACK_B")),
        nic("172.25.1.5", Some("MANTA_RACK_C")),
    ]));
    assert_eq!(auto.tag_ip("MANTA"), Some("172.25.1.5"));
    assert_eq!(auto.tag_ips("MANTA"), ["172.25.1.5", "172.25.2.5"]);
}

#[rstest]
#[case("admin", "ADMIN")]
#[case("Admin", "ADMIN")]
#[case("external", "EXTERNAL")]
#[case("manta_rack_12", "MANTA_RACK_12")]
fn tags_are_uppercased(#[case] tag: &str, #[case] key: &str) {
    let auto = AutoMetadataBuilder::new().build(&guest(vec![nic("10.1.1.1", Some(tag))]));
    let md = auto.to_metadata();
    assert_eq!(md[format!("{key}_IP").as_str()], json!("10.1.1.1"));
}

#[test]
fn guest_ips_are_stripped_and_merged() {
    let auto = AutoMetadataBuilder::new().build(&guest(vec![GuestNic {
        ip: Some("10.0.0.5".to_string()),
        ips: vec!["10.0.0.5/24".to_string(), "10.0.0.6/24".to_string(), "addrconf".to_string()],
        tag: Some("admin".to_string()),
    }]));
    assert_eq!(auto.tag_ips("admin"), ["10.0.0.5", "10.0.0.6"]);
}

#[test]
fn untagged_address_only_sets_primary_ip() {
    let auto = AutoMetadataBuilder::new().build(&guest(vec![nic("10.0.0.9", None)]));
    assert_eq!(auto.tags().count(), 0);
    assert_eq!(auto.primary_ip.as_deref(), Some("10.0.0.9"));
}

// ---------------------------------------------------------------------------
// Global context
// ---------------------------------------------------------------------------

#[test]
fn global_binds_admin_physical_and_matching_vnics() {
    let facts = host(
        vec![
            phys("ixgbe0", "10.99.99.7", &["admin"]),
            phys("ixgbe1", "192.168.1.7", &["manta", "external"]),
        ],
        vec![
            vnic("manta0", "172.25.3.9", "ixgbe1"),
            vnic("external0", "8.8.4.4", "ixgbe0"),
        ],
    );
    let auto = AutoMetadataBuilder::new().build(&facts);

    assert_eq!(auto.tag_ip("admin"), Some("10.99.99.7"));
    assert_eq!(auto.tag_ip("manta"), Some("172.25.3.9"));
    assert_eq!(auto.tag_ip("external"), None, "ixgbe0 does not carry external");
    assert_eq!(auto.primary_ip, None);
    assert_eq!(auto.zonename.as_deref(), Some("global"));
}

#[test]
fn global_ignores_non_admin_physical_addresses() {
    let auto = AutoMetadataBuilder::new().build(&host(
        vec![phys("ixgbe1", "192.168.1.7", &["manta"])],
        vec![],
    ));
    assert_eq!(auto.tag_ip("manta"), None);
}

// ---------------------------------------------------------------------------
// Identity and layering
// ---------------------------------------------------------------------------

#[rstest]
#[case::global(Facts::new(ZoneContext::Global), "global")]
#[case::instance(Facts::new(ZoneContext::Instance(instance())), "b4d1b5a4-6d67-4c3e-8a5b-2d5b0b5c4f10")]
fn zero_facts_yield_identity_only(#[case] facts: Facts, #[case] zonename: &str) {
    let md = AutoMetadataBuilder::new().build(&facts).to_metadata();
    assert_eq!(md.len(), 1);
    assert_eq!(md["ZONENAME"], json!(zonename));
}

#[test]
fn derived_facts_override_configured_base() {
    let mut base = serde_json::Map::new();
    base.insert("ZONENAME".to_string(), json!("configured"));
    base.insert("FEATURE".to_string(), json!(true));
    let auto = AutoMetadataBuilder::with_base(base).build(&guest(vec![]));
    let md = auto.for_instance(&instance());

    assert_eq!(md["ZONENAME"], json!(instance().as_str()));
    assert_eq!(md["FEATURE"], json!(true));
    assert_eq!(md["INSTANCE_UUID"], Value::String(instance().as_str().to_string()));
    assert_eq!(md["SERVER_UUID"], json!("server-1"));
    assert_eq!(md["DATACENTER_NAME"], json!("dc-1"));
}

// ---------------------------------------------------------------------------
// gather
// ---------------------------------------------------------------------------

struct FakeProbe {
    zone: String,
}

impl FactProbe for FakeProbe {
    fn current_zone(&self) -> Result<ZoneContext, ProbeError> {
        Ok(ZoneContext::from_zonename(&self.zone))
    }
    fn host_facts(&self) -> Result<HostFacts, ProbeError> {
        Ok(HostFacts {
            server_uuid: Some("host".to_string()),
            ..HostFacts::default()
        })
    }
    fn guest_facts(&self, _instance: &InstanceId) -> Result<GuestFacts, ProbeError> {
        Ok(GuestFacts {
            server_uuid: Some("guest".to_string()),
            ..GuestFacts::default()
        })
    }
}

#[rstest]
#[case("global", "host")]
#[case("zone-7", "guest")]
fn gather_asks_the_probe_matching_the_zone(#[case] zone: &str, #[case] server: &str) {
    let probe = FakeProbe {
        zone: zone.to_string(),
    };
    let facts = gather(&probe).expect("gather");
    let auto = AutoMetadataBuilder::new().build(&facts);
    assert_eq!(auto.server_uuid.as_deref(), Some(server));
}
