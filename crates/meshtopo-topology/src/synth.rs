//! Per-role daemon configuration synthesis.
//!
//! Combines the instance host map with one machine's own settings. The
//! output is a fresh, self-contained value; nothing here mutates shared
//! state.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use meshtopo_common::config::MeshtopoConfig;
use meshtopo_common::constants::{LISTEN_HOST, MAX_INTERFACE_NAME_LEN, SERVICE_NAME};
use meshtopo_common::types::{InstanceName, MachineName, Role};
use meshtopo_common::vars::{self, VarScope};
use serde::{Deserialize, Serialize};

use crate::hostmap::HostMap;
use crate::model::{FirewallPolicy, MachineSettings};
use crate::parser::net::Cidr;

/// One line of the hosts table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsEntry {
    /// Overlay address.
    pub ip: Ipv4Addr,
    /// `<machine>.<suffix>`.
    pub hostname: String,
}

/// DNS service advertised by a lighthouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsSettings {
    /// Address the DNS server binds to.
    pub host: Ipv4Addr,
    /// Port the DNS server binds to.
    pub port: u16,
}

/// Locations of a machine's PKI files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiPaths {
    /// Instance CA certificate.
    pub ca: PathBuf,
    /// Machine certificate.
    pub cert: PathBuf,
    /// Machine private key.
    pub key: PathBuf,
}

impl PkiPaths {
    /// PKI paths of `machine` under a var store rooted at `store_dir`.
    #[must_use]
    pub fn new(store_dir: &Path, instance: &InstanceName, machine: &MachineName) -> Self {
        let public = store_dir.join(vars::PUBLIC_DIR);
        let secret = store_dir.join(vars::SECRET_DIR);
        let ca_generator = vars::ca_generator_name(instance);
        let node_generator = vars::node_generator_name(instance);
        let scope = VarScope::Machine(machine.clone());
        Self {
            ca: public.join(vars::relative_path(&VarScope::Shared, &ca_generator, vars::CA_CERT)),
            cert: public.join(vars::relative_path(&scope, &node_generator, vars::NODE_CERT)),
            key: secret.join(vars::relative_path(&scope, &node_generator, vars::NODE_KEY)),
        }
    }
}

/// Final daemon configuration of one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMachineConfig {
    /// Owning instance.
    pub instance: InstanceName,
    /// This machine.
    pub machine: MachineName,
    /// Role of this machine.
    pub role: Role,
    /// `true` for lighthouses.
    pub is_lighthouse: bool,
    /// Overlay address.
    pub nebula_ip: Ipv4Addr,
    /// Overlay network of the instance.
    pub network_cidr: Cidr,
    /// Listener bind address.
    pub listen_host: String,
    /// Listener port; `0` lets the daemon pick.
    pub listen_port: u16,
    /// Lighthouse overlay address to reachable endpoints.
    pub static_host_map: BTreeMap<Ipv4Addr, Vec<String>>,
    /// Lighthouses to query (empty for lighthouses).
    pub lighthouses: Vec<Ipv4Addr>,
    /// Relays this machine may use.
    pub relays: Vec<Ipv4Addr>,
    /// Whether this machine relays for others.
    pub am_relay: bool,
    /// Whether this machine routes through relays.
    pub use_relays: bool,
    /// DNS service, on DNS-enabled lighthouses only.
    pub dns: Option<DnsSettings>,
    /// Overlay firewall.
    pub firewall: FirewallPolicy,
    /// UDP ports to open in the host firewall.
    pub open_udp_ports: Vec<u16>,
    /// Tunnel interface name.
    pub tun_device: String,
    /// PKI file locations.
    pub pki: PkiPaths,
    /// Name table of the whole instance.
    pub hosts_table: Vec<HostsEntry>,
}

/// Tunnel device name of an instance, cut to the kernel's interface-name limit.
#[must_use]
pub fn tun_device_name(instance: &InstanceName) -> String {
    let mut name = format!("{SERVICE_NAME}.{instance}");
    if name.len() > MAX_INTERFACE_NAME_LEN {
        let mut cut = MAX_INTERFACE_NAME_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

/// UDP ports the host firewall must open for a machine.
///
/// A lighthouse always opens its port; a node only when it is not `0`.
#[must_use]
pub fn open_udp_ports(settings: &MachineSettings) -> Vec<u16> {
    match settings {
        MachineSettings::Lighthouse(lh) => vec![lh.port],
        MachineSettings::Node(node) if node.port != 0 => vec![node.port],
        MachineSettings::Node(_) => Vec::new(),
    }
}

/// Builds the hosts table from every machine of an instance.
///
/// Machines whose address is unavailable are skipped.
#[must_use]
pub fn hosts_table<'a>(
    machines: impl IntoIterator<Item = (&'a MachineName, Option<Ipv4Addr>)>,
    suffix: &str,
) -> Vec<HostsEntry> {
    machines
        .into_iter()
        .filter_map(|(machine, ip)| {
            let Some(ip) = ip else {
                tracing::debug!(%machine, "no address, omitted from hosts table");
                return None;
            };
            Some(HostsEntry {
                ip,
                hostname: format!("{machine}.{suffix}"),
            })
        })
        .collect()
}

/// Synthesizes the daemon configuration of one machine.
#[must_use]
pub fn synthesize(
    instance: &InstanceName,
    machine: &MachineName,
    settings: &MachineSettings,
    host_map: &HostMap,
    hosts: &[HostsEntry],
    config: &MeshtopoConfig,
) -> ResolvedMachineConfig {
    let nebula_ip = settings.nebula_ip();
    let (lighthouses, relays, am_relay, dns) = match settings {
        MachineSettings::Lighthouse(lh) => (
            Vec::new(),
            host_map.relays_for(Some(nebula_ip)),
            lh.is_relay,
            lh.dns_enabled.then_some(DnsSettings {
                host: nebula_ip,
                port: lh.dns_port,
            }),
        ),
        MachineSettings::Node(_) => (
            host_map.lighthouse_ips.clone(),
            host_map.relays_for(None),
            false,
            None,
        ),
    };
    let use_relays = settings.role() == Role::Node && !relays.is_empty();

    tracing::debug!(
        %instance,
        %machine,
        role = %settings.role(),
        relays = relays.len(),
        "machine config synthesized"
    );

    ResolvedMachineConfig {
        instance: instance.clone(),
        machine: machine.clone(),
        role: settings.role(),
        is_lighthouse: settings.role() == Role::Lighthouse,
        nebula_ip,
        network_cidr: host_map.network_cidr,
        listen_host: LISTEN_HOST.to_string(),
        listen_port: settings.port(),
        static_host_map: host_map.static_host_map.clone(),
        lighthouses,
        relays,
        am_relay,
        use_relays,
        dns,
        firewall: settings.firewall().clone(),
        open_udp_ports: open_udp_ports(settings),
        tun_device: tun_device_name(instance),
        pki: PkiPaths::new(&config.store_dir, instance, machine),
        hosts_table: hosts.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LighthouseSettings, NodeSettings};
    use crate::parser::net::parse_cidr;

    fn host_map() -> HostMap {
        let mut static_host_map = BTreeMap::new();
        let _ = static_host_map.insert(Ipv4Addr::new(10, 87, 0, 1), vec!["1.2.3.4:4242".into()]);
        HostMap {
            network_cidr: parse_cidr("10.87.0.0/16").expect("cidr"),
            static_host_map,
            lighthouse_ips: vec![Ipv4Addr::new(10, 87, 0, 1)],
            relay_ips: vec![Ipv4Addr::new(10, 87, 0, 1)],
        }
    }

    fn lighthouse(dns: bool) -> MachineSettings {
        MachineSettings::Lighthouse(LighthouseSettings {
            endpoint: "1.2.3.4:4242".into(),
            nebula_ip: Ipv4Addr::new(10, 87, 0, 1),
            network_cidr: Some(parse_cidr("10.87.0.0/16").expect("cidr")),
            port: 4242,
            is_relay: true,
            dns_enabled: dns,
            dns_port: 53,
            firewall: FirewallPolicy::default(),
        })
    }

    fn node(port: u16) -> MachineSettings {
        MachineSettings::Node(NodeSettings {
            nebula_ip: Ipv4Addr::new(10, 87, 0, 10),
            port,
            firewall: FirewallPolicy::default(),
        })
    }

    fn synth(name: &str, settings: &MachineSettings) -> ResolvedMachineConfig {
        synthesize(
            &InstanceName::new("mesh"),
            &MachineName::new(name),
            settings,
            &host_map(),
            &[],
            &MeshtopoConfig::default(),
        )
    }

    #[test]
    fn lighthouse_config_shape() {
        let config = synth("lh", &lighthouse(false));
        assert!(config.is_lighthouse);
        assert_eq!(config.listen_host, "0.0.0.0");
        assert_eq!(config.listen_port, 4242);
        assert!(config.lighthouses.is_empty());
        assert!(config.relays.is_empty(), "a relay never relays to itself");
        assert!(config.am_relay);
        assert!(!config.use_relays);
        assert!(config.dns.is_none());
        assert_eq!(config.open_udp_ports, vec![4242]);
    }

    #[test]
    fn lighthouse_dns_only_when_enabled() {
        let config = synth("lh", &lighthouse(true));
        let dns = config.dns.expect("dns advertised");
        assert_eq!(dns.host, Ipv4Addr::new(10, 87, 0, 1));
        assert_eq!(dns.port, 53);
    }

    #[test]
    fn node_config_carries_lighthouses_and_relays() {
        let config = synth("node1", &node(0));
        assert!(!config.is_lighthouse);
        assert_eq!(config.lighthouses, vec![Ipv4Addr::new(10, 87, 0, 1)]);
        assert_eq!(config.relays, vec![Ipv4Addr::new(10, 87, 0, 1)]);
        assert!(config.use_relays);
        assert!(!config.am_relay);
        assert_eq!(config.listen_port, 0);
    }

    #[test]
    fn node_port_zero_opens_nothing() {
        assert!(open_udp_ports(&node(0)).is_empty());
        assert_eq!(open_udp_ports(&node(4243)), vec![4243]);
    }

    #[test]
    fn hosts_table_skips_missing_addresses() {
        let a = MachineName::new("a");
        let b = MachineName::new("b");
        let table = hosts_table(
            [(&a, Some(Ipv4Addr::new(10, 87, 0, 1))), (&b, None)],
            "nebula",
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].hostname, "a.nebula");
    }

    #[test]
    fn tun_device_name_is_truncated() {
        assert_eq!(tun_device_name(&InstanceName::new("mesh")), "nebula.mesh");
        let long = tun_device_name(&InstanceName::new("production-overlay"));
        assert_eq!(long.len(), 15);
        assert!(long.starts_with("nebula.prod"));
    }

    #[test]
    fn pki_paths_follow_store_layout() {
        let pki = PkiPaths::new(
            Path::new("/vars"),
            &InstanceName::new("mesh"),
            &MachineName::new("node1"),
        );
        assert_eq!(pki.ca, PathBuf::from("/vars/public/shared/nebula-ca-mesh/ca.crt"));
        assert_eq!(
            pki.cert,
            PathBuf::from("/vars/public/per-machine/node1/nebula-cert-mesh/node.crt")
        );
        assert_eq!(
            pki.key,
            PathBuf::from("/vars/secret/per-machine/node1/nebula-cert-mesh/node.key")
        );
    }
}
