//! Whole-instance resolution.
//!
//! Runs the passes in their fixed order: role checks, settings
//! normalization, host map, instance-wide address checks, per-machine
//! synthesis, hosts table, export. Data only flows forward; every call
//! re-derives everything from the raw input.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use meshtopo_common::config::MeshtopoConfig;
use meshtopo_common::error::Result;
use meshtopo_common::types::{InstanceName, MachineName, Role};

use crate::export::{Export, export_for};
use crate::hostmap::{HostMap, resolve_host_map};
use crate::model::{LighthouseSettings, MachineSettings, NodeSettings, RawInstance};
use crate::synth::{self, HostsEntry, ResolvedMachineConfig};
use crate::validator;
use crate::warning::TopologyWarning;

/// A fully resolved overlay instance.
#[derive(Debug, Clone)]
pub struct ResolvedInstance {
    /// Instance name.
    pub name: InstanceName,
    /// Shared address book.
    pub host_map: HostMap,
    /// Normalized settings of every configured machine.
    pub machines: BTreeMap<MachineName, MachineSettings>,
    /// Daemon configuration of every configured machine.
    pub configs: BTreeMap<MachineName, ResolvedMachineConfig>,
    /// Name table, lighthouses first, then nodes.
    pub hosts_table: Vec<HostsEntry>,
    /// Routing-priority annotation.
    pub export: Export,
    /// Tolerated inconsistencies.
    pub warnings: Vec<TopologyWarning>,
}

impl ResolvedInstance {
    /// Configured machines with their overlay address, in name order.
    pub fn addresses(&self) -> impl Iterator<Item = (&MachineName, Ipv4Addr)> {
        self.machines.iter().map(|(name, s)| (name, s.nebula_ip()))
    }
}

fn unconfigured(machine: &MachineName, role: Role, instance: &InstanceName) -> TopologyWarning {
    let warning = TopologyWarning::Unconfigured {
        machine: machine.clone(),
        role,
    };
    tracing::warn!(%instance, "{warning}");
    warning
}

/// Resolves one instance.
///
/// # Errors
///
/// Returns a validation error if the instance or a machine name is not
/// hostname-safe, if any configured machine has malformed settings, if a
/// machine holds both roles, if overlay addresses collide or
/// fall outside the instance network, or if lighthouse CIDRs disagree under
/// the strict policy.
pub fn resolve_instance(
    name: &InstanceName,
    raw: &RawInstance,
    config: &MeshtopoConfig,
) -> Result<ResolvedInstance> {
    tracing::info!(instance = %name, "resolving instance");
    validator::check_names(name, raw)?;
    validator::check_role_overlap(name, raw)?;

    let mut warnings = Vec::new();

    let mut lighthouses: BTreeMap<MachineName, LighthouseSettings> = BTreeMap::new();
    for (machine, settings) in &raw.lighthouses {
        let machine = MachineName::new(machine.as_str());
        match settings {
            Some(settings) => {
                let lh = validator::normalize_lighthouse(name, &machine, settings, config)?;
                let _ = lighthouses.insert(machine, lh);
            }
            None => warnings.push(unconfigured(&machine, Role::Lighthouse, name)),
        }
    }

    let mut nodes: BTreeMap<MachineName, NodeSettings> = BTreeMap::new();
    for (machine, settings) in &raw.nodes {
        let machine = MachineName::new(machine.as_str());
        match settings {
            Some(settings) => {
                let node = validator::normalize_node(name, &machine, settings)?;
                let _ = nodes.insert(machine, node);
            }
            None => warnings.push(unconfigured(&machine, Role::Node, name)),
        }
    }

    let resolution = resolve_host_map(name, &lighthouses, config)?;
    warnings.extend(resolution.warnings);
    let host_map = resolution.host_map;

    let ips: BTreeMap<MachineName, Ipv4Addr> = lighthouses
        .iter()
        .map(|(m, lh)| (m.clone(), lh.nebula_ip))
        .chain(nodes.iter().map(|(m, node)| (m.clone(), node.nebula_ip)))
        .collect();
    validator::check_unique_ips(name, &ips)?;
    validator::check_within_cidr(name, host_map.network_cidr, &ips)?;

    let hosts_table = build_hosts_table(raw, &ips, &config.hosts_suffix);

    let machines: BTreeMap<MachineName, MachineSettings> = lighthouses
        .into_iter()
        .map(|(m, lh)| (m, MachineSettings::Lighthouse(lh)))
        .chain(nodes.into_iter().map(|(m, node)| (m, MachineSettings::Node(node))))
        .collect();

    let configs = machines
        .iter()
        .map(|(machine, settings)| {
            let resolved =
                synth::synthesize(name, machine, settings, &host_map, &hosts_table, config);
            (machine.clone(), resolved)
        })
        .collect();

    tracing::info!(
        instance = %name,
        machines = machines.len(),
        warnings = warnings.len(),
        "instance resolved"
    );

    Ok(ResolvedInstance {
        name: name.clone(),
        host_map,
        machines,
        configs,
        hosts_table,
        export: export_for(name),
        warnings,
    })
}

/// Hosts table over every declared machine, lighthouses first.
///
/// Declared machines without settings have no address and are skipped.
fn build_hosts_table(
    raw: &RawInstance,
    ips: &BTreeMap<MachineName, Ipv4Addr>,
    suffix: &str,
) -> Vec<HostsEntry> {
    let declared: Vec<MachineName> = raw
        .lighthouses
        .keys()
        .chain(raw.nodes.keys())
        .map(|m| MachineName::new(m.as_str()))
        .collect();
    synth::hosts_table(declared.iter().map(|m| (m, ips.get(m).copied())), suffix)
}
