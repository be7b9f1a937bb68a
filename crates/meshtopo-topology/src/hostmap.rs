//! The address book every machine of an instance needs.
//!
//! Built once per instance from the complete set of normalized lighthouse
//! settings and read by every machine's synthesizer. Lighthouses are iterated
//! in machine-name order, which makes "the first lighthouse" a canonical
//! choice rather than an accident of insertion order.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use meshtopo_common::config::{CidrPolicy, MeshtopoConfig};
use meshtopo_common::error::{MeshtopoError, Result};
use meshtopo_common::types::{InstanceName, MachineName};

use crate::model::LighthouseSettings;
use crate::parser::net::Cidr;
use crate::validator;
use crate::warning::TopologyWarning;

/// Instance-wide addressing derived from the lighthouses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMap {
    /// Overlay network of the instance.
    pub network_cidr: Cidr,
    /// Overlay address of each lighthouse to its reachable endpoints.
    pub static_host_map: BTreeMap<Ipv4Addr, Vec<String>>,
    /// Overlay addresses of all lighthouses, in machine-name order.
    pub lighthouse_ips: Vec<Ipv4Addr>,
    /// Overlay addresses of every relaying lighthouse, in machine-name order.
    pub relay_ips: Vec<Ipv4Addr>,
}

impl HostMap {
    /// Relays a machine should use.
    ///
    /// A lighthouse passes its own address and never sees itself in the
    /// result; nodes pass `None` and receive every relay.
    #[must_use]
    pub fn relays_for(&self, own_ip: Option<Ipv4Addr>) -> Vec<Ipv4Addr> {
        self.relay_ips
            .iter()
            .copied()
            .filter(|ip| Some(*ip) != own_ip)
            .collect()
    }
}

/// Result of host-map resolution.
#[derive(Debug, Clone)]
pub struct HostMapResolution {
    /// The resolved host map.
    pub host_map: HostMap,
    /// Inconsistencies tolerated along the way.
    pub warnings: Vec<TopologyWarning>,
}

/// Resolves the host map of an instance from its lighthouses.
///
/// The instance CIDR is the one declared by the first lighthouse in name
/// order that declares one, or the configured default when none does.
/// Lighthouses without a CIDR adopt the instance CIDR. Any other declared
/// CIDR produces a warning, or an error under [`CidrPolicy::Strict`].
///
/// # Errors
///
/// Returns a validation error on CIDR disagreement under the strict policy,
/// or a configuration error if the default CIDR is malformed.
pub fn resolve_host_map(
    instance: &InstanceName,
    lighthouses: &BTreeMap<MachineName, LighthouseSettings>,
    config: &MeshtopoConfig,
) -> Result<HostMapResolution> {
    let mut warnings = Vec::new();

    let mut declared = lighthouses
        .iter()
        .filter_map(|(name, lh)| lh.network_cidr.map(|cidr| (name, cidr)));
    let network_cidr = match declared.next() {
        Some((first_name, selected)) => {
            for (name, cidr) in declared.filter(|(_, cidr)| *cidr != selected) {
                if config.cidr_policy == CidrPolicy::Strict {
                    return Err(MeshtopoError::validation(
                        instance.as_str(),
                        name.as_str(),
                        format!("network_cidr {cidr} disagrees with {selected} declared by {first_name}"),
                    ));
                }
                let warning = TopologyWarning::CidrDisagreement {
                    selected_from: first_name.clone(),
                    selected,
                    machine: name.clone(),
                    declared: cidr,
                };
                tracing::warn!(%instance, "{warning}");
                warnings.push(warning);
            }
            selected
        }
        None => validator::default_cidr(config)?,
    };

    let mut static_host_map: BTreeMap<Ipv4Addr, Vec<String>> = BTreeMap::new();
    let mut lighthouse_ips = Vec::with_capacity(lighthouses.len());
    let mut relay_ips = Vec::new();

    for lh in lighthouses.values() {
        let endpoints = static_host_map.entry(lh.nebula_ip).or_default();
        if !endpoints.contains(&lh.endpoint) {
            endpoints.push(lh.endpoint.clone());
        }
        lighthouse_ips.push(lh.nebula_ip);
        if lh.is_relay {
            relay_ips.push(lh.nebula_ip);
        }
    }

    tracing::info!(
        %instance,
        %network_cidr,
        lighthouses = lighthouse_ips.len(),
        relays = relay_ips.len(),
        "host map resolved"
    );

    Ok(HostMapResolution {
        host_map: HostMap {
            network_cidr,
            static_host_map,
            lighthouse_ips,
            relay_ips,
        },
        warnings,
    })
}
