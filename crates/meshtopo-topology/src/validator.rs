//! Normalization and validation of raw per-machine settings.
//!
//! Each `normalize_*` function turns raw user settings into their defaulted
//! form or fails with [`MeshtopoError::Validation`]. Instance-wide checks
//! (role overlap, address uniqueness, CIDR membership) are separate so the
//! resolver can run them once every machine is normalized.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use meshtopo_common::config::MeshtopoConfig;
use meshtopo_common::constants::{ANY, DEFAULT_DNS_PORT, DEFAULT_NODE_PORT};
use meshtopo_common::error::{MeshtopoError, Result};
use meshtopo_common::types::{InstanceName, MachineName};

use crate::model::{
    FirewallPolicy, FirewallRule, LighthouseSettings, NodeSettings, PortSpec, RawFirewall,
    RawInstance, RawLighthouseSettings, RawNodeSettings,
};
use crate::parser::net::{self, Cidr};

const PROTOCOLS: [&str; 4] = [ANY, "tcp", "udp", "icmp"];

/// Appends `:port` to an endpoint that has no `:` in it.
///
/// Already-normalized endpoints are returned unchanged.
#[must_use]
pub fn normalize_endpoint(endpoint: &str, port: u16) -> String {
    if endpoint.contains(':') {
        endpoint.to_string()
    } else {
        format!("{endpoint}:{port}")
    }
}

/// Parses the configured fallback CIDR.
///
/// # Errors
///
/// Returns [`MeshtopoError::Config`] if the configured value is malformed.
pub fn default_cidr(config: &MeshtopoConfig) -> Result<Cidr> {
    net::parse_cidr(&config.default_cidr).map_err(|e| MeshtopoError::Config {
        message: format!("default_cidr: {e}"),
    })
}

fn parse_nebula_ip(
    instance: &InstanceName,
    machine: &MachineName,
    raw: Option<&str>,
) -> Result<Ipv4Addr> {
    let raw = raw.ok_or_else(|| {
        MeshtopoError::validation(instance.as_str(), machine.as_str(), "nebula_ip is required")
    })?;
    net::parse_ipv4(raw).map_err(|e| {
        MeshtopoError::validation(instance.as_str(), machine.as_str(), format!("nebula_ip: {e}"))
    })
}

/// Normalizes a lighthouse's settings.
///
/// # Errors
///
/// Returns a validation error if `endpoint` or `nebula_ip` is missing or
/// malformed, if the CIDR or port is invalid, or if a firewall rule is
/// malformed.
pub fn normalize_lighthouse(
    instance: &InstanceName,
    machine: &MachineName,
    raw: &RawLighthouseSettings,
    config: &MeshtopoConfig,
) -> Result<LighthouseSettings> {
    let invalid =
        |message: String| MeshtopoError::validation(instance.as_str(), machine.as_str(), message);

    let port = raw.port.unwrap_or(config.default_port);
    if port == 0 {
        return Err(invalid("lighthouse port must not be 0".into()));
    }

    let endpoint = raw
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| invalid("endpoint is required for lighthouses".into()))?;
    let endpoint = normalize_endpoint(endpoint, port);
    let _ = net::parse_endpoint(&endpoint).map_err(|e| invalid(format!("endpoint: {e}")))?;

    let nebula_ip = parse_nebula_ip(instance, machine, raw.nebula_ip.as_deref())?;
    let network_cidr = raw
        .network_cidr
        .as_deref()
        .map(net::parse_cidr)
        .transpose()
        .map_err(|e| invalid(format!("network_cidr: {e}")))?;
    let firewall = normalize_firewall(raw.firewall.as_ref())
        .map_err(|message| invalid(format!("firewall: {message}")))?;

    tracing::debug!(%instance, %machine, %endpoint, %nebula_ip, "lighthouse normalized");
    Ok(LighthouseSettings {
        endpoint,
        nebula_ip,
        network_cidr,
        port,
        is_relay: raw.is_relay.unwrap_or(false),
        dns_enabled: raw.dns_enabled.unwrap_or(false),
        dns_port: raw.dns_port.unwrap_or(DEFAULT_DNS_PORT),
        firewall,
    })
}

/// Normalizes a node's settings.
///
/// # Errors
///
/// Returns a validation error if `nebula_ip` is missing or malformed, or if a
/// firewall rule is malformed.
pub fn normalize_node(
    instance: &InstanceName,
    machine: &MachineName,
    raw: &RawNodeSettings,
) -> Result<NodeSettings> {
    let nebula_ip = parse_nebula_ip(instance, machine, raw.nebula_ip.as_deref())?;
    let firewall = normalize_firewall(raw.firewall.as_ref()).map_err(|message| {
        MeshtopoError::validation(instance.as_str(), machine.as_str(), format!("firewall: {message}"))
    })?;

    tracing::debug!(%instance, %machine, %nebula_ip, "node normalized");
    Ok(NodeSettings {
        nebula_ip,
        port: raw.port.unwrap_or(DEFAULT_NODE_PORT),
        firewall,
    })
}

/// Applies the permissive default to missing directions and checks every rule.
///
/// # Errors
///
/// Returns a description of the first malformed rule.
pub fn normalize_firewall(raw: Option<&RawFirewall>) -> std::result::Result<FirewallPolicy, String> {
    let defaults = FirewallPolicy::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };
    let inbound = raw.inbound.clone().unwrap_or(defaults.inbound);
    let outbound = raw.outbound.clone().unwrap_or(defaults.outbound);

    for (direction, rules) in [("inbound", &inbound), ("outbound", &outbound)] {
        for (idx, rule) in rules.iter().enumerate() {
            validate_rule(rule).map_err(|e| format!("{direction}[{idx}]: {e}"))?;
        }
    }
    Ok(FirewallPolicy { inbound, outbound })
}

fn validate_rule(rule: &FirewallRule) -> std::result::Result<(), String> {
    if let PortSpec::Text(text) = &rule.port {
        let _ = net::parse_port_selector(text).map_err(|e| e.to_string())?;
    }
    if !PROTOCOLS.contains(&rule.proto.as_str()) {
        return Err(format!("unknown proto \"{}\"", rule.proto));
    }
    if let Some(cidr) = &rule.cidr {
        let _ = net::parse_cidr(cidr).map_err(|e| e.to_string())?;
    }
    let has_selector = rule.host.is_some()
        || rule.group.is_some()
        || rule.groups.as_ref().is_some_and(|g| !g.is_empty())
        || rule.cidr.is_some();
    if !has_selector {
        return Err("rule must name a host, group, groups, or cidr".into());
    }
    Ok(())
}

/// Checks that a name is usable as a hostname and as one path component.
///
/// Accepted names match `[A-Za-z0-9][A-Za-z0-9._-]*` and never contain `..`.
///
/// # Errors
///
/// Returns a description of why the name is rejected.
pub fn check_name(name: &str) -> std::result::Result<(), String> {
    let Some(first) = name.chars().next() else {
        return Err("name must not be empty".into());
    };
    if !first.is_ascii_alphanumeric() {
        return Err(format!(
            "name \"{}\" must start with a letter or digit",
            name.escape_debug()
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(format!(
            "name \"{}\" contains invalid character {bad:?}",
            name.escape_debug()
        ));
    }
    if name.contains("..") {
        return Err(format!("name \"{name}\" must not contain \"..\""));
    }
    Ok(())
}

/// Rejects an instance or machine name that [`check_name`] refuses.
///
/// # Errors
///
/// Returns a validation error for the instance name, or for the first
/// offending machine name in either role.
pub fn check_names(instance: &InstanceName, raw: &RawInstance) -> Result<()> {
    check_name(instance.as_str())
        .map_err(|message| MeshtopoError::validation(instance.as_str(), "", message))?;
    for machine in raw.lighthouses.keys().chain(raw.nodes.keys()) {
        check_name(machine).map_err(|message| {
            MeshtopoError::validation(instance.as_str(), machine.escape_debug().to_string(), message)
        })?;
    }
    Ok(())
}

/// Rejects machines assigned to both roles of one instance.
///
/// # Errors
///
/// Returns a validation error naming the first machine found in both roles.
pub fn check_role_overlap(instance: &InstanceName, raw: &RawInstance) -> Result<()> {
    if let Some(name) = raw.lighthouses.keys().find(|name| raw.nodes.contains_key(*name)) {
        return Err(MeshtopoError::validation(
            instance.as_str(),
            name.as_str(),
            "machine is assigned both the lighthouse and the node role",
        ));
    }
    Ok(())
}

/// Rejects overlay addresses used by more than one machine.
///
/// # Errors
///
/// Returns a validation error naming the second machine claiming an address.
pub fn check_unique_ips(
    instance: &InstanceName,
    ips: &BTreeMap<MachineName, Ipv4Addr>,
) -> Result<()> {
    let mut owners: HashMap<Ipv4Addr, &MachineName> = HashMap::new();
    for (machine, ip) in ips {
        if let Some(owner) = owners.insert(*ip, machine) {
            return Err(MeshtopoError::validation(
                instance.as_str(),
                machine.as_str(),
                format!("nebula_ip {ip} is already used by {owner}"),
            ));
        }
    }
    Ok(())
}

/// Rejects overlay addresses outside the instance network.
///
/// # Errors
///
/// Returns a validation error naming the first machine outside `cidr`.
pub fn check_within_cidr(
    instance: &InstanceName,
    cidr: Cidr,
    ips: &BTreeMap<MachineName, Ipv4Addr>,
) -> Result<()> {
    if let Some((machine, ip)) = ips.iter().find(|(_, ip)| !cidr.contains(**ip)) {
        return Err(MeshtopoError::validation(
            instance.as_str(),
            machine.as_str(),
            format!("nebula_ip {ip} is outside the network {cidr}"),
        ));
    }
    Ok(())
}
