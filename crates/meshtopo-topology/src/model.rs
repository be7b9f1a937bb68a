//! Typed representation of roles, machines, and settings.
//!
//! `Raw*` types mirror the user-facing topology file: every field is optional
//! and nothing is checked. The validator turns them into the normalized
//! [`LighthouseSettings`] / [`NodeSettings`] pair wrapped by
//! [`MachineSettings`].

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use meshtopo_common::types::Role;
use serde::{Deserialize, Serialize};

use crate::parser::net::Cidr;

/// Root of a topology file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyFile {
    /// Overlay instances keyed by name.
    #[serde(default)]
    pub instances: BTreeMap<String, RawInstance>,
}

/// Role assignment of one instance as written by the user.
///
/// A machine mapped to `None` is declared but not configured yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInstance {
    /// Lighthouse machines.
    #[serde(default)]
    pub lighthouses: BTreeMap<String, Option<RawLighthouseSettings>>,
    /// Node machines.
    #[serde(default)]
    pub nodes: BTreeMap<String, Option<RawNodeSettings>>,
}

/// Lighthouse settings before defaulting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLighthouseSettings {
    /// Public `host[:port]` other machines dial.
    pub endpoint: Option<String>,
    /// Overlay address.
    pub nebula_ip: Option<String>,
    /// Overlay network in CIDR notation.
    pub network_cidr: Option<String>,
    /// UDP listen port.
    pub port: Option<u16>,
    /// Whether this lighthouse relays traffic for other machines.
    pub is_relay: Option<bool>,
    /// Whether this lighthouse answers DNS queries for the overlay.
    pub dns_enabled: Option<bool>,
    /// DNS port, used when `dns_enabled`.
    pub dns_port: Option<u16>,
    /// Overlay firewall rules.
    pub firewall: Option<RawFirewall>,
}

/// Node settings before defaulting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawNodeSettings {
    /// Overlay address.
    pub nebula_ip: Option<String>,
    /// UDP listen port; `0` lets the daemon pick one.
    pub port: Option<u16>,
    /// Overlay firewall rules.
    pub firewall: Option<RawFirewall>,
}

/// Firewall rules as written by the user. A missing direction gets the
/// permissive default rule; an explicit empty list stays empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFirewall {
    /// Rules for traffic entering this machine.
    pub inbound: Option<Vec<FirewallRule>>,
    /// Rules for traffic leaving this machine.
    pub outbound: Option<Vec<FirewallRule>>,
}

/// Port field of a firewall rule: a number or a string (`any`, `200-300`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    /// A single numeric port.
    Number(u16),
    /// `any` or a range.
    Text(String),
}

impl Default for PortSpec {
    fn default() -> Self {
        Self::Text(meshtopo_common::constants::ANY.to_string())
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One overlay firewall rule, in the daemon's own vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallRule {
    /// Port selector.
    #[serde(default)]
    pub port: PortSpec,
    /// Protocol: `any`, `tcp`, `udp`, or `icmp`.
    #[serde(default = "any_proto")]
    pub proto: String,
    /// Peer hostname, or `any`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Certificate group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Certificate groups, all of which must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    /// Source overlay CIDR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

fn any_proto() -> String {
    meshtopo_common::constants::ANY.to_string()
}

impl FirewallRule {
    /// `{port: any, proto: any, host: any}`.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            port: PortSpec::default(),
            proto: any_proto(),
            host: Some(meshtopo_common::constants::ANY.to_string()),
            ..Self::default()
        }
    }
}

/// Normalized overlay firewall policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallPolicy {
    /// Rules for traffic entering this machine.
    pub inbound: Vec<FirewallRule>,
    /// Rules for traffic leaving this machine.
    pub outbound: Vec<FirewallRule>,
}

impl Default for FirewallPolicy {
    fn default() -> Self {
        Self {
            inbound: vec![FirewallRule::allow_all()],
            outbound: vec![FirewallRule::allow_all()],
        }
    }
}

/// Validated, defaulted lighthouse settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LighthouseSettings {
    /// Endpoint, always carrying an explicit port.
    pub endpoint: String,
    /// Overlay address.
    pub nebula_ip: Ipv4Addr,
    /// Overlay network, if this lighthouse declares one.
    pub network_cidr: Option<Cidr>,
    /// UDP listen port.
    pub port: u16,
    /// Relays traffic for other machines.
    pub is_relay: bool,
    /// Answers DNS queries on its overlay address.
    pub dns_enabled: bool,
    /// DNS port.
    pub dns_port: u16,
    /// Overlay firewall policy.
    pub firewall: FirewallPolicy,
}

/// Validated, defaulted node settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    /// Overlay address.
    pub nebula_ip: Ipv4Addr,
    /// UDP listen port; `0` lets the daemon pick one.
    pub port: u16,
    /// Overlay firewall policy.
    pub firewall: FirewallPolicy,
}

/// A machine's settings, tagged by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineSettings {
    /// Lighthouse role.
    Lighthouse(LighthouseSettings),
    /// Node role.
    Node(NodeSettings),
}

impl MachineSettings {
    /// Role of this machine.
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            Self::Lighthouse(_) => Role::Lighthouse,
            Self::Node(_) => Role::Node,
        }
    }

    /// Overlay address, common to both roles.
    #[must_use]
    pub const fn nebula_ip(&self) -> Ipv4Addr {
        match self {
            Self::Lighthouse(lh) => lh.nebula_ip,
            Self::Node(node) => node.nebula_ip,
        }
    }

    /// UDP listen port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        match self {
            Self::Lighthouse(lh) => lh.port,
            Self::Node(node) => node.port,
        }
    }

    /// Overlay firewall policy, common to both roles.
    #[must_use]
    pub const fn firewall(&self) -> &FirewallPolicy {
        match self {
            Self::Lighthouse(lh) => &lh.firewall,
            Self::Node(node) => &node.firewall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firewall_rule_defaults_fill_missing_fields() {
        let rule: FirewallRule = serde_yaml::from_str("host: any").expect("parse");
        assert_eq!(rule.port, PortSpec::Text("any".into()));
        assert_eq!(rule.proto, "any");
        assert_eq!(rule, FirewallRule::allow_all());
    }

    #[test]
    fn port_spec_accepts_numbers_and_text() {
        let rule: FirewallRule = serde_yaml::from_str("port: 22\nproto: tcp\ngroup: admin")
            .expect("parse");
        assert_eq!(rule.port, PortSpec::Number(22));
        assert_eq!(rule.group.as_deref(), Some("admin"));

        let rule: FirewallRule = serde_yaml::from_str("port: 200-300\nhost: any").expect("parse");
        assert_eq!(rule.port.to_string(), "200-300");
    }

    #[test]
    fn default_policy_is_permissive_both_ways() {
        let policy = FirewallPolicy::default();
        assert_eq!(policy.inbound, vec![FirewallRule::allow_all()]);
        assert_eq!(policy.outbound, vec![FirewallRule::allow_all()]);
    }

    #[test]
    fn unknown_settings_field_is_rejected() {
        let result: Result<RawNodeSettings, _> = serde_yaml::from_str("nebula_ip: 10.0.0.1\nbogus: 1");
        assert!(result.is_err());
    }
}
