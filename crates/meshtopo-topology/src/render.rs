//! Output rendering for external consumers.
//!
//! [`daemon_config`] maps a [`ResolvedMachineConfig`] onto the overlay
//! daemon's YAML schema. [`hosts_block`] renders the hosts table as a marked
//! block for merging into a name-resolution file.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use meshtopo_common::constants::APP_NAME;
use meshtopo_common::error::Result;
use meshtopo_common::types::InstanceName;
use serde::Serialize;

use crate::model::FirewallRule;
use crate::synth::{HostsEntry, ResolvedMachineConfig};

#[derive(Debug, Serialize)]
struct DaemonConfig<'a> {
    pki: Pki<'a>,
    static_host_map: &'a BTreeMap<Ipv4Addr, Vec<String>>,
    lighthouse: Lighthouse<'a>,
    listen: Listen<'a>,
    punchy: Punchy,
    relay: Relay<'a>,
    tun: Tun<'a>,
    firewall: Firewall<'a>,
}

#[derive(Debug, Serialize)]
struct Pki<'a> {
    ca: &'a PathBuf,
    cert: &'a PathBuf,
    key: &'a PathBuf,
}

#[derive(Debug, Serialize)]
struct Lighthouse<'a> {
    am_lighthouse: bool,
    serve_dns: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    dns: Option<Dns>,
    interval: u32,
    hosts: &'a [Ipv4Addr],
}

#[derive(Debug, Serialize)]
struct Dns {
    host: Ipv4Addr,
    port: u16,
}

#[derive(Debug, Serialize)]
struct Listen<'a> {
    host: &'a str,
    port: u16,
}

#[derive(Debug, Serialize)]
struct Punchy {
    punch: bool,
}

#[derive(Debug, Serialize)]
struct Relay<'a> {
    am_relay: bool,
    use_relays: bool,
    relays: &'a [Ipv4Addr],
}

#[derive(Debug, Serialize)]
struct Tun<'a> {
    dev: &'a str,
}

#[derive(Debug, Serialize)]
struct Firewall<'a> {
    inbound: &'a [FirewallRule],
    outbound: &'a [FirewallRule],
}

/// Lighthouse query interval in seconds.
const LIGHTHOUSE_INTERVAL_SECS: u32 = 60;

/// Renders the daemon's YAML configuration for one machine.
///
/// # Errors
///
/// Returns an error if YAML serialization fails.
pub fn daemon_config(config: &ResolvedMachineConfig) -> Result<String> {
    let doc = DaemonConfig {
        pki: Pki {
            ca: &config.pki.ca,
            cert: &config.pki.cert,
            key: &config.pki.key,
        },
        static_host_map: &config.static_host_map,
        lighthouse: Lighthouse {
            am_lighthouse: config.is_lighthouse,
            serve_dns: config.dns.is_some(),
            dns: config.dns.map(|d| Dns {
                host: d.host,
                port: d.port,
            }),
            interval: LIGHTHOUSE_INTERVAL_SECS,
            hosts: &config.lighthouses,
        },
        listen: Listen {
            host: &config.listen_host,
            port: config.listen_port,
        },
        punchy: Punchy { punch: true },
        relay: Relay {
            am_relay: config.am_relay,
            use_relays: config.use_relays,
            relays: &config.relays,
        },
        tun: Tun {
            dev: &config.tun_device,
        },
        firewall: Firewall {
            inbound: &config.firewall.inbound,
            outbound: &config.firewall.outbound,
        },
    };
    Ok(serde_yaml::to_string(&doc)?)
}

/// Renders an instance's hosts table as a delimited block.
#[must_use]
pub fn hosts_block(instance: &InstanceName, entries: &[HostsEntry]) -> String {
    let mut out = format!("# BEGIN {APP_NAME} {instance}\n");
    for entry in entries {
        let _ = writeln!(out, "{} {}", entry.ip, entry.hostname);
    }
    let _ = writeln!(out, "# END {APP_NAME} {instance}");
    out
}
