//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// UDP port a lighthouse listens on when none is configured.
pub const DEFAULT_LIGHTHOUSE_PORT: u16 = 4242;

/// Listen port for nodes when none is configured. `0` lets the daemon pick.
pub const DEFAULT_NODE_PORT: u16 = 0;

/// Overlay CIDR used when no lighthouse declares one.
pub const DEFAULT_NETWORK_CIDR: &str = "10.87.0.0/16";

/// Port a DNS-enabled lighthouse answers on.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Address every daemon binds its listener to.
pub const LISTEN_HOST: &str = "0.0.0.0";

/// Wildcard used by firewall rules.
pub const ANY: &str = "any";

/// Routing priority exported for every overlay instance.
pub const NETWORKING_PRIORITY: i64 = 850;

/// Service name used in generator identifiers, scope keys, and device names.
pub const SERVICE_NAME: &str = "nebula";

/// Default suffix appended to machine names in the hosts table.
pub const DEFAULT_HOSTS_SUFFIX: &str = "nebula";

/// Name of the external certificate tool.
pub const DEFAULT_CERT_TOOL: &str = "nebula-cert";

/// Maximum length of a Linux network interface name.
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Application name used in CLI output and hosts-file markers.
pub const APP_NAME: &str = "meshtopo";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "mtopo";

/// Default base directory when no home directory is available.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/meshtopo";

/// Returns the data directory, preferring `$HOME/.meshtopo` and falling
/// back to `/var/lib/meshtopo`.
fn resolve_data_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_or_else(
            |_| PathBuf::from(SYSTEM_DATA_DIR),
            |home| PathBuf::from(home).join(".meshtopo"),
        )
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Returns the default var store directory.
pub fn default_store_dir() -> PathBuf {
    data_dir().join("vars")
}
