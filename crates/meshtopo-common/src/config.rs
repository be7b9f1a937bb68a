//! Global configuration model for the resolver and certificate executor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MeshtopoError, Result};

/// How the instance-wide CIDR is picked when lighthouses are involved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CidrPolicy {
    /// The lexicographically smallest lighthouse name declaring a CIDR wins;
    /// disagreement is a warning.
    #[default]
    Canonical,
    /// All lighthouses that declare a CIDR must agree.
    Strict,
}

impl std::str::FromStr for CidrPolicy {
    type Err = MeshtopoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "canonical" => Ok(Self::Canonical),
            "strict" => Ok(Self::Strict),
            other => Err(MeshtopoError::Config {
                message: format!("unknown CIDR policy \"{other}\" (expected canonical or strict)"),
            }),
        }
    }
}

/// Root configuration for meshtopo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshtopoConfig {
    /// Port assumed for lighthouses that do not set one.
    pub default_port: u16,
    /// CIDR assumed when no lighthouse declares one.
    pub default_cidr: String,
    /// CIDR selection rule.
    pub cidr_policy: CidrPolicy,
    /// Suffix of hostnames emitted in the hosts table.
    pub hosts_suffix: String,
    /// Base directory of the public and secret var stores.
    pub store_dir: PathBuf,
    /// External certificate tool invoked by generators.
    pub cert_tool: String,
}

impl Default for MeshtopoConfig {
    fn default() -> Self {
        Self {
            default_port: crate::constants::DEFAULT_LIGHTHOUSE_PORT,
            default_cidr: crate::constants::DEFAULT_NETWORK_CIDR.to_string(),
            cidr_policy: CidrPolicy::default(),
            hosts_suffix: crate::constants::DEFAULT_HOSTS_SUFFIX.to_string(),
            store_dir: crate::constants::default_store_dir(),
            cert_tool: crate::constants::DEFAULT_CERT_TOOL.to_string(),
        }
    }
}

impl MeshtopoConfig {
    /// Loads a YAML configuration file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| MeshtopoError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = MeshtopoConfig::default();
        assert_eq!(config.default_port, 4242);
        assert_eq!(config.default_cidr, "10.87.0.0/16");
        assert_eq!(config.cidr_policy, CidrPolicy::Canonical);
        assert_eq!(config.cert_tool, "nebula-cert");
    }

    #[test]
    fn load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "cidr_policy: strict\ndefault_port: 5000").expect("write");

        let config = MeshtopoConfig::load(file.path()).expect("should load");
        assert_eq!(config.cidr_policy, CidrPolicy::Strict);
        assert_eq!(config.default_port, 5000);
        assert_eq!(config.hosts_suffix, "nebula");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = MeshtopoConfig::load(Path::new("/nonexistent/meshtopo.yaml")).unwrap_err();
        assert!(matches!(err, MeshtopoError::Io { .. }));
    }

    #[test]
    fn cidr_policy_parses_from_str() {
        assert_eq!("strict".parse::<CidrPolicy>().expect("parse"), CidrPolicy::Strict);
        assert!("loose".parse::<CidrPolicy>().is_err());
    }
}
