//! Generator records.
//!
//! A [`GeneratorSpec`] is everything an executor needs to produce a set of
//! vars: identity, sharing, dependencies, the tool and script to run, and the
//! public/secret classification of each output.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use meshtopo_common::types::{InstanceName, MachineName};
use meshtopo_common::vars::{self, VarScope};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Identity of a generator: its scope plus its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeneratorId {
    /// Shared or per-machine.
    pub scope: VarScope,
    /// Generator name, e.g. `nebula-ca-mesh`.
    pub name: String,
}

impl GeneratorId {
    /// Identity of a shared generator.
    #[must_use]
    pub fn shared(name: impl Into<String>) -> Self {
        Self {
            scope: VarScope::Shared,
            name: name.into(),
        }
    }

    /// Identity of a per-machine generator.
    #[must_use]
    pub fn machine(machine: MachineName, name: impl Into<String>) -> Self {
        Self {
            scope: VarScope::Machine(machine),
            name: name.into(),
        }
    }
}

impl fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            VarScope::Shared => write!(f, "{}/{}", vars::SHARED_DIR, self.name),
            VarScope::Machine(m) => write!(f, "{}/{m}/{}", vars::PER_MACHINE_DIR, self.name),
        }
    }
}

impl Serialize for GeneratorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One file a generator produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    /// File name.
    pub name: String,
    /// Secret outputs must never reach public storage or logs.
    pub secret: bool,
}

impl OutputSpec {
    fn public(name: &str) -> Self {
        Self {
            name: name.to_string(),
            secret: false,
        }
    }

    fn secret(name: &str) -> Self {
        Self {
            name: name.to_string(),
            secret: true,
        }
    }
}

/// What a generator produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorKind {
    /// The instance certificate authority.
    Ca {
        /// Owning instance.
        instance: InstanceName,
    },
    /// A machine certificate signed by the instance CA.
    NodeCert {
        /// Owning instance.
        instance: InstanceName,
        /// Certified machine.
        machine: MachineName,
        /// Overlay address bound into the certificate.
        embedded_ip: Ipv4Addr,
        /// Prefix length of the instance network.
        embedded_prefix_len: u8,
    },
}

/// Record handed to a generator executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorSpec {
    /// Identity.
    pub id: GeneratorId,
    /// Whether the outputs are shared across machines.
    pub shared: bool,
    /// Generators whose outputs this one consumes.
    pub dependencies: Vec<GeneratorId>,
    /// External tool the script invokes.
    pub runtime_tool: String,
    /// POSIX shell script; reads `$in/<dependency>/<file>`, writes `$out/<file>`.
    pub script: String,
    /// Declared outputs.
    pub outputs: Vec<OutputSpec>,
    /// Role-specific details.
    #[serde(flatten)]
    pub kind: GeneratorKind,
}

/// Quotes a value for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// The shared CA generator of an instance.
#[must_use]
pub fn ca_generator(instance: &InstanceName, tool: &str) -> GeneratorSpec {
    let script = format!(
        "{tool} ca -name {name} -out-crt \"$out/{crt}\" -out-key \"$out/{key}\"",
        name = shell_quote(instance.as_str()),
        crt = vars::CA_CERT,
        key = vars::CA_KEY,
    );
    GeneratorSpec {
        id: GeneratorId::shared(vars::ca_generator_name(instance)),
        shared: true,
        dependencies: Vec::new(),
        runtime_tool: tool.to_string(),
        script,
        outputs: vec![OutputSpec::public(vars::CA_CERT), OutputSpec::secret(vars::CA_KEY)],
        kind: GeneratorKind::Ca {
            instance: instance.clone(),
        },
    }
}

/// The certificate generator of one machine, signed by the instance CA.
#[must_use]
pub fn node_generator(
    instance: &InstanceName,
    machine: &MachineName,
    ip: Ipv4Addr,
    prefix_len: u8,
    tool: &str,
) -> GeneratorSpec {
    let ca_name = vars::ca_generator_name(instance);
    let script = format!(
        "{tool} sign -ca-crt \"$in/{ca_name}/{ca_crt}\" -ca-key \"$in/{ca_name}/{ca_key}\" \
         -name {name} -ip {ip}/{prefix_len} -out-crt \"$out/{crt}\" -out-key \"$out/{key}\"",
        ca_crt = vars::CA_CERT,
        ca_key = vars::CA_KEY,
        name = shell_quote(machine.as_str()),
        crt = vars::NODE_CERT,
        key = vars::NODE_KEY,
    );
    GeneratorSpec {
        id: GeneratorId::machine(machine.clone(), vars::node_generator_name(instance)),
        shared: false,
        dependencies: vec![GeneratorId::shared(ca_name)],
        runtime_tool: tool.to_string(),
        script,
        outputs: vec![
            OutputSpec::public(vars::NODE_CERT),
            OutputSpec::secret(vars::NODE_KEY),
        ],
        kind: GeneratorKind::NodeCert {
            instance: instance.clone(),
            machine: machine.clone(),
            embedded_ip: ip,
            embedded_prefix_len: prefix_len,
        },
    }
}

/// Content fingerprint of a generator.
///
/// Covers the tool, script, and declared outputs, plus the
/// [`content_digest`] of every dependency. A regenerated CA has a new
/// digest, which invalidates every certificate it signed.
#[must_use]
pub fn fingerprint(spec: &GeneratorSpec, dependency_fingerprints: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(spec.runtime_tool.as_bytes());
    hasher.update([0]);
    hasher.update(spec.script.as_bytes());
    hasher.update([0]);
    for output in &spec.outputs {
        hasher.update(output.name.as_bytes());
        hasher.update([u8::from(output.secret)]);
    }
    for dep in dependency_fingerprints {
        hasher.update([0]);
        hasher.update(dep.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// SHA-256 over a generator's public outputs.
///
/// Secret outputs are left out.
#[must_use]
pub fn content_digest(spec: &GeneratorSpec, files: &BTreeMap<String, Vec<u8>>) -> String {
    let mut hasher = Sha256::new();
    for output in spec.outputs.iter().filter(|o| !o.secret) {
        hasher.update(output.name.as_bytes());
        hasher.update([0]);
        if let Some(content) = files.get(&output.name) {
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(content);
        }
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ca_generator_is_shared_without_dependencies() {
        let spec = ca_generator(&InstanceName::new("mesh"), "nebula-cert");
        assert!(spec.shared);
        assert!(spec.dependencies.is_empty());
        assert_eq!(spec.id.to_string(), "shared/nebula-ca-mesh");
        assert!(spec.script.starts_with("nebula-cert ca -name 'mesh'"));
    }

    #[test]
    fn outputs_classify_keys_as_secret() {
        let ca = ca_generator(&InstanceName::new("mesh"), "nebula-cert");
        let node = node_generator(
            &InstanceName::new("mesh"),
            &MachineName::new("node1"),
            Ipv4Addr::new(10, 87, 0, 10),
            16,
            "nebula-cert",
        );
        for spec in [&ca, &node] {
            for output in &spec.outputs {
                assert_eq!(output.secret, output.name.ends_with(".key"), "{}", output.name);
            }
        }
    }

    #[test]
    fn node_generator_embeds_ip_and_prefix() {
        let spec = node_generator(
            &InstanceName::new("mesh"),
            &MachineName::new("node1"),
            Ipv4Addr::new(10, 87, 0, 10),
            16,
            "nebula-cert",
        );
        assert!(!spec.shared);
        assert_eq!(spec.dependencies, vec![GeneratorId::shared("nebula-ca-mesh")]);
        assert!(spec.script.contains("-ip 10.87.0.10/16"), "{}", spec.script);
        assert!(spec.script.contains("$in/nebula-ca-mesh/ca.key"), "{}", spec.script);
        assert_eq!(spec.id.to_string(), "per-machine/node1/nebula-cert-mesh");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn fingerprint_changes_with_dependencies() {
        let spec = ca_generator(&InstanceName::new("mesh"), "nebula-cert");
        let a = fingerprint(&spec, &[]);
        assert_eq!(a, fingerprint(&spec, &[]));
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint(&spec, &["abc".into()]));
    }

    #[test]
    fn content_digest_tracks_public_outputs_only() {
        let spec = ca_generator(&InstanceName::new("mesh"), "nebula-cert");
        let files = |crt: &str, key: &str| {
            BTreeMap::from([
                (vars::CA_CERT.to_string(), crt.as_bytes().to_vec()),
                (vars::CA_KEY.to_string(), key.as_bytes().to_vec()),
            ])
        };
        let base = content_digest(&spec, &files("crt-1", "key-1"));
        assert_eq!(base, content_digest(&spec, &files("crt-1", "key-2")));
        assert_ne!(base, content_digest(&spec, &files("crt-2", "key-1")));
    }

    #[test]
    fn spec_serializes_interface_record() {
        let spec = ca_generator(&InstanceName::new("mesh"), "nebula-cert");
        let json = serde_json::to_value(&spec).expect("serialize");
        assert_eq!(json["id"], "shared/nebula-ca-mesh");
        assert_eq!(json["shared"], true);
        assert_eq!(json["runtime_tool"], "nebula-cert");
        assert_eq!(json["outputs"][1]["secret"], true);
        assert_eq!(json["kind"], "ca");
    }
}
