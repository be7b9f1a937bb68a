//! Naming and on-disk layout of generated vars.
//!
//! Generators and the files they produce are addressed the same way by the
//! resolver (to point the daemon at its PKI files) and by the certificate
//! executor (to store them), so the layout lives here.

use std::path::PathBuf;

use crate::types::{InstanceName, MachineName};

/// CA certificate file produced by the shared generator.
pub const CA_CERT: &str = "ca.crt";
/// CA private key produced by the shared generator.
pub const CA_KEY: &str = "ca.key";
/// Machine certificate produced by the per-machine generator.
pub const NODE_CERT: &str = "node.crt";
/// Machine private key produced by the per-machine generator.
pub const NODE_KEY: &str = "node.key";

/// Directory for vars shared by every machine of an instance.
pub const SHARED_DIR: &str = "shared";
/// Directory for vars owned by a single machine.
pub const PER_MACHINE_DIR: &str = "per-machine";
/// Subdirectory of the store root holding public vars.
pub const PUBLIC_DIR: &str = "public";
/// Subdirectory of the store root holding secret vars.
pub const SECRET_DIR: &str = "secret";

/// Who a generator's outputs belong to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarScope {
    /// One copy for the whole instance.
    Shared,
    /// One copy per machine.
    Machine(MachineName),
}

/// Name of the instance's CA generator.
pub fn ca_generator_name(instance: &InstanceName) -> String {
    format!("{}-ca-{instance}", crate::constants::SERVICE_NAME)
}

/// Name of the per-machine certificate generator of an instance.
pub fn node_generator_name(instance: &InstanceName) -> String {
    format!("{}-cert-{instance}", crate::constants::SERVICE_NAME)
}

/// Path of a var relative to a store root.
///
/// Shared vars live under `shared/<generator>/<var>`, machine vars under
/// `per-machine/<machine>/<generator>/<var>`.
pub fn relative_path(scope: &VarScope, generator: &str, var: &str) -> PathBuf {
    let base = match scope {
        VarScope::Shared => PathBuf::from(SHARED_DIR),
        VarScope::Machine(machine) => PathBuf::from(PER_MACHINE_DIR).join(machine.as_str()),
    };
    base.join(generator).join(var)
}
