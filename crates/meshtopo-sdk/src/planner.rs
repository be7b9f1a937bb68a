//! Resolves whole topologies.
//!
//! Wraps `meshtopo-topology`'s parser and resolver into a high-level API for
//! SDK consumers. Each instance is resolved independently: a validation
//! error in one instance is recorded against that instance and never
//! prevents the others from resolving.

use std::collections::BTreeMap;
use std::path::Path;

use meshtopo_common::config::MeshtopoConfig;
use meshtopo_common::error::{MeshtopoError, Result};
use meshtopo_common::types::InstanceName;
use meshtopo_topology::model::TopologyFile;
use meshtopo_topology::resolver::{ResolvedInstance, resolve_instance};

/// Resolution outcome of every instance in a topology.
#[derive(Debug)]
pub struct Plan {
    /// Per-instance outcome, keyed by instance name.
    pub instances: BTreeMap<InstanceName, Result<ResolvedInstance>>,
}

impl Plan {
    /// Instances that resolved.
    pub fn resolved(&self) -> impl Iterator<Item = &ResolvedInstance> {
        self.instances.values().filter_map(|r| r.as_ref().ok())
    }

    /// Instances that failed, with their error.
    pub fn failures(&self) -> impl Iterator<Item = (&InstanceName, &MeshtopoError)> {
        self.instances
            .iter()
            .filter_map(|(name, r)| r.as_ref().err().map(|e| (name, e)))
    }

    /// Returns `true` if every instance resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Looks up one resolved instance.
    ///
    /// # Errors
    ///
    /// Returns [`MeshtopoError::NotFound`] if the instance is not declared,
    /// or a configuration error carrying the instance's own failure.
    pub fn instance(&self, name: &InstanceName) -> Result<&ResolvedInstance> {
        match self.instances.get(name) {
            Some(Ok(resolved)) => Ok(resolved),
            Some(Err(e)) => Err(MeshtopoError::Config {
                message: format!("instance {name} did not resolve: {e}"),
            }),
            None => Err(MeshtopoError::NotFound {
                kind: "instance",
                id: name.to_string(),
            }),
        }
    }
}

/// High-level resolver for topology files.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: MeshtopoConfig,
}

impl Planner {
    /// Creates a planner with the given configuration.
    #[must_use]
    pub const fn new(config: MeshtopoConfig) -> Self {
        Self { config }
    }

    /// Configuration used for resolution.
    #[must_use]
    pub const fn config(&self) -> &MeshtopoConfig {
        &self.config
    }

    /// Loads a topology file and resolves every instance in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the
    /// topology schema. Per-instance failures are recorded in the [`Plan`].
    pub fn load(&self, path: &Path) -> Result<Plan> {
        let topology = meshtopo_topology::parser::load_topology(path)?;
        Ok(self.plan(&topology))
    }

    /// Resolves every instance of a parsed topology.
    #[must_use]
    pub fn plan(&self, topology: &TopologyFile) -> Plan {
        let instances = topology
            .instances
            .iter()
            .map(|(name, raw)| {
                let name = InstanceName::new(name.as_str());
                let outcome = resolve_instance(&name, raw, &self.config);
                if let Err(e) = &outcome {
                    tracing::error!(instance = %name, error = %e, "instance failed to resolve");
                }
                (name, outcome)
            })
            .collect();
        Plan { instances }
    }
}
