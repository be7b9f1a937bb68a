//! Writes resolved configuration to disk.
//!
//! Layout under the output directory:
//!
//! ```text
//! <out>/<instance>/<machine>.yaml   daemon configuration
//! <out>/<instance>/hosts            hosts block
//! ```

use std::path::{Path, PathBuf};

use meshtopo_common::error::{MeshtopoError, Result};
use meshtopo_topology::render;
use meshtopo_topology::resolver::ResolvedInstance;

use crate::planner::Plan;

fn write(path: PathBuf, content: &str) -> Result<PathBuf> {
    std::fs::write(&path, content).map_err(|e| MeshtopoError::Io {
        path: path.clone(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "artifact written");
    Ok(path)
}

/// Writes the artifacts of one instance, returning the written paths.
///
/// # Errors
///
/// Returns an error if a directory or file cannot be written.
pub fn write_instance(instance: &ResolvedInstance, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = out_dir.join(instance.name.as_str());
    std::fs::create_dir_all(&dir).map_err(|e| MeshtopoError::Io {
        path: dir.clone(),
        source: e,
    })?;

    let mut written = Vec::with_capacity(instance.configs.len() + 1);
    for (machine, config) in &instance.configs {
        let yaml = render::daemon_config(config)?;
        written.push(write(dir.join(format!("{machine}.yaml")), &yaml)?);
    }
    let hosts = render::hosts_block(&instance.name, &instance.hosts_table);
    written.push(write(dir.join("hosts"), &hosts)?);

    tracing::info!(instance = %instance.name, files = written.len(), "artifacts written");
    Ok(written)
}

/// Writes the artifacts of every resolved instance of a plan.
///
/// # Errors
///
/// Returns an error if any artifact cannot be written.
pub fn write_artifacts(plan: &Plan, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for instance in plan.resolved() {
        written.extend(write_instance(instance, out_dir)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use meshtopo_topology::parser::parse_topology;

    use super::*;
    use crate::planner::Planner;

    #[test]
    fn writes_one_config_per_machine_and_hosts() {
        let topology = parse_topology(
            r"
instances:
  mesh:
    lighthouses:
      lighthouse1:
        endpoint: 1.2.3.4
        nebula_ip: 10.87.0.1
    nodes:
      node1:
        nebula_ip: 10.87.0.10
",
        )
        .expect("parse");
        let plan = Planner::default().plan(&topology);
        let out = tempfile::tempdir().expect("tempdir");

        let written = write_artifacts(&plan, out.path()).expect("write");
        assert_eq!(written.len(), 3);

        let node = std::fs::read_to_string(out.path().join("mesh/node1.yaml")).expect("node");
        assert!(node.contains("am_lighthouse: false"), "{node}");
        let hosts = std::fs::read_to_string(out.path().join("mesh/hosts")).expect("hosts");
        assert!(hosts.starts_with("# BEGIN meshtopo mesh\n"));
    }
}
