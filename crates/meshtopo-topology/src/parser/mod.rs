//! Topology file loading.
//!
//! Topology files are YAML documents deserialized into
//! [`TopologyFile`](crate::model::TopologyFile). Semantic checks happen later
//! in the validator, per instance, so one broken instance does not hide the
//! others.

pub mod net;

use std::path::Path;

use meshtopo_common::error::{MeshtopoError, Result};

use crate::model::TopologyFile;

/// Parses a topology from YAML source text.
///
/// # Errors
///
/// Returns an error if the input is not valid YAML or does not match the
/// topology schema.
pub fn parse_topology(input: &str) -> Result<TopologyFile> {
    tracing::debug!("parsing topology input");
    let file: TopologyFile = serde_yaml::from_str(input)?;
    tracing::info!(instances = file.instances.len(), "topology parsed");
    Ok(file)
}

/// Reads and parses a topology file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_topology(path: &Path) -> Result<TopologyFile> {
    tracing::info!(path = %path.display(), "loading topology file");
    let content = std::fs::read_to_string(path).map_err(|e| MeshtopoError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_topology(&content)
}
