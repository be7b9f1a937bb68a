//! Persistent generator state.
//!
//! Maintains a local JSON index of generator fingerprints so a second
//! evaluation with unchanged inputs finds every generator already done.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use meshtopo_common::error::{MeshtopoError, Result};
use serde::{Deserialize, Serialize};

use crate::generator::GeneratorId;

/// Persistent record of one completed generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Fingerprint the stored outputs were produced under.
    pub fingerprint: String,
    /// When the outputs were produced.
    pub generated_at: DateTime<Utc>,
}

/// Index of completed generators keyed by generator identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateIndex {
    /// Entries keyed by the display form of [`GeneratorId`].
    pub entries: BTreeMap<String, StateEntry>,
}

impl StateIndex {
    /// Loads the index, returning an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading state index");
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(MeshtopoError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Persists the index to disk atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        tracing::debug!(path = %path.display(), entries = self.entries.len(), "saving state index");
        let io_err = |source| MeshtopoError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&serde_json::to_vec_pretty(self)?)
            .map_err(io_err)?;
        let _ = tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Fingerprint recorded for a generator.
    #[must_use]
    pub fn fingerprint(&self, id: &GeneratorId) -> Option<&str> {
        self.entries
            .get(&id.to_string())
            .map(|entry| entry.fingerprint.as_str())
    }

    /// Records a completed generator.
    pub fn record(&mut self, id: &GeneratorId, fingerprint: impl Into<String>) {
        let _ = self.entries.insert(
            id.to_string(),
            StateEntry {
                fingerprint: fingerprint.into(),
                generated_at: Utc::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = StateIndex::load(&dir.path().join("state.json")).expect("load");
        assert!(index.entries.is_empty());
    }

    #[test]
    fn save_then_load_keeps_fingerprints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.json");
        let id = GeneratorId::shared("nebula-ca-mesh");

        let mut index = StateIndex::default();
        index.record(&id, "abc123");
        index.save(&path).expect("save");

        let loaded = StateIndex::load(&path).expect("load");
        assert_eq!(loaded.fingerprint(&id), Some("abc123"));
        assert_eq!(loaded, index);
    }

    #[test]
    fn corrupt_index_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").expect("write");
        assert!(StateIndex::load(&path).is_err());
    }
}
