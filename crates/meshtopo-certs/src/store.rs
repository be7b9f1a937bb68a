//! Var storage.
//!
//! Public outputs (certificates) and secret outputs (private keys) live in
//! separate trees so that a public store can be committed or published
//! without ever containing key material.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use meshtopo_common::error::{MeshtopoError, Result};
use meshtopo_common::vars;

use crate::generator::GeneratorId;

/// Backend that persists generator outputs.
pub trait VarStore: Send + Sync {
    /// Reads a var, returning `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the var exists but cannot be read.
    fn get(&self, generator: &GeneratorId, var: &str, secret: bool) -> Result<Option<Vec<u8>>>;

    /// Writes a var, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the var cannot be written.
    fn set(&self, generator: &GeneratorId, var: &str, secret: bool, value: &[u8]) -> Result<()>;

    /// Returns `true` if the var has been written.
    fn exists(&self, generator: &GeneratorId, var: &str, secret: bool) -> bool;
}

/// Filesystem store rooted at one directory with `public/` and `secret/` trees.
#[derive(Debug, Clone)]
pub struct FsVarStore {
    root: PathBuf,
}

impl FsVarStore {
    /// Creates a store rooted at `root`. Nothing is created until the first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of a var on disk.
    #[must_use]
    pub fn path(&self, generator: &GeneratorId, var: &str, secret: bool) -> PathBuf {
        let tree = if secret { vars::SECRET_DIR } else { vars::PUBLIC_DIR };
        self.root
            .join(tree)
            .join(vars::relative_path(&generator.scope, &generator.name, var))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> MeshtopoError {
    MeshtopoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File, path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File, _path: &Path) -> Result<()> {
    Ok(())
}

impl VarStore for FsVarStore {
    fn get(&self, generator: &GeneratorId, var: &str, secret: bool) -> Result<Option<Vec<u8>>> {
        let path = self.path(generator, var, secret);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn set(&self, generator: &GeneratorId, var: &str, secret: bool, value: &[u8]) -> Result<()> {
        let path = self.path(generator, var, secret);
        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_err(dir, e))?;
        if secret {
            restrict_permissions(tmp.as_file(), &path)?;
        }
        tmp.write_all(value).map_err(|e| io_err(&path, e))?;
        let _ = tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;

        tracing::debug!(generator = %generator, var, secret, "var stored");
        Ok(())
    }

    fn exists(&self, generator: &GeneratorId, var: &str, secret: bool) -> bool {
        self.path(generator, var, secret).is_file()
    }
}
