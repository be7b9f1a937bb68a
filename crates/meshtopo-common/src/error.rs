//! Unified error types for the meshtopo workspace.
//!
//! Library crates return these variants directly; the CLI wraps them in
//! `anyhow` at the process boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MeshtopoError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A machine's settings are malformed or missing a required value.
    ///
    /// Aborts resolution of the owning instance only.
    #[error("instance \"{instance}\", machine \"{machine}\": {message}")]
    Validation {
        /// Instance being resolved.
        instance: String,
        /// Machine whose settings failed validation (empty for instance-wide checks).
        machine: String,
        /// Description of the problem.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A certificate generator failed to produce its outputs.
    #[error("generator {generator} failed: {message}")]
    Generator {
        /// Identifier of the failed generator.
        generator: String,
        /// Description of the failure.
        message: String,
    },

    /// A generator was aborted before it finished.
    #[error("generator {generator} was cancelled")]
    Cancelled {
        /// Identifier of the cancelled generator.
        generator: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML serialization or deserialization failed.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl MeshtopoError {
    /// Builds a [`MeshtopoError::Validation`] for one machine of an instance.
    pub fn validation(
        instance: impl Into<String>,
        machine: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            instance: instance.into(),
            machine: machine.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for errors that stem from invalid user input.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MeshtopoError>;
