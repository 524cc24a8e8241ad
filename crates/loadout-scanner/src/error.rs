//! Error types for the loadout scanner

use crate::types::Scope;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for scanner operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur during scanning
#[derive(Error, Debug)]
pub enum ScanError {
    /// IO error occurred
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse JSON
    #[error("Failed to parse JSON in {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A file parsed as JSON but has the wrong shape
    #[error("Unexpected structure in {path}: {message}")]
    InvalidStructure { path: PathBuf, message: String },

    /// Project or local scope requested without a project directory
    #[error("A project directory is required for {0} scope")]
    ProjectDirRequired(Scope),

    /// Home directory not found
    #[error("Home directory not found")]
    HomeNotFound,
}

impl ScanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            path: path.into(),
            source,
        }
    }
}
