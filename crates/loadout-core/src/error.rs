//! Error types for the reconciliation engine

use crate::apply::ApplyResult;
use crate::util::PathError;
use loadout_scanner::ScanError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for engine operations
pub type LoadoutResult<T> = Result<T, LoadoutError>;

/// Errors that can occur while resolving, diffing or applying profiles
///
/// Failures of individual install/uninstall operations are not errors at
/// this level; they are collected in [`ApplyResult::errors`].
#[derive(Debug, Error)]
pub enum LoadoutError {
    /// A settings, profile or breadcrumb file could not be read or written
    #[error("I/O error for {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// A file could not be parsed or serialized
    #[error("JSON error in {path}: {message}")]
    Json { path: PathBuf, message: String },

    /// Reading live state failed
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// No profile with this name on disk or among the built-ins
    #[error("Profile '{0}' not found")]
    ProfileNotFound(String),

    /// A bare name matched profiles in several directories
    #[error("Profile name '{name}' is ambiguous, it matches: {}. Use the full path to pick one", paths.join(", "))]
    AmbiguousProfile { name: String, paths: Vec<String> },

    /// Stack includes form a cycle
    #[error("Include cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// Profile content violates the profile shape rules
    #[error("Invalid profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    /// Name unusable as a file name
    #[error("Invalid name: {0}")]
    InvalidName(#[from] PathError),

    /// Target of a create/clone/rename already exists
    #[error("Profile '{0}' already exists")]
    ProfileExists(String),

    /// Operation not allowed on a built-in profile
    #[error("'{name}' is a built-in profile: {hint}")]
    BuiltinProtected { name: String, hint: String },

    /// Live user scope has items the profile does not declare and no
    /// keep/replace decision was made
    #[error(
        "User scope has {} item(s) not in the profile: {}. Re-run with --replace to remove them",
        extras.len(),
        extras.join(", ")
    )]
    ExtrasRequireDecision { extras: Vec<String> },

    /// Profile carries a post-apply hook that was not confirmed
    #[error("Profile '{0}' runs a post-apply hook; it must be approved before applying")]
    HookNotApproved(String),

    /// Post-apply hook failed after the configuration was changed
    #[error("Post-apply hook for '{profile}' failed: {message} (configuration changes were already applied)")]
    Hook {
        profile: String,
        message: String,
        result: Box<ApplyResult>,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoadoutError {
    /// Get the error code for CLI/JSON output
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } | Self::Json { .. } | Self::Scan(_) => "STRUCTURAL_ERROR",
            Self::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            Self::AmbiguousProfile { .. } => "AMBIGUOUS_PROFILE",
            Self::Cycle { .. } => "INCLUDE_CYCLE",
            Self::InvalidProfile { .. } | Self::InvalidName(_) => "VALIDATION_ERROR",
            Self::ProfileExists(_) => "CONFLICT",
            Self::BuiltinProtected { .. } => "PERMISSION_DENIED",
            Self::ExtrasRequireDecision { .. } => "EXTRAS_DECISION_REQUIRED",
            Self::HookNotApproved(_) => "HOOK_NOT_APPROVED",
            Self::Hook { .. } => "HOOK_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the operation stopped before touching any file
    #[must_use]
    pub fn is_pre_mutation(&self) -> bool {
        !matches!(self, Self::Hook { .. })
    }

    pub(crate) fn io(path: impl AsRef<Path>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn json(path: impl AsRef<Path>, err: &serde_json::Error) -> Self {
        Self::Json {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
