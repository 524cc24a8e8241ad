//! Profiles compiled into the binary
//!
//! Built-ins are read-only. A file of the same name at the root of the
//! profiles directory overrides one; `restore` deletes that override.

use super::types::Profile;
use crate::error::{LoadoutError, LoadoutResult};
use sha2::{Digest, Sha256};

const BUILTINS: &[(&str, &str)] = &[
    ("frontend", include_str!("../../profiles/frontend.json")),
    ("backend", include_str!("../../profiles/backend.json")),
    ("fullstack", include_str!("../../profiles/fullstack.json")),
];

/// Names of all built-in profiles
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

/// Whether a name belongs to a built-in profile
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|(n, _)| *n == name)
}

/// Parse a built-in profile by name
///
/// # Errors
/// Returns `InvalidProfile` if the embedded document is malformed
pub fn load_builtin(name: &str) -> LoadoutResult<Option<Profile>> {
    let Some((_, json)) = BUILTINS.iter().find(|(n, _)| *n == name) else {
        return Ok(None);
    };
    let profile: Profile = serde_json::from_str(json)
        .map_err(|e| LoadoutError::invalid(name, format!("embedded profile is malformed: {e}")))?;
    Ok(Some(profile))
}

/// Hash of a profile's canonical JSON form
///
/// Two profiles with equal content hash equal regardless of key order or
/// whitespace in the files they were read from.
#[must_use]
pub fn content_hash(profile: &Profile) -> String {
    let canonical = serde_json::to_vec(profile).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}
