//! Mapping user-supplied profile names to files
//!
//! Profiles may live in nested directories below the profiles root. A bare
//! name is searched for everywhere; a name containing `/` is taken as a path
//! relative to the root. `./name` addresses the file at the root itself.

use crate::error::{LoadoutError, LoadoutResult};
use crate::util::safe_join;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PROFILE_EXT: &str = "json";

/// A profile file found below the profiles root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    /// File stem
    pub name: String,
    /// Path relative to the root, `/`-separated, without the extension
    pub rel_path: String,
    /// Absolute file path
    pub path: PathBuf,
}

/// List every profile file below `root`, sorted by relative path
///
/// Hidden files and directories are skipped. A missing root yields an
/// empty list.
///
/// # Errors
/// Returns an error if a directory cannot be read
pub fn find_profiles(root: &Path) -> LoadoutResult<Vec<ProfileEntry>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|e| LoadoutError::Io {
            path: e.path().unwrap_or(root).to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXT)
        {
            continue;
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel_path = rel
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        entries.push(ProfileEntry {
            name,
            rel_path,
            path: path.to_path_buf(),
        });
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

/// Resolve a profile name or relative path to exactly one file
///
/// # Errors
/// - `ProfileNotFound` when nothing matches
/// - `AmbiguousProfile` when a bare name matches several files
/// - `InvalidName` when a path tries to leave the root
pub fn resolve_profile_path(root: &Path, name_or_path: &str) -> LoadoutResult<PathBuf> {
    let trimmed = name_or_path.trim_end_matches(".json");
    let (explicit, trimmed) = match trimmed.strip_prefix("./") {
        Some(rest) => (true, rest),
        None => (trimmed.contains('/'), trimmed),
    };

    if explicit {
        let path = safe_join(root, Path::new(&format!("{trimmed}.{PROFILE_EXT}")))?;
        if path.is_file() {
            return Ok(path);
        }
        return Err(LoadoutError::ProfileNotFound(name_or_path.to_string()));
    }

    let mut matches: Vec<ProfileEntry> = find_profiles(root)?
        .into_iter()
        .filter(|e| e.name == trimmed)
        .collect();

    match matches.len() {
        0 => Err(LoadoutError::ProfileNotFound(name_or_path.to_string())),
        1 => Ok(matches.remove(0).path),
        _ => {
            tracing::debug!(name = trimmed, count = matches.len(), "ambiguous profile name");
            Err(LoadoutError::AmbiguousProfile {
                name: trimmed.to_string(),
                paths: matches.into_iter().map(|e| e.rel_path).collect(),
            })
        }
    }
}

/// Form of a relative path that resolves to exactly that file
///
/// Root-level profiles get a `./` prefix so they are not searched for as a
/// bare name.
#[must_use]
pub fn explicit_path(rel_path: &str) -> String {
    if rel_path.contains('/') {
        rel_path.to_string()
    } else {
        format!("./{rel_path}")
    }
}
