//! Path and file helpers

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::error::{LoadoutError, LoadoutResult};

/// Errors related to path validation
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Path traversal attempt detected: {0}")]
    TraversalAttempt(String),

    #[error("Invalid path component: {0}")]
    InvalidComponent(String),
}

/// Join an untrusted relative path onto a root without escaping it
///
/// # Errors
/// Returns an error if the path is absolute or climbs above the root
pub fn safe_join(root: &Path, untrusted_path: &Path) -> Result<PathBuf, PathError> {
    let normalized = normalize_path(untrusted_path)?;
    Ok(root.join(normalized))
}

/// Normalize a path by removing . and .. components where possible
fn normalize_path(path: &Path) -> Result<PathBuf, PathError> {
    let mut normalized = PathBuf::new();
    let mut depth: usize = 0;

    for component in path.components() {
        match component {
            Component::Normal(c) => {
                if c.to_string_lossy().contains('\0') {
                    return Err(PathError::InvalidComponent("Null byte in path".to_string()));
                }
                normalized.push(c);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(PathError::TraversalAttempt(path.display().to_string()));
                }
                normalized.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::InvalidComponent(
                    "Absolute path not allowed".to_string(),
                ));
            }
        }
    }

    if depth == 0 {
        return Err(PathError::InvalidComponent("Empty path".to_string()));
    }
    Ok(normalized)
}

/// Validate a profile name for use as a file name
/// Names must not contain path separators or .. sequences
///
/// # Errors
/// Returns an error if the name is invalid
pub fn validate_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() {
        return Err(PathError::InvalidComponent("Empty name".to_string()));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(PathError::TraversalAttempt(format!(
            "Name contains path separator: {name}"
        )));
    }

    if name.contains("..") {
        return Err(PathError::TraversalAttempt(format!(
            "Name contains parent directory reference: {name}"
        )));
    }

    if name.starts_with('.') {
        return Err(PathError::InvalidComponent(format!(
            "Name cannot start with dot: {name}"
        )));
    }

    if name.contains('\0') {
        return Err(PathError::InvalidComponent(
            "Name contains null byte".to_string(),
        ));
    }

    Ok(())
}

/// Serialize a value as pretty JSON and replace `path` atomically
///
/// The document is written to a temp file in the same directory and then
/// renamed over the target, so readers never see a half-written file.
///
/// # Errors
/// Returns an error if the directory cannot be created or the file written
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> LoadoutResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| LoadoutError::io(parent, &e))?;

    let mut content =
        serde_json::to_string_pretty(value).map_err(|e| LoadoutError::json(path, &e))?;
    content.push('\n');

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| LoadoutError::io(parent, &e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| LoadoutError::io(path, &e))?;
    tmp.persist(path)
        .map_err(|e| LoadoutError::io(path, &e.error))?;
    Ok(())
}

/// Read and parse a JSON file, returning `None` if it does not exist
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed
pub fn read_json_optional<T: serde::de::DeserializeOwned>(path: &Path) -> LoadoutResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LoadoutError::io(path, &e)),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| LoadoutError::json(path, &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_safe_join_nested() {
        let root = PathBuf::from("/tmp/profiles");
        let result = safe_join(&root, Path::new("backend/api.json")).unwrap();
        assert_eq!(result, PathBuf::from("/tmp/profiles/backend/api.json"));
    }

    #[test]
    fn test_safe_join_rejects_traversal() {
        let root = PathBuf::from("/tmp/profiles");
        assert!(safe_join(&root, Path::new("../etc/passwd")).is_err());
        assert!(safe_join(&root, Path::new("a/../../b")).is_err());
    }

    #[test]
    fn test_safe_join_rejects_absolute() {
        let root = PathBuf::from("/tmp/profiles");
        assert!(safe_join(&root, Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("backend-go").is_ok());
        assert!(validate_name("my_profile2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("foo/bar").is_err());
        assert!(validate_name(".hidden").is_err());
    }

    #[test]
    fn test_write_json_atomic_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/file.json");
        write_json_atomic(&path, &serde_json::json!({ "a": 1 })).unwrap();

        let back: Option<serde_json::Value> = read_json_optional(&path).unwrap();
        assert_eq!(back.unwrap()["a"], 1);
    }

    #[test]
    fn test_read_json_optional_missing() {
        let temp = TempDir::new().unwrap();
        let missing: Option<serde_json::Value> =
            read_json_optional(&temp.path().join("nope.json")).unwrap();
        assert!(missing.is_none());
    }
}
