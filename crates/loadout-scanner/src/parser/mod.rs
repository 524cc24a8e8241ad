//! Parsers for Claude Code configuration files

pub mod mcp;
pub mod settings;

use crate::error::{ScanError, ScanResult};
use std::fs;
use std::path::Path;

/// Read a file that may legitimately be absent
///
/// # Errors
/// Returns an error if the file exists but cannot be read
pub fn read_optional(path: &Path) -> ScanResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ScanError::io(path, e)),
    }
}
