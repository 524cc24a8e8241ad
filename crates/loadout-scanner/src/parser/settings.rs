//! Settings.json parser

use crate::error::{ScanError, ScanResult};
use crate::parser::read_optional;
use crate::settings::SettingsFile;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Raw settings.json structure for parsing
///
/// Only the fields loadout reconciles are modelled; the writer in
/// `loadout-core` round-trips everything else untouched.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    #[serde(default)]
    enabled_plugins: BTreeMap<String, bool>,
}

/// Parse a settings.json file
///
/// # Errors
/// Returns an error if parsing fails
pub fn parse_settings(path: &Path, content: &str) -> ScanResult<SettingsFile> {
    if content.trim().is_empty() {
        return Ok(SettingsFile {
            path: path.to_path_buf(),
            ..SettingsFile::default()
        });
    }

    let raw: RawSettings =
        serde_json::from_str(content).map_err(|e| ScanError::json(path, e))?;

    Ok(SettingsFile {
        path: path.to_path_buf(),
        enabled_plugins: raw.enabled_plugins,
    })
}

/// Load a settings file, treating a missing file as empty
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed
pub fn load_settings(path: &Path) -> ScanResult<SettingsFile> {
    match read_optional(path)? {
        Some(content) => parse_settings(path, &content),
        None => Ok(SettingsFile {
            path: path.to_path_buf(),
            ..SettingsFile::default()
        }),
    }
}
