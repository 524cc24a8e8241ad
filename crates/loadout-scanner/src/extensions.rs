//! Extension directory listing (agents, commands, skills, hooks, rules, output styles)

use crate::error::{ScanError, ScanResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Category of a file-based extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionCategory {
    Agents,
    Commands,
    Skills,
    Hooks,
    Rules,
    OutputStyles,
}

impl ExtensionCategory {
    /// All categories in display order
    pub const ALL: [ExtensionCategory; 6] = [
        Self::Agents,
        Self::Commands,
        Self::Skills,
        Self::Hooks,
        Self::Rules,
        Self::OutputStyles,
    ];

    /// Directory name below a scope's .claude directory
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Agents => "agents",
            Self::Commands => "commands",
            Self::Skills => "skills",
            Self::Hooks => "hooks",
            Self::Rules => "rules",
            Self::OutputStyles => "output-styles",
        }
    }
}

impl fmt::Display for ExtensionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for ExtensionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.dir_name() == s)
            .ok_or_else(|| format!("Unknown extension category: {s}"))
    }
}

/// Extension names present per category
pub type ExtensionListing = BTreeMap<ExtensionCategory, BTreeSet<String>>;

/// List the extensions installed below a scope's .claude directory
///
/// Files are named by their stem (`review.md` -> `review`), directories by
/// their name. Hidden entries are skipped. Empty categories are omitted.
///
/// # Errors
/// Returns an error if an existing category directory cannot be read
pub fn list_extensions(root: &Path) -> ScanResult<ExtensionListing> {
    let mut listing = ExtensionListing::new();

    for category in ExtensionCategory::ALL {
        let dir = root.join(category.dir_name());
        if !dir.is_dir() {
            continue;
        }

        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&dir).map_err(|e| ScanError::io(&dir, e))? {
            let entry = entry.map_err(|e| ScanError::io(&dir, e))?;
            let path = entry.path();
            let name = if path.is_dir() {
                path.file_name()
            } else {
                path.file_stem()
            };
            let Some(name) = name.and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.insert(name.to_string());
        }

        if !names.is_empty() {
            listing.insert(category, names);
        }
    }

    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_extensions() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("agents")).unwrap();
        fs::write(root.join("agents/reviewer.md"), "agent").unwrap();
        fs::write(root.join("agents/.DS_Store"), "").unwrap();
        fs::create_dir_all(root.join("skills/pdf")).unwrap();
        fs::create_dir_all(root.join("output-styles")).unwrap();

        let listing = list_extensions(root).unwrap();
        assert_eq!(listing.len(), 2);
        assert!(listing[&ExtensionCategory::Agents].contains("reviewer"));
        assert_eq!(listing[&ExtensionCategory::Agents].len(), 1);
        assert!(listing[&ExtensionCategory::Skills].contains("pdf"));
        assert!(!listing.contains_key(&ExtensionCategory::OutputStyles));
    }

    #[test]
    fn test_category_from_dir_name() {
        assert_eq!(
            "output-styles".parse::<ExtensionCategory>().unwrap(),
            ExtensionCategory::OutputStyles
        );
        assert!("plugins".parse::<ExtensionCategory>().is_err());
    }
}
