//! Install path repair
//!
//! Some marketplaces keep their plugins below a subdirectory, and older
//! Claude Code releases recorded the marketplace root joined with the plugin
//! name instead. The table below maps a marketplace name fragment to the
//! subdirectory that has to be inserted. Rules are tried in order; the first
//! one whose corrected path exists wins.

use std::path::{Path, PathBuf};

/// How to correct a path matched by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Insert a subdirectory between the parent and the final component
    InsertSubdir(&'static str),
    /// Replace the final component's parent with the given directory name
    ReplaceParent(&'static str),
}

/// One `(pattern, correction)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairRule {
    /// Substring matched against the recorded install path
    pub pattern: &'static str,
    pub correction: Correction,
}

/// Outcome of checking a recorded install path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// The recorded path exists
    Intact,
    /// The recorded path is stale; the plugin lives here instead
    Corrected(PathBuf),
    /// The recorded path is stale and no rule located the plugin
    NoMatch,
}

/// Built-in repair rules
pub const DEFAULT_REPAIR_RULES: &[RepairRule] = &[
    RepairRule {
        pattern: "claude-code-plugins",
        correction: Correction::InsertSubdir("plugins"),
    },
    RepairRule {
        pattern: "anthropic-agent-skills",
        correction: Correction::InsertSubdir("skills"),
    },
    RepairRule {
        pattern: "claude-code-templates",
        correction: Correction::InsertSubdir("plugins"),
    },
];

impl Correction {
    fn apply(self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?;
        let parent = path.parent()?;
        match self {
            Self::InsertSubdir(subdir) => Some(parent.join(subdir).join(name)),
            Self::ReplaceParent(dir) => Some(parent.parent()?.join(dir).join(name)),
        }
    }
}

/// Check a recorded install path and try to locate the plugin if it moved
#[must_use]
pub fn repair_install_path(path: &Path, rules: &[RepairRule]) -> Repair {
    if path.exists() {
        return Repair::Intact;
    }

    let recorded = path.to_string_lossy();
    for rule in rules {
        if !recorded.contains(rule.pattern) {
            continue;
        }
        if let Some(candidate) = rule.correction.apply(path) {
            if candidate.exists() {
                tracing::debug!(
                    from = %path.display(),
                    to = %candidate.display(),
                    pattern = rule.pattern,
                    "repaired plugin install path"
                );
                return Repair::Corrected(candidate);
            }
        }
    }

    Repair::NoMatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_existing_path_is_intact() {
        let temp = TempDir::new().unwrap();
        assert_eq!(repair_install_path(temp.path(), DEFAULT_REPAIR_RULES), Repair::Intact);
    }

    #[test]
    fn test_inserts_subdir_for_matching_marketplace() {
        let temp = TempDir::new().unwrap();
        let market = temp.path().join("marketplaces").join("claude-code-plugins");
        fs::create_dir_all(market.join("plugins").join("pr-review")).unwrap();

        let recorded = market.join("pr-review");
        assert_eq!(
            repair_install_path(&recorded, DEFAULT_REPAIR_RULES),
            Repair::Corrected(market.join("plugins").join("pr-review"))
        );
    }

    #[test]
    fn test_rules_apply_in_order() {
        let temp = TempDir::new().unwrap();
        let market = temp.path().join("claude-code-plugins");
        // Only the later rule's candidate exists
        fs::create_dir_all(temp.path().join("plugins").join("lint")).unwrap();

        let rules = [
            RepairRule {
                pattern: "claude-code-plugins",
                correction: Correction::InsertSubdir("plugins"),
            },
            RepairRule {
                pattern: "claude-code-plugins",
                correction: Correction::ReplaceParent("plugins"),
            },
        ];
        assert_eq!(
            repair_install_path(&market.join("lint"), &rules),
            Repair::Corrected(temp.path().join("plugins").join("lint"))
        );
    }

    #[test]
    fn test_no_match_is_typed() {
        let temp = TempDir::new().unwrap();
        let recorded = temp.path().join("unknown-market").join("thing");
        assert_eq!(repair_install_path(&recorded, DEFAULT_REPAIR_RULES), Repair::NoMatch);
    }
}
