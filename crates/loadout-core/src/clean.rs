//! Orphaned plugin cleanup
//!
//! An orphan is an `enabledPlugins` entry whose plugin is not installed at
//! that scope, or whose install directory is gone and cannot be located
//! through the install-path repair rules.

use crate::error::LoadoutResult;
use crate::settings::{LiveSettings, ScopeState};
use loadout_scanner::{repair_install_path, Repair, Scope, DEFAULT_REPAIR_RULES};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Why a plugin entry is considered orphaned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanReason {
    /// No install record for this scope
    NotInstalled,
    /// Install record points at a directory that no longer exists
    MissingFiles(PathBuf),
}

impl std::fmt::Display for OrphanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInstalled => write!(f, "not installed"),
            Self::MissingFiles(path) => write!(f, "install directory missing: {}", path.display()),
        }
    }
}

/// An enabled plugin with nothing behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub scope: Scope,
    pub reference: String,
    pub reason: OrphanReason,
}

/// Find orphaned plugin entries in the given scopes
///
/// # Errors
/// Returns an error if settings or install records cannot be read
pub fn find_orphans(live: &dyn LiveSettings, scopes: &[Scope]) -> LoadoutResult<Vec<Orphan>> {
    let installed = live.installed_plugins()?;
    let mut orphans = Vec::new();

    for scope in scopes {
        let state = live.load_scope(*scope)?;
        for reference in &state.plugins {
            let reason = match installed.find(reference, *scope, live.project_dir()) {
                None => Some(OrphanReason::NotInstalled),
                Some(record) => match repair_install_path(&record.install_path, DEFAULT_REPAIR_RULES) {
                    Repair::Intact | Repair::Corrected(_) => None,
                    Repair::NoMatch => Some(OrphanReason::MissingFiles(record.install_path.clone())),
                },
            };
            if let Some(reason) = reason {
                tracing::debug!(%scope, plugin = %reference, %reason, "orphaned plugin");
                orphans.push(Orphan {
                    scope: *scope,
                    reference: reference.clone(),
                    reason,
                });
            }
        }
    }
    Ok(orphans)
}

/// Remove orphaned entries from their settings files
///
/// Returns the number of entries removed.
///
/// # Errors
/// Returns an error if a settings file cannot be written
pub fn remove_orphans(live: &dyn LiveSettings, orphans: &[Orphan]) -> LoadoutResult<usize> {
    let mut by_scope: BTreeMap<Scope, Vec<&str>> = BTreeMap::new();
    for orphan in orphans {
        by_scope
            .entry(orphan.scope)
            .or_default()
            .push(orphan.reference.as_str());
    }

    let mut removed = 0;
    for (scope, references) in by_scope {
        live.update_scope(scope, &mut |state: &mut ScopeState| {
            for reference in &references {
                if state.plugins.remove(*reference) {
                    removed += 1;
                }
            }
        })?;
    }
    tracing::info!(removed, "removed orphaned plugin entries");
    Ok(removed)
}
