//! Last-applied breadcrumbs and drift detection
//!
//! After every apply the profile name is recorded per scope. Project and
//! local entries remember the directory they were applied in and only count
//! there; user entries count everywhere.

use crate::apply::load_live;
use crate::diff::{drift_diff, NormalizedProfile, ProfileDiff};
use crate::error::LoadoutResult;
use crate::profile::{resolve_includes, ProfileLoader, ProfileShape};
use crate::settings::LiveSettings;
use crate::util::{read_json_optional, write_json_atomic};
use chrono::{DateTime, Utc};
use loadout_scanner::Scope;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Record of one apply to one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreadcrumbEntry {
    pub profile: String,
    pub applied_at: DateTime<Utc>,
    /// Directory of a project or local apply; `None` for user scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

/// All breadcrumbs, at most one per scope
#[derive(Debug, Clone)]
pub struct Breadcrumbs {
    path: PathBuf,
    entries: BTreeMap<Scope, BreadcrumbEntry>,
}

impl Breadcrumbs {
    /// Load breadcrumbs; a missing file means nothing was applied yet
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed
    pub fn load(path: &Path) -> LoadoutResult<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            entries: read_json_optional(path)?.unwrap_or_default(),
        })
    }

    /// Write breadcrumbs back to disk
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save(&self) -> LoadoutResult<()> {
        write_json_atomic(&self.path, &self.entries)?;
        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "saved breadcrumbs");
        Ok(())
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<Scope, BreadcrumbEntry> {
        &self.entries
    }

    /// Record that `profile` was applied to `scopes`, replacing older entries
    pub fn record_apply(&mut self, profile: &str, directory: Option<&Path>, scopes: &[Scope]) {
        let now = Utc::now();
        for scope in scopes {
            let directory = if scope.is_project_bound() {
                directory.map(Path::to_path_buf)
            } else {
                None
            };
            self.entries.insert(
                *scope,
                BreadcrumbEntry {
                    profile: profile.to_string(),
                    applied_at: now,
                    directory,
                },
            );
        }
    }

    fn counts_for(scope: Scope, entry: &BreadcrumbEntry, directory: Option<&Path>) -> bool {
        !scope.is_project_bound() || (entry.directory.is_some() && entry.directory.as_deref() == directory)
    }

    /// Entries that apply in `directory`
    #[must_use]
    pub fn active(&self, directory: Option<&Path>) -> BTreeMap<Scope, &BreadcrumbEntry> {
        self.entries
            .iter()
            .filter(|(scope, entry)| Self::counts_for(**scope, entry, directory))
            .map(|(scope, entry)| (*scope, entry))
            .collect()
    }

    /// The active entry with the highest precedence (local over project over user)
    #[must_use]
    pub fn active_profile(&self, directory: Option<&Path>) -> Option<(Scope, &BreadcrumbEntry)> {
        self.active(directory)
            .into_iter()
            .max_by_key(|(scope, _)| scope.precedence())
    }

    /// Whether `profile` is the recorded profile for `scope` in `directory`
    #[must_use]
    pub fn was_applied(&self, profile: &str, scope: Scope, directory: Option<&Path>) -> bool {
        self.entries
            .get(&scope)
            .is_some_and(|e| e.profile == profile && Self::counts_for(scope, e, directory))
    }

    /// Point entries for `old` at `new`; returns whether any changed
    pub fn rename_profile(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for entry in self.entries.values_mut() {
            if entry.profile == old {
                entry.profile = new.to_string();
                changed = true;
            }
        }
        changed
    }

    /// Drop every entry for a profile; returns whether any existed
    pub fn remove_profile(&mut self, profile: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.profile != profile);
        before != self.entries.len()
    }

    /// Drop the entries of `scopes` that count in `directory`
    pub fn clear(&mut self, scopes: &[Scope], directory: Option<&Path>) {
        self.entries
            .retain(|scope, entry| !(scopes.contains(scope) && Self::counts_for(*scope, entry, directory)));
    }
}

/// Drift state of one breadcrumbed scope
#[derive(Debug, Clone)]
pub struct DriftStatus {
    pub profile_name: String,
    pub applied_at: DateTime<Utc>,
    /// Live configuration no longer matches the profile
    pub modified: bool,
    /// Drift of the whole profile (shared by all its scopes)
    pub diff: Option<ProfileDiff>,
    /// The profile could not be loaded or compared
    pub error: Option<String>,
}

/// Compare every active breadcrumb with live configuration
///
/// Scopes recorded for the same profile are checked together; a difference
/// in any of them marks all of them modified. Marketplaces and descriptions
/// are not compared.
///
/// # Errors
/// Returns an error if live settings cannot be read
pub fn compute_drift(
    crumbs: &Breadcrumbs,
    directory: Option<&Path>,
    loader: &dyn ProfileLoader,
    live: &dyn LiveSettings,
) -> LoadoutResult<BTreeMap<Scope, DriftStatus>> {
    let mut groups: BTreeMap<&str, Vec<(Scope, &BreadcrumbEntry)>> = BTreeMap::new();
    for (scope, entry) in crumbs.active(directory) {
        groups.entry(entry.profile.as_str()).or_default().push((scope, entry));
    }

    let mut statuses = BTreeMap::new();
    for (name, entries) in groups {
        let recorded: BTreeSet<Scope> = entries.iter().map(|(s, _)| *s).collect();
        let outcome = match saved_profile(name, loader, &recorded) {
            Ok(saved) => {
                let scopes: BTreeSet<Scope> = saved.scopes.keys().copied().collect();
                let current = load_live(live, name, &scopes)?;
                Ok(drift_diff(&saved, &current))
            }
            Err(e) => {
                tracing::warn!(profile = name, error = %e, "cannot check drift");
                Err(e.to_string())
            }
        };

        for (scope, entry) in entries {
            let status = match &outcome {
                Ok(diff) => DriftStatus {
                    profile_name: name.to_string(),
                    applied_at: entry.applied_at,
                    modified: !diff.is_empty(),
                    diff: Some(diff.clone()),
                    error: None,
                },
                Err(message) => DriftStatus {
                    profile_name: name.to_string(),
                    applied_at: entry.applied_at,
                    modified: false,
                    diff: None,
                    error: Some(message.clone()),
                },
            };
            statuses.insert(scope, status);
        }
    }
    Ok(statuses)
}

/// The saved profile laid out on the scopes it was recorded for
fn saved_profile(
    name: &str,
    loader: &dyn ProfileLoader,
    recorded: &BTreeSet<Scope>,
) -> LoadoutResult<NormalizedProfile> {
    let loaded = loader.load_key(name)?;
    let resolved = resolve_includes(&loaded.profile, loader)?.profile;

    if resolved.shape() == ProfileShape::Flat {
        // A flat profile may have been applied to several scopes over time
        let mut saved = NormalizedProfile::default();
        for scope in recorded {
            let one = NormalizedProfile::from_profile(&resolved, *scope)?;
            saved.name = one.name;
            saved.description = one.description;
            saved.marketplaces = one.marketplaces;
            saved.scopes.extend(one.scopes);
        }
        return Ok(saved);
    }

    Ok(NormalizedProfile::from_profile(&resolved, Scope::User)?.restrict(recorded))
}
