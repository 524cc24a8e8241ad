//! End-to-end reconciliation
//!
//! name -> file -> resolved profile -> plan -> apply -> breadcrumb -> hook

use crate::apply::{self, run_hook, ApplyOptions, ApplyPlan, ApplyResult, InstallOutcome, Installer};
use crate::breadcrumb::{compute_drift, Breadcrumbs, DriftStatus};
use crate::diff::{drift_diff, DiffOp, ItemKind, NormalizedProfile, ProfileDiff};
use crate::error::{LoadoutError, LoadoutResult};
use crate::profile::{
    resolve_includes, snapshot_profile, HookCondition, LoadedProfile, MergeConflict, Profile,
    ProfileLoader, ProfileStore,
};
use crate::settings::LiveSettings;
use loadout_scanner::Scope;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A profile loaded and resolved, ready to diff or apply
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Name breadcrumbs record (relative path for nested profiles)
    pub key: String,
    pub loaded: LoadedProfile,
    /// Flat or multi-scope profile with includes expanded
    pub resolved: Profile,
    pub conflicts: Vec<MergeConflict>,
}

impl Prepared {
    /// Whether the hook must be confirmed before applying
    #[must_use]
    pub fn needs_hook_approval(&self) -> bool {
        self.resolved.post_apply.is_some() && !self.loaded.is_trusted()
    }
}

/// Ties profile storage, live settings, the installer and breadcrumbs together
pub struct Reconciler<'a> {
    store: &'a ProfileStore,
    live: &'a dyn LiveSettings,
    installer: &'a dyn Installer,
    breadcrumb_file: PathBuf,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(
        store: &'a ProfileStore,
        live: &'a dyn LiveSettings,
        installer: &'a dyn Installer,
        breadcrumb_file: PathBuf,
    ) -> Self {
        Self {
            store,
            live,
            installer,
            breadcrumb_file,
        }
    }

    fn directory(&self) -> Option<&Path> {
        self.live.project_dir()
    }

    /// Load a profile by name and expand its includes
    ///
    /// # Errors
    /// Returns lookup, ambiguity, cycle or validation errors
    pub fn prepare(&self, name: &str) -> LoadoutResult<Prepared> {
        let loaded = self.store.load(name)?;
        let resolution = resolve_includes(&loaded.profile, self.store)?;
        resolution.profile.validate()?;
        Ok(Prepared {
            key: self.store.key_of(&loaded),
            loaded,
            resolved: resolution.profile,
            conflicts: resolution.conflicts,
        })
    }

    /// What an apply to `scope` (flat profiles) would change
    ///
    /// # Errors
    /// Returns an error if live settings cannot be read
    pub fn plan(&self, prepared: &Prepared, scope: Scope) -> LoadoutResult<ApplyPlan> {
        apply::plan(&prepared.resolved, self.live, scope)
    }

    /// How live configuration differs from the profile at its scopes
    ///
    /// Added items are live but not declared, removed items are declared
    /// but missing. Marketplaces and the description are not compared.
    ///
    /// # Errors
    /// Returns an error if live settings cannot be read
    pub fn compare(&self, prepared: &Prepared, scope: Scope) -> LoadoutResult<ProfileDiff> {
        let saved = NormalizedProfile::from_profile(&prepared.resolved, scope)?;
        let scopes: BTreeSet<Scope> = saved.scopes.keys().copied().collect();
        let current = apply::load_live(self.live, &saved.name, &scopes)?;
        Ok(drift_diff(&saved, &current))
    }

    /// Live user-scope items the profile would need a keep/replace decision for
    ///
    /// # Errors
    /// Returns an error if live settings cannot be read
    pub fn detect_extras(&self, prepared: &Prepared) -> LoadoutResult<Vec<String>> {
        apply::detect_extras(&prepared.resolved, self.live)
    }

    /// Apply, record breadcrumbs, then run the post-apply hook
    ///
    /// Breadcrumbs are recorded even when some items failed. The hook only
    /// runs when every item succeeded.
    ///
    /// # Errors
    /// Pre-mutation errors from the engine, or `Hook` when the hook fails
    /// after configuration was changed
    pub fn apply(&self, prepared: &Prepared, options: &ApplyOptions<'_>) -> LoadoutResult<ApplyResult> {
        let mut options = *options;
        if prepared.loaded.is_trusted() {
            options.hook_approved = true;
        }

        let scopes = prepared.resolved.target_scopes(options.scope);
        let mut crumbs = Breadcrumbs::load(&self.breadcrumb_file)?;
        let first_run = !scopes
            .iter()
            .all(|s| crumbs.was_applied(&prepared.key, *s, self.directory()));

        let result = apply::apply(&prepared.resolved, self.live, self.installer, &options)?;

        crumbs.record_apply(&prepared.key, self.directory(), &scopes);
        crumbs.save()?;

        let Some(hook) = &prepared.resolved.post_apply else {
            return Ok(result);
        };
        if !result.is_success() {
            tracing::warn!(profile = %prepared.key, "skipping post-apply hook after item failures");
            return Ok(result);
        }
        if hook.condition == HookCondition::FirstRun && !first_run {
            tracing::debug!(profile = %prepared.key, "post-apply hook already ran for this profile");
            return Ok(result);
        }

        let working_dir = self.directory().unwrap_or_else(|| self.store.root());
        match run_hook(hook, self.store.root(), working_dir) {
            Ok(()) => Ok(result),
            Err(message) => Err(LoadoutError::Hook {
                profile: prepared.key.clone(),
                message,
                result: Box::new(result),
            }),
        }
    }

    /// Uninstall everything the profile declares at its scopes and forget it
    ///
    /// # Errors
    /// Returns an error if live settings or breadcrumbs cannot be read or written
    pub fn reset(&self, prepared: &Prepared, scope: Scope) -> LoadoutResult<ApplyResult> {
        let desired = NormalizedProfile::from_profile(&prepared.resolved, scope)?;
        let mut result = ApplyResult::default();

        for (scope, content) in &desired.scopes {
            let scope = *scope;
            let state = self.live.load_scope(scope)?;

            for plugin in content.plugins.intersection(&state.plugins) {
                match self.installer.uninstall_plugin(plugin, scope) {
                    Ok(InstallOutcome::Changed) => result.plugins_removed += 1,
                    Ok(InstallOutcome::Unchanged) => result.plugins_already_removed += 1,
                    Err(e) => result.record_error(scope, ItemKind::Plugin, plugin, DiffOp::Removed, e.to_string()),
                }
            }
            for name in content.mcp_servers.keys().filter(|n| state.mcp_servers.contains_key(*n)) {
                match self.installer.remove_mcp_server(name, scope) {
                    Ok(InstallOutcome::Changed) => result.mcp_servers_removed += 1,
                    Ok(InstallOutcome::Unchanged) => {}
                    Err(e) => result.record_error(scope, ItemKind::McpServer, name, DiffOp::Removed, e.to_string()),
                }
            }
            for (category, name) in content.extensions.iter() {
                if !state.extensions.contains(category, name) {
                    continue;
                }
                match self.installer.disable_extension(category, name, scope) {
                    Ok(InstallOutcome::Changed) => result.extensions_disabled += 1,
                    Ok(InstallOutcome::Unchanged) => {}
                    Err(e) => result.record_error(
                        scope,
                        ItemKind::Extension,
                        &format!("{category}/{name}"),
                        DiffOp::Removed,
                        e.to_string(),
                    ),
                }
            }
        }
        result.normalize();

        let scopes: Vec<Scope> = desired.scopes.keys().copied().collect();
        let mut crumbs = Breadcrumbs::load(&self.breadcrumb_file)?;
        crumbs.clear(&scopes, self.directory());
        crumbs.save()?;

        tracing::info!(profile = %prepared.key, removed = result.total_changes(), "reset profile");
        Ok(result)
    }

    /// Capture live configuration as a profile at the library root
    ///
    /// A profile being overwritten keeps its description.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or live settings cannot be read
    pub fn save_snapshot(&self, name: &str, scopes: &[Scope]) -> LoadoutResult<(Profile, PathBuf)> {
        let mut profile = snapshot_profile(name, self.live, scopes)?;
        profile.description = self
            .store
            .load_key(name)
            .ok()
            .and_then(|existing| existing.profile.description);
        let path = self.store.save(&profile)?;
        Ok((profile, path))
    }

    /// Drift of every profile applied here
    ///
    /// # Errors
    /// Returns an error if breadcrumbs or live settings cannot be read
    pub fn drift(&self) -> LoadoutResult<BTreeMap<Scope, DriftStatus>> {
        let crumbs = Breadcrumbs::load(&self.breadcrumb_file)?;
        compute_drift(&crumbs, self.directory(), self.store, self.live)
    }

    /// Current breadcrumbs
    ///
    /// # Errors
    /// Returns an error if the breadcrumb file cannot be parsed
    pub fn breadcrumbs(&self) -> LoadoutResult<Breadcrumbs> {
        Breadcrumbs::load(&self.breadcrumb_file)
    }
}
