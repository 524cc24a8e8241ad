//! Apply engine
//!
//! Scopes are applied one after another in `user, project, local` order.
//! Within a scope marketplaces come first, then plugins (in parallel on a
//! bounded pool), then MCP servers, then extensions.

use super::installer::{InstallError, InstallOutcome, InstallResult, Installer};
use super::options::{ApplyOptions, ExtrasDecision, Progress, SecretSource};
use super::result::{ApplyResult, PreservedItem};
use crate::diff::{
    plan_diff, normalize_repo, DiffItem, DiffOp, ItemKind, NormalizedProfile, ProfileDiff,
    ScopeContent,
};
use crate::error::{LoadoutError, LoadoutResult};
use crate::profile::{MarketplaceRef, Profile, ProfileShape};
use crate::settings::LiveSettings;
use loadout_scanner::{ExtensionCategory, McpServer, Scope};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Desired and live state of the scopes a profile targets, and their diff
#[derive(Debug, Clone)]
pub struct ApplyPlan {
    pub desired: NormalizedProfile,
    pub live: NormalizedProfile,
    /// `added` must be installed, `removed` is not in the profile
    pub diff: ProfileDiff,
}

impl ApplyPlan {
    /// Scopes the profile writes, in apply order
    #[must_use]
    pub fn scopes(&self) -> Vec<Scope> {
        self.desired.scopes.keys().copied().collect()
    }

    fn items(&self, scope: Scope) -> Vec<&DiffItem> {
        self.diff
            .scope(scope)
            .map(|s| s.items.iter().collect())
            .unwrap_or_default()
    }
}

/// Read the live state of some scopes in comparable form
///
/// # Errors
/// Returns an error if a settings file cannot be read
pub fn load_live(
    live: &dyn LiveSettings,
    name: &str,
    scopes: &BTreeSet<Scope>,
) -> LoadoutResult<NormalizedProfile> {
    let mut states = BTreeMap::new();
    for scope in scopes {
        states.insert(*scope, live.load_scope(*scope)?);
    }
    let markets = live.marketplaces()?.into_iter().map(|m| m.repo);
    Ok(NormalizedProfile::from_live(name, &states, markets))
}

/// Compute what applying a resolved profile would change
///
/// # Errors
/// Returns an error for unresolved stacks or unreadable settings
pub fn plan(profile: &Profile, live: &dyn LiveSettings, target: Scope) -> LoadoutResult<ApplyPlan> {
    let desired = NormalizedProfile::from_profile(profile, target)?;
    let scopes: BTreeSet<Scope> = desired.scopes.keys().copied().collect();
    let live_state = load_live(live, &profile.name, &scopes)?;
    let diff = plan_diff(&desired, &live_state);
    tracing::debug!(
        profile = %profile.name,
        scopes = scopes.len(),
        changes = diff.item_count(),
        "computed apply plan"
    );
    Ok(ApplyPlan {
        desired,
        live: live_state,
        diff,
    })
}

fn extras_in_plan(profile: &Profile, plan: &ApplyPlan) -> Vec<String> {
    let declares_user = profile
        .per_scope
        .get(&Scope::User)
        .is_some_and(|s| !s.is_empty());
    if profile.shape() != ProfileShape::MultiScope || !declares_user {
        return Vec::new();
    }
    plan.items(Scope::User)
        .into_iter()
        .filter(|i| i.op == DiffOp::Removed && i.kind != ItemKind::Marketplace)
        .map(|i| format!("{} {}", i.kind, i.name))
        .collect()
}

/// Live user-scope items a multi-scope profile does not declare
///
/// Flat profiles and profiles without user-scope content have no extras.
///
/// # Errors
/// Returns an error if live settings cannot be read
pub fn detect_extras(profile: &Profile, live: &dyn LiveSettings) -> LoadoutResult<Vec<String>> {
    if profile.shape() != ProfileShape::MultiScope {
        return Ok(Vec::new());
    }
    let plan = plan(profile, live, Scope::User)?;
    Ok(extras_in_plan(profile, &plan))
}

/// Bring live configuration in line with a resolved profile
///
/// # Errors
/// Fails before changing anything when the profile is an unresolved stack,
/// carries an unapproved hook, has undecided user-scope extras or settings
/// cannot be read. Failures of individual items are collected in
/// [`ApplyResult::errors`] instead.
pub fn apply(
    profile: &Profile,
    live: &dyn LiveSettings,
    installer: &dyn Installer,
    options: &ApplyOptions<'_>,
) -> LoadoutResult<ApplyResult> {
    if profile.is_stack() {
        return Err(LoadoutError::invalid(
            &profile.name,
            "includes must be resolved before applying",
        ));
    }
    if profile.post_apply.is_some() && !options.hook_approved {
        return Err(LoadoutError::HookNotApproved(profile.name.clone()));
    }

    let plan = plan(profile, live, options.scope)?;

    if options.extras == ExtrasDecision::Undecided && !options.replace {
        let extras = extras_in_plan(profile, &plan);
        if !extras.is_empty() {
            return Err(LoadoutError::ExtrasRequireDecision { extras });
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency.min(installer.max_parallel()).max(1))
        .build()
        .map_err(|e| LoadoutError::Internal(format!("failed to start worker pool: {e}")))?;

    let mut result = ApplyResult::default();
    for scope in plan.scopes() {
        let runner = ScopeRunner {
            scope,
            profile,
            plan: &plan,
            installer,
            options,
            done: AtomicUsize::new(0),
        };
        runner.run(&pool, &mut result);
    }
    result.normalize();

    tracing::info!(
        profile = %profile.name,
        changes = result.total_changes(),
        preserved = result.preserved.len(),
        errors = result.errors.len(),
        "apply finished"
    );
    Ok(result)
}

#[derive(Debug, Clone, Copy)]
enum PluginAction {
    Install { force: bool },
    Uninstall,
}

struct ScopeRunner<'a> {
    scope: Scope,
    profile: &'a Profile,
    plan: &'a ApplyPlan,
    installer: &'a dyn Installer,
    options: &'a ApplyOptions<'a>,
    done: AtomicUsize,
}

impl ScopeRunner<'_> {
    fn run(&self, pool: &rayon::ThreadPool, result: &mut ApplyResult) {
        let items = self.plan.items(self.scope);
        let allow_remove = self.options.allows_removal(self.scope);

        let mut markets = Vec::new();
        let mut plugins = Vec::new();
        let mut servers = Vec::new();
        let mut extensions = Vec::new();
        for item in items {
            if item.op == DiffOp::Removed && !allow_remove {
                result.preserved.push(PreservedItem {
                    scope: self.scope,
                    kind: item.kind,
                    name: item.name.clone(),
                });
                continue;
            }
            match item.kind {
                ItemKind::Marketplace => markets.push(item),
                ItemKind::Plugin => plugins.push((
                    item.name.clone(),
                    match item.op {
                        DiffOp::Removed => PluginAction::Uninstall,
                        _ => PluginAction::Install { force: false },
                    },
                )),
                ItemKind::McpServer => servers.push(item),
                ItemKind::Extension => extensions.push(item),
            }
        }
        if self.options.reinstall {
            plugins.extend(
                self.present_plugins()
                    .into_iter()
                    .map(|p| (p, PluginAction::Install { force: true })),
            );
        }

        let total = markets.len() + plugins.len() + servers.len() + extensions.len();
        if total == 0 {
            return;
        }
        tracing::debug!(scope = %self.scope, total, "applying scope");

        for item in markets {
            self.add_marketplace(item, total, result);
        }
        self.run_plugins(pool, &plugins, total, result);
        for item in servers {
            self.apply_server(item, total, result);
        }
        for item in extensions {
            self.apply_extension(item, total, result);
        }
    }

    fn present_plugins(&self) -> Vec<String> {
        let empty = ScopeContent::default();
        let desired = self.plan.desired.scopes.get(&self.scope).unwrap_or(&empty);
        let live = self.plan.live.scopes.get(&self.scope).unwrap_or(&empty);
        desired.plugins.intersection(&live.plugins).cloned().collect()
    }

    fn progress(&self, kind: ItemKind, name: &str, op: DiffOp, ok: bool, total: usize) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        self.options.report(&Progress {
            scope: self.scope,
            kind,
            name,
            op,
            ok,
            done,
            total,
        });
    }

    fn finish(
        &self,
        outcome: InstallResult,
        kind: ItemKind,
        name: &str,
        op: DiffOp,
        total: usize,
        result: &mut ApplyResult,
    ) -> Option<InstallOutcome> {
        let ok = outcome.is_ok();
        let value = match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                result.record_error(self.scope, kind, name, op, e.to_string());
                None
            }
        };
        self.progress(kind, name, op, ok, total);
        value
    }

    fn add_marketplace(&self, item: &DiffItem, total: usize, result: &mut ApplyResult) {
        let market = self
            .profile
            .marketplaces
            .iter()
            .find(|m| normalize_repo(&m.repo) == item.name)
            .cloned()
            .unwrap_or_else(|| MarketplaceRef {
                repo: item.name.clone(),
                install_location: None,
            });
        let outcome = self.installer.add_marketplace(&market);
        if let Some(InstallOutcome::Changed) =
            self.finish(outcome, ItemKind::Marketplace, &item.name, item.op, total, result)
        {
            result.marketplaces_added += 1;
        }
    }

    fn run_plugins(
        &self,
        pool: &rayon::ThreadPool,
        jobs: &[(String, PluginAction)],
        total: usize,
        result: &mut ApplyResult,
    ) {
        if jobs.is_empty() {
            return;
        }
        let shared = Mutex::new(std::mem::take(result));

        pool.install(|| {
            jobs.par_iter().for_each(|(reference, action)| {
                let (outcome, op) = match action {
                    PluginAction::Install { force } => (
                        self.installer.install_plugin(reference, self.scope, *force),
                        DiffOp::Added,
                    ),
                    PluginAction::Uninstall => (
                        self.installer.uninstall_plugin(reference, self.scope),
                        DiffOp::Removed,
                    ),
                };

                let mut acc = shared.lock().unwrap_or_else(PoisonError::into_inner);
                let finished = self.finish(outcome, ItemKind::Plugin, reference, op, total, &mut acc);
                match (finished, op) {
                    (Some(InstallOutcome::Changed), DiffOp::Removed) => acc.plugins_removed += 1,
                    (Some(InstallOutcome::Unchanged), DiffOp::Removed) => {
                        acc.plugins_already_removed += 1;
                    }
                    (Some(InstallOutcome::Changed), _) => acc.plugins_installed += 1,
                    (Some(InstallOutcome::Unchanged), _) => acc.plugins_already_present += 1,
                    (None, _) => {}
                }
            });
        });

        *result = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
    }

    fn apply_server(&self, item: &DiffItem, total: usize, result: &mut ApplyResult) {
        let outcome = match item.op {
            DiffOp::Removed => self.installer.remove_mcp_server(&item.name, self.scope),
            DiffOp::Added | DiffOp::Modified => self
                .desired_server(&item.name, self.options.secrets)
                .and_then(|server| self.installer.add_mcp_server(&server, self.scope)),
        };
        match self.finish(outcome, ItemKind::McpServer, &item.name, item.op, total, result) {
            Some(InstallOutcome::Changed) if item.op == DiffOp::Removed => {
                result.mcp_servers_removed += 1;
            }
            Some(InstallOutcome::Changed) => result.mcp_servers_installed += 1,
            _ => {}
        }
    }

    /// The profile's definition of a server with its secrets filled in
    fn desired_server(&self, name: &str, secrets: &dyn SecretSource) -> Result<McpServer, InstallError> {
        let content = self.plan.desired.scopes.get(&self.scope);
        let Some(mut server) = content.and_then(|c| c.mcp_servers.get(name)).cloned() else {
            return Err(InstallError::Settings(format!("server '{name}' is not in the profile")));
        };

        let mut missing = Vec::new();
        let keys = content.and_then(|c| c.secret_keys.get(name));
        for key in keys.into_iter().flatten() {
            if server.env.contains_key(key) {
                continue;
            }
            match secrets.get(key) {
                Some(value) => {
                    server.env.insert(key.clone(), value);
                }
                None => missing.push(key.clone()),
            }
        }
        if missing.is_empty() {
            Ok(server)
        } else {
            Err(InstallError::MissingSecrets { keys: missing })
        }
    }

    fn apply_extension(&self, item: &DiffItem, total: usize, result: &mut ApplyResult) {
        let parsed = item
            .name
            .split_once('/')
            .and_then(|(category, name)| {
                category.parse::<ExtensionCategory>().ok().map(|c| (c, name))
            });
        let outcome = match (parsed, item.op) {
            (None, _) => Err(InstallError::Settings(format!(
                "malformed extension name '{}'",
                item.name
            ))),
            (Some((category, name)), DiffOp::Removed) => {
                self.installer.disable_extension(category, name, self.scope)
            }
            (Some((category, name)), _) => {
                self.installer.enable_extension(category, name, self.scope)
            }
        };
        match self.finish(outcome, ItemKind::Extension, &item.name, item.op, total, result) {
            Some(InstallOutcome::Changed) if item.op == DiffOp::Removed => {
                result.extensions_disabled += 1;
            }
            Some(InstallOutcome::Changed) => result.extensions_enabled += 1,
            _ => {}
        }
    }
}
