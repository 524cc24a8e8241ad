//! End-to-end apply tests
//!
//! Profiles live on disk, live settings are real files in a temp home and
//! the installer edits them directly instead of shelling out.

use loadout_core::apply::{
    ApplyOptions, ExtrasDecision, InstallError, InstallOutcome, InstallResult, Installer,
};
use loadout_core::profile::{explicit_path, MarketplaceRef, ProfileStore};
use loadout_core::settings::{HostSettings, LiveSettings, ScopeState};
use loadout_core::{ExtensionCategory, LoadoutError, Reconciler, Scope};
use loadout_core::loadout_scanner::{HostLayout, McpServer};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

struct FakeInstaller<'a> {
    settings: &'a HostSettings,
    calls: Mutex<Vec<String>>,
    failing: Vec<String>,
    serial: bool,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl<'a> FakeInstaller<'a> {
    fn new(settings: &'a HostSettings) -> Self {
        Self {
            settings,
            calls: Mutex::new(Vec::new()),
            failing: Vec::new(),
            serial: false,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Report that plugin calls must not overlap
    fn serial(mut self) -> Self {
        self.serial = true;
        self
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Make every call for these plugin references fail
    fn failing_on(mut self, references: &[&str]) -> Self {
        self.failing = references.iter().map(|r| (*r).to_string()).collect();
        self
    }

    fn check(&self, command: &str, reference: &str) -> Result<(), InstallError> {
        if self.failing.iter().any(|r| r == reference) {
            return Err(InstallError::Command {
                command: format!("claude plugin {command} {reference}"),
                message: "marketplace unreachable".to_string(),
            });
        }
        Ok(())
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn outcome(changed: bool) -> InstallOutcome {
        if changed {
            InstallOutcome::Changed
        } else {
            InstallOutcome::Unchanged
        }
    }
}

impl Installer for FakeInstaller<'_> {
    fn install_plugin(&self, reference: &str, scope: Scope, force: bool) -> InstallResult {
        self.log(format!("install {scope} {reference}"));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.check("install", reference)?;
        let mut changed = false;
        self.settings.update_scope(scope, &mut |state: &mut ScopeState| {
            changed = state.plugins.insert(reference.to_string());
        })?;
        Ok(Self::outcome(changed || force))
    }

    fn uninstall_plugin(&self, reference: &str, scope: Scope) -> InstallResult {
        self.log(format!("uninstall {scope} {reference}"));
        self.check("uninstall", reference)?;
        let mut changed = false;
        self.settings.update_scope(scope, &mut |state: &mut ScopeState| {
            changed = state.plugins.remove(reference);
        })?;
        Ok(Self::outcome(changed))
    }

    fn add_marketplace(&self, marketplace: &MarketplaceRef) -> InstallResult {
        self.log(format!("marketplace {}", marketplace.repo));
        Ok(InstallOutcome::Changed)
    }

    fn add_mcp_server(&self, server: &McpServer, scope: Scope) -> InstallResult {
        self.log(format!("mcp-add {scope} {}", server.name));
        self.settings.update_scope(scope, &mut |state: &mut ScopeState| {
            state.mcp_servers.insert(server.name.clone(), server.clone());
        })?;
        Ok(InstallOutcome::Changed)
    }

    fn remove_mcp_server(&self, name: &str, scope: Scope) -> InstallResult {
        self.log(format!("mcp-remove {scope} {name}"));
        let mut changed = false;
        self.settings.update_scope(scope, &mut |state: &mut ScopeState| {
            changed = state.mcp_servers.remove(name).is_some();
        })?;
        Ok(Self::outcome(changed))
    }

    fn enable_extension(&self, category: ExtensionCategory, name: &str, scope: Scope) -> InstallResult {
        self.log(format!("enable {scope} {category}/{name}"));
        Ok(InstallOutcome::Changed)
    }

    fn disable_extension(&self, category: ExtensionCategory, name: &str, scope: Scope) -> InstallResult {
        self.log(format!("disable {scope} {category}/{name}"));
        Ok(InstallOutcome::Changed)
    }

    fn max_parallel(&self) -> usize {
        if self.serial {
            1
        } else {
            usize::MAX
        }
    }
}

struct Env {
    _temp: TempDir,
    project: PathBuf,
    store: ProfileStore,
    host: HostSettings,
    breadcrumbs: PathBuf,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        fs::create_dir_all(&project).unwrap();
        let profiles = temp.path().join(".loadout/profiles");
        fs::create_dir_all(&profiles).unwrap();

        Self {
            store: ProfileStore::new(&profiles),
            host: HostSettings::new(HostLayout::for_home(temp.path()), Some(project.clone())),
            breadcrumbs: temp.path().join(".loadout/last-applied.json"),
            project,
            _temp: temp,
        }
    }

    fn profile(&self, rel: &str, json: serde_json::Value) {
        let path = self.store.root().join(format!("{rel}.json"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(&json).unwrap()).unwrap();
    }

    fn set_plugins(&self, scope: Scope, plugins: &[&str]) {
        self.host
            .update_scope(scope, &mut |state: &mut ScopeState| {
                state.plugins = plugins.iter().map(|p| (*p).to_string()).collect();
            })
            .unwrap();
    }

    fn plugins(&self, scope: Scope) -> Vec<String> {
        self.host.load_scope(scope).unwrap().plugins.into_iter().collect()
    }

    fn reconciler<'a>(&'a self, installer: &'a FakeInstaller<'a>) -> Reconciler<'a> {
        Reconciler::new(&self.store, &self.host, installer, self.breadcrumbs.clone())
    }
}

#[test]
fn test_second_apply_is_a_no_op() {
    let env = Env::new();
    env.profile(
        "web",
        serde_json::json!({
            "name": "web",
            "plugins": ["a@m", "b@m"],
            "mcpServers": [{ "name": "docs", "type": "stdio", "command": "docs-server" }]
        }),
    );
    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("web").unwrap();

    let first = reconciler.apply(&prepared, &ApplyOptions::new(Scope::Project)).unwrap();
    assert_eq!(first.plugins_installed, 2);
    assert_eq!(first.mcp_servers_installed, 1);
    assert!(first.is_success());

    installer.reset_calls();
    let second = reconciler.apply(&prepared, &ApplyOptions::new(Scope::Project)).unwrap();
    assert!(installer.calls().is_empty());
    assert_eq!(second, loadout_core::ApplyResult::default());
}

#[test]
fn test_user_scope_apply_is_additive_unless_replacing() {
    let env = Env::new();
    env.profile("bc", serde_json::json!({ "name": "bc", "plugins": ["b@m", "c@m"] }));
    env.set_plugins(Scope::User, &["a@m", "b@m"]);

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("bc").unwrap();

    let result = reconciler.apply(&prepared, &ApplyOptions::new(Scope::User)).unwrap();
    assert_eq!(env.plugins(Scope::User), vec!["a@m", "b@m", "c@m"]);
    assert_eq!(result.plugins_installed, 1);
    assert_eq!(result.preserved.len(), 1);
    assert_eq!(result.preserved[0].name, "a@m");

    let mut options = ApplyOptions::new(Scope::User);
    options.replace = true;
    let result = reconciler.apply(&prepared, &options).unwrap();
    assert_eq!(env.plugins(Scope::User), vec!["b@m", "c@m"]);
    assert_eq!(result.plugins_removed, 1);
    assert!(result.preserved.is_empty());
}

#[test]
fn test_project_scope_apply_removes_extras() {
    let env = Env::new();
    env.profile("bc", serde_json::json!({ "name": "bc", "plugins": ["b@m", "c@m"] }));
    env.set_plugins(Scope::Project, &["a@m", "b@m"]);

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("bc").unwrap();
    reconciler.apply(&prepared, &ApplyOptions::new(Scope::Project)).unwrap();

    assert_eq!(env.plugins(Scope::Project), vec!["b@m", "c@m"]);
}

#[test]
fn test_stack_installs_shared_plugin_once() {
    let env = Env::new();
    env.profile("one", serde_json::json!({ "name": "one", "plugins": ["p@m", "a@m"] }));
    env.profile("two", serde_json::json!({ "name": "two", "plugins": ["p@m", "b@m"] }));
    env.profile("both", serde_json::json!({ "name": "both", "includes": ["one", "two"] }));

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("both").unwrap();
    assert_eq!(prepared.resolved.plugins, vec!["p@m", "a@m", "b@m"]);

    reconciler.apply(&prepared, &ApplyOptions::new(Scope::Project)).unwrap();
    assert_eq!(
        installer.calls(),
        vec!["install project a@m", "install project b@m", "install project p@m"]
    );
}

#[test]
fn test_include_cycle_is_rejected() {
    let env = Env::new();
    env.profile("s1", serde_json::json!({ "name": "s1", "includes": ["s2"] }));
    env.profile("s2", serde_json::json!({ "name": "s2", "includes": ["s1"] }));

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    match reconciler.prepare("s1") {
        Err(LoadoutError::Cycle { chain }) => assert_eq!(chain, vec!["s1", "s2", "s1"]),
        other => panic!("expected cycle, got {other:?}"),
    }
    assert!(installer.calls().is_empty());
}

#[test]
fn test_ambiguous_name_needs_a_path() {
    let env = Env::new();
    env.profile("api", serde_json::json!({ "name": "api", "plugins": ["top@m"] }));
    env.profile("backend/api", serde_json::json!({ "name": "api", "plugins": ["nested@m"] }));

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    match reconciler.prepare("api") {
        Err(LoadoutError::AmbiguousProfile { paths, .. }) => {
            assert_eq!(paths, vec!["api", "backend/api"]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }

    let prepared = reconciler.prepare("backend/api").unwrap();
    assert_eq!(prepared.key, "backend/api");
    assert_eq!(prepared.resolved.plugins, vec!["nested@m"]);
}

#[test]
fn test_picked_root_profile_applies_and_tracks_drift() {
    let env = Env::new();
    env.profile("api", serde_json::json!({ "name": "api", "plugins": ["top@m"] }));
    env.profile("backend/api", serde_json::json!({ "name": "api", "plugins": ["nested@m"] }));

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let Err(LoadoutError::AmbiguousProfile { paths, .. }) = reconciler.prepare("api") else {
        panic!("expected ambiguity");
    };
    let prepared = reconciler.prepare(&explicit_path(&paths[0])).unwrap();
    assert_eq!(prepared.key, "api");
    assert_eq!(prepared.resolved.plugins, vec!["top@m"]);

    reconciler.apply(&prepared, &ApplyOptions::new(Scope::User)).unwrap();
    let drift = reconciler.drift().unwrap();
    let status = &drift[&Scope::User];
    assert_eq!(status.error, None);
    assert!(!status.modified);

    env.set_plugins(Scope::User, &[]);
    assert!(reconciler.drift().unwrap()[&Scope::User].modified);
}

#[test]
fn test_item_errors_do_not_stop_the_apply() {
    let env = Env::new();
    env.profile(
        "web",
        serde_json::json!({
            "name": "web",
            "plugins": ["a@m", "bad@m", "c@m", "d@m"],
            "postApply": { "command": "touch hooked" }
        }),
    );
    env.set_plugins(Scope::Project, &["old@m", "stuck@m"]);

    let installer = FakeInstaller::new(&env.host).failing_on(&["bad@m", "stuck@m"]);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("web").unwrap();

    let mut options = ApplyOptions::new(Scope::Project);
    options.concurrency = 4;
    options.hook_approved = true;
    let result = reconciler.apply(&prepared, &options).unwrap();

    assert!(!result.is_success());
    assert_eq!(result.errors.len(), 2);
    let mut failed: Vec<&str> = result.errors.iter().map(|e| e.name.as_str()).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec!["bad@m", "stuck@m"]);
    assert_eq!(result.plugins_installed, 3);
    assert_eq!(result.plugins_removed, 1);
    assert_eq!(env.plugins(Scope::Project), vec!["a@m", "c@m", "d@m", "stuck@m"]);

    assert!(!env.project.join("hooked").exists());
    assert!(reconciler.breadcrumbs().unwrap().entries().contains_key(&Scope::Project));
}

#[test]
fn test_installer_limit_caps_parallel_installs() {
    let env = Env::new();
    env.profile(
        "many",
        serde_json::json!({ "name": "many", "plugins": ["a@m", "b@m", "c@m", "d@m", "e@m", "f@m"] }),
    );
    let installer = FakeInstaller::new(&env.host).serial();
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("many").unwrap();

    let mut options = ApplyOptions::new(Scope::Project);
    options.concurrency = 4;
    let result = reconciler.apply(&prepared, &options).unwrap();
    assert_eq!(result.plugins_installed, 6);
    assert_eq!(installer.peak(), 1);
}

#[test]
fn test_drift_ignores_marketplaces_but_reports_extra_plugins() {
    let env = Env::new();
    env.profile(
        "web",
        serde_json::json!({
            "name": "web",
            "plugins": ["a@m"],
            "marketplaces": [{ "repo": "acme/plugins" }]
        }),
    );
    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("web").unwrap();
    reconciler.apply(&prepared, &ApplyOptions::new(Scope::Project)).unwrap();

    // The fake installer never registers the marketplace
    let drift = reconciler.drift().unwrap();
    assert!(!drift[&Scope::Project].modified);

    env.set_plugins(Scope::Project, &["a@m", "extra@m"]);
    let drift = reconciler.drift().unwrap();
    let status = &drift[&Scope::Project];
    assert!(status.modified);
    let diff = status.diff.as_ref().unwrap();
    assert_eq!(diff.item_count(), 1);
    assert_eq!(diff.scopes[0].items[0].name, "extra@m");
}

#[test]
fn test_multi_scope_extras_need_a_decision() {
    let env = Env::new();
    env.profile(
        "team",
        serde_json::json!({
            "name": "team",
            "perScope": {
                "user": { "plugins": ["a@m"] },
                "project": { "plugins": ["p@m"] }
            }
        }),
    );
    env.set_plugins(Scope::User, &["x@m"]);

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("team").unwrap();

    match reconciler.apply(&prepared, &ApplyOptions::new(Scope::User)) {
        Err(LoadoutError::ExtrasRequireDecision { extras }) => {
            assert_eq!(extras, vec!["plugin x@m"]);
        }
        other => panic!("expected extras error, got {other:?}"),
    }
    assert!(installer.calls().is_empty());

    let mut options = ApplyOptions::new(Scope::User);
    options.extras = ExtrasDecision::Keep;
    let result = reconciler.apply(&prepared, &options).unwrap();
    assert_eq!(env.plugins(Scope::User), vec!["a@m", "x@m"]);
    assert_eq!(env.plugins(Scope::Project), vec!["p@m"]);
    assert_eq!(result.preserved.len(), 1);

    options.extras = ExtrasDecision::Replace;
    reconciler.apply(&prepared, &options).unwrap();
    assert_eq!(env.plugins(Scope::User), vec!["a@m"]);

    let crumbs = reconciler.breadcrumbs().unwrap();
    assert_eq!(crumbs.entries().len(), 2);
    assert_eq!(crumbs.entries()[&Scope::User].profile, "team");
}

#[cfg(unix)]
#[test]
fn test_hook_requires_approval_and_runs_once() {
    let env = Env::new();
    env.profile(
        "hooked",
        serde_json::json!({
            "name": "hooked",
            "plugins": ["a@m"],
            "postApply": { "command": "touch hooked", "condition": "first-run" }
        }),
    );
    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("hooked").unwrap();
    assert!(prepared.needs_hook_approval());

    let err = reconciler
        .apply(&prepared, &ApplyOptions::new(Scope::Project))
        .unwrap_err();
    assert!(matches!(err, LoadoutError::HookNotApproved(_)));
    assert!(installer.calls().is_empty());

    let mut options = ApplyOptions::new(Scope::Project);
    options.hook_approved = true;
    reconciler.apply(&prepared, &options).unwrap();
    let marker = env.project.join("hooked");
    assert!(marker.exists());

    fs::remove_file(&marker).unwrap();
    reconciler.apply(&prepared, &options).unwrap();
    assert!(!marker.exists());
}

#[cfg(unix)]
#[test]
fn test_failing_hook_keeps_applied_changes() {
    let env = Env::new();
    env.profile(
        "broken",
        serde_json::json!({
            "name": "broken",
            "plugins": ["a@m"],
            "postApply": { "command": "exit 7" }
        }),
    );
    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("broken").unwrap();

    let mut options = ApplyOptions::new(Scope::Project);
    options.hook_approved = true;
    match reconciler.apply(&prepared, &options) {
        Err(LoadoutError::Hook { message, result, .. }) => {
            assert!(message.contains("status 7"));
            assert_eq!(result.plugins_installed, 1);
        }
        other => panic!("expected hook failure, got {other:?}"),
    }
    assert_eq!(env.plugins(Scope::Project), vec!["a@m"]);
    assert!(reconciler.breadcrumbs().unwrap().entries().contains_key(&Scope::Project));
}

#[test]
fn test_reset_removes_declared_items_and_breadcrumb() {
    let env = Env::new();
    env.profile("web", serde_json::json!({ "name": "web", "plugins": ["a@m"] }));
    env.set_plugins(Scope::Project, &["keep@m"]);

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let prepared = reconciler.prepare("web").unwrap();
    reconciler.apply(&prepared, &ApplyOptions::new(Scope::Project)).unwrap();
    env.set_plugins(Scope::Project, &["a@m", "keep@m"]);

    let result = reconciler.reset(&prepared, Scope::Project).unwrap();
    assert_eq!(result.plugins_removed, 1);
    assert_eq!(env.plugins(Scope::Project), vec!["keep@m"]);
    assert!(reconciler.breadcrumbs().unwrap().entries().is_empty());
}

#[test]
fn test_save_snapshot_keeps_existing_description() {
    let env = Env::new();
    env.profile(
        "mine",
        serde_json::json!({ "name": "mine", "description": "my setup", "plugins": ["old@m"] }),
    );
    env.set_plugins(Scope::User, &["a@m", "b@m"]);

    let installer = FakeInstaller::new(&env.host);
    let reconciler = env.reconciler(&installer);
    let (profile, path) = reconciler.save_snapshot("mine", &[Scope::User]).unwrap();

    assert_eq!(path, env.store.root().join("mine.json"));
    assert_eq!(profile.description.as_deref(), Some("my setup"));
    assert_eq!(profile.plugins, vec!["a@m", "b@m"]);

    let reloaded = ProfileStore::read_file(&path).unwrap();
    assert_eq!(reloaded, profile);
}
