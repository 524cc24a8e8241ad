//! Installer collaborator
//!
//! Plugins and marketplaces are installed by the host's own `claude` CLI.
//! MCP servers are written straight into the scope's settings, and
//! extensions are copied from the loadout extension library.

use crate::profile::MarketplaceRef;
use crate::settings::{HostSettings, LiveSettings, ScopeState};
use loadout_scanner::plugins::split_reference;
use loadout_scanner::{ExtensionCategory, McpServer, Scope};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use walkdir::WalkDir;

/// Whether an installer call changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Changed,
    Unchanged,
}

/// Failure of a single installer call
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("missing secret(s): {}", keys.join(", "))]
    MissingSecrets { keys: Vec<String> },

    #[error("not found in extension library at {0}")]
    ExtensionNotFound(PathBuf),

    #[error("{scope} scope has no extension directory")]
    NoExtensionDir { scope: Scope },

    #[error("I/O error for {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("{0}")]
    Settings(String),
}

impl InstallError {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

impl From<crate::error::LoadoutError> for InstallError {
    fn from(err: crate::error::LoadoutError) -> Self {
        Self::Settings(err.to_string())
    }
}

/// Result type for installer calls
pub type InstallResult = Result<InstallOutcome, InstallError>;

/// Operations that change the host's installed set
///
/// Implementations must be safe to call from several threads at once; the
/// engine runs plugin installs in parallel.
pub trait Installer: Sync {
    /// Install a `plugin@marketplace` at a scope; `force` reinstalls
    fn install_plugin(&self, reference: &str, scope: Scope, force: bool) -> InstallResult;
    /// Uninstall a plugin from a scope
    fn uninstall_plugin(&self, reference: &str, scope: Scope) -> InstallResult;
    /// Register a marketplace with the host
    fn add_marketplace(&self, marketplace: &MarketplaceRef) -> InstallResult;
    /// Add or replace an MCP server
    fn add_mcp_server(&self, server: &McpServer, scope: Scope) -> InstallResult;
    /// Remove an MCP server
    fn remove_mcp_server(&self, name: &str, scope: Scope) -> InstallResult;
    /// Copy an extension into a scope
    fn enable_extension(&self, category: ExtensionCategory, name: &str, scope: Scope) -> InstallResult;
    /// Delete an extension from a scope
    fn disable_extension(&self, category: ExtensionCategory, name: &str, scope: Scope)
        -> InstallResult;

    /// Upper bound on calls the engine may run at once
    fn max_parallel(&self) -> usize {
        usize::MAX
    }
}

/// Installer for a real Claude Code host
pub struct HostInstaller<'a> {
    settings: &'a HostSettings,
    claude_bin: String,
    ext_dir: PathBuf,
}

impl<'a> HostInstaller<'a> {
    #[must_use]
    pub fn new(settings: &'a HostSettings, claude_bin: impl Into<String>, ext_dir: PathBuf) -> Self {
        Self {
            settings,
            claude_bin: claude_bin.into(),
            ext_dir,
        }
    }

    fn run_claude(&self, args: &[&str], scope: Scope) -> InstallResult {
        let mut cmd = Command::new(&self.claude_bin);
        cmd.args(args);
        // Project and local installs are recorded against the working directory
        if scope.is_project_bound() {
            if let Some(dir) = self.settings.project_dir() {
                cmd.current_dir(dir);
            }
        }

        let rendered = format!("{} {}", self.claude_bin, args.join(" "));
        tracing::debug!(command = %rendered, "running host CLI");
        let output = cmd.output().map_err(|e| InstallError::Command {
            command: rendered.clone(),
            message: e.to_string(),
        })?;

        if output.status.success() {
            return Ok(InstallOutcome::Changed);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else if !stdout.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            format!("exit status {}", output.status)
        };
        Err(InstallError::Command {
            command: rendered,
            message,
        })
    }

    fn scope_ext_dir(&self, category: ExtensionCategory, scope: Scope) -> Result<PathBuf, InstallError> {
        let root = self
            .settings
            .layout()
            .extensions_root(scope, self.settings.project_dir())
            .map_err(|e| InstallError::Settings(e.to_string()))?
            .ok_or(InstallError::NoExtensionDir { scope })?;
        Ok(root.join(category.dir_name()))
    }
}

impl Installer for HostInstaller<'_> {
    /// Every `claude plugin` call rewrites the scope's settings file, so two
    /// running at once can lose each other's edit
    fn max_parallel(&self) -> usize {
        1
    }

    fn install_plugin(&self, reference: &str, scope: Scope, force: bool) -> InstallResult {
        let scope_flag = format!("--scope={scope}");
        if force {
            let (name, _) = split_reference(reference);
            // A failed uninstall just means there was nothing to replace
            if let Err(e) = self.run_claude(&["plugin", "uninstall", &scope_flag, name], scope) {
                tracing::debug!(plugin = reference, error = %e, "uninstall before reinstall failed");
            }
        }
        self.run_claude(&["plugin", "install", &scope_flag, reference], scope)
    }

    fn uninstall_plugin(&self, reference: &str, scope: Scope) -> InstallResult {
        let scope_flag = format!("--scope={scope}");
        // The CLI takes the bare plugin name for uninstall
        let (name, _) = split_reference(reference);
        self.run_claude(&["plugin", "uninstall", &scope_flag, name], scope)
    }

    fn add_marketplace(&self, marketplace: &MarketplaceRef) -> InstallResult {
        self.run_claude(&["plugin", "marketplace", "add", &marketplace.repo], Scope::User)
    }

    fn add_mcp_server(&self, server: &McpServer, scope: Scope) -> InstallResult {
        let mut changed = false;
        self.settings.update_scope(scope, &mut |state: &mut ScopeState| {
            if state.mcp_servers.get(&server.name) != Some(server) {
                state.mcp_servers.insert(server.name.clone(), server.clone());
                changed = true;
            }
        })?;
        Ok(if changed {
            InstallOutcome::Changed
        } else {
            InstallOutcome::Unchanged
        })
    }

    fn remove_mcp_server(&self, name: &str, scope: Scope) -> InstallResult {
        let mut changed = false;
        self.settings.update_scope(scope, &mut |state: &mut ScopeState| {
            changed = state.mcp_servers.remove(name).is_some();
        })?;
        Ok(if changed {
            InstallOutcome::Changed
        } else {
            InstallOutcome::Unchanged
        })
    }

    fn enable_extension(&self, category: ExtensionCategory, name: &str, scope: Scope) -> InstallResult {
        let source_dir = self.ext_dir.join(category.dir_name());
        let source = find_entry(&source_dir, name)
            .ok_or_else(|| InstallError::ExtensionNotFound(source_dir.join(name)))?;
        let target_dir = self.scope_ext_dir(category, scope)?;
        let Some(file_name) = source.file_name() else {
            return Err(InstallError::ExtensionNotFound(source));
        };
        let target = target_dir.join(file_name);

        if source.is_dir() {
            copy_dir(&source, &target)?;
        } else {
            fs::create_dir_all(&target_dir).map_err(|e| InstallError::io(&target_dir, &e))?;
            fs::copy(&source, &target).map_err(|e| InstallError::io(&target, &e))?;
        }
        tracing::debug!(%category, name, target = %target.display(), "enabled extension");
        Ok(InstallOutcome::Changed)
    }

    fn disable_extension(
        &self,
        category: ExtensionCategory,
        name: &str,
        scope: Scope,
    ) -> InstallResult {
        let dir = self.scope_ext_dir(category, scope)?;
        let Some(entry) = find_entry(&dir, name) else {
            return Ok(InstallOutcome::Unchanged);
        };
        let removed = if entry.is_dir() {
            fs::remove_dir_all(&entry)
        } else {
            fs::remove_file(&entry)
        };
        removed.map_err(|e| InstallError::io(&entry, &e))?;
        Ok(InstallOutcome::Changed)
    }
}

/// Find the directory or file (by stem) that holds an extension
fn find_entry(dir: &Path, name: &str) -> Option<PathBuf> {
    let direct = dir.join(name);
    if direct.is_dir() {
        return Some(direct);
    }
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.file_stem().is_some_and(|s| s == name))
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn copy_dir(source: &Path, target: &Path) -> Result<(), InstallError> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| InstallError::Io {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        let dest = target.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| InstallError::io(&dest, &e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &dest).map_err(|e| InstallError::io(&dest, &e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadout_scanner::HostLayout;
    use tempfile::TempDir;

    fn setup() -> (TempDir, HostSettings) {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("app");
        fs::create_dir_all(&project).unwrap();

        let ext = temp.path().join("ext");
        fs::create_dir_all(ext.join("agents")).unwrap();
        fs::write(ext.join("agents/reviewer.md"), "# Reviewer").unwrap();
        fs::create_dir_all(ext.join("skills/pdf/scripts")).unwrap();
        fs::write(ext.join("skills/pdf/SKILL.md"), "pdf").unwrap();
        fs::write(ext.join("skills/pdf/scripts/run.sh"), "echo").unwrap();

        let host = HostSettings::new(HostLayout::for_home(temp.path()), Some(project));
        (temp, host)
    }

    #[test]
    fn test_enable_and_disable_file_extension() {
        let (temp, host) = setup();
        let installer = HostInstaller::new(&host, "claude", temp.path().join("ext"));

        installer
            .enable_extension(ExtensionCategory::Agents, "reviewer", Scope::Project)
            .unwrap();
        let target = temp.path().join("app/.claude/agents/reviewer.md");
        assert!(target.exists());

        let outcome = installer
            .disable_extension(ExtensionCategory::Agents, "reviewer", Scope::Project)
            .unwrap();
        assert_eq!(outcome, InstallOutcome::Changed);
        assert!(!target.exists());
    }

    #[test]
    fn test_enable_directory_extension() {
        let (temp, host) = setup();
        let installer = HostInstaller::new(&host, "claude", temp.path().join("ext"));

        installer
            .enable_extension(ExtensionCategory::Skills, "pdf", Scope::User)
            .unwrap();
        assert!(temp.path().join(".claude/skills/pdf/scripts/run.sh").exists());
    }

    #[test]
    fn test_host_cli_calls_run_one_at_a_time() {
        let (temp, host) = setup();
        let installer = HostInstaller::new(&host, "claude", temp.path().join("ext"));
        assert_eq!(installer.max_parallel(), 1);
    }

    #[test]
    fn test_missing_extension_and_local_scope() {
        let (temp, host) = setup();
        let installer = HostInstaller::new(&host, "claude", temp.path().join("ext"));

        assert!(matches!(
            installer.enable_extension(ExtensionCategory::Rules, "ghost", Scope::User),
            Err(InstallError::ExtensionNotFound(_))
        ));
        assert!(matches!(
            installer.enable_extension(ExtensionCategory::Agents, "reviewer", Scope::Local),
            Err(InstallError::NoExtensionDir { .. })
        ));
    }

    #[test]
    fn test_mcp_add_is_idempotent() {
        let (temp, host) = setup();
        let installer = HostInstaller::new(&host, "claude", temp.path().join("ext"));
        let server = McpServer {
            name: "db".into(),
            transport: loadout_scanner::McpTransport::Stdio,
            command: Some("pg-mcp".into()),
            args: Vec::new(),
            env: std::collections::BTreeMap::new(),
            url: None,
        };

        assert_eq!(
            installer.add_mcp_server(&server, Scope::Project).unwrap(),
            InstallOutcome::Changed
        );
        assert_eq!(
            installer.add_mcp_server(&server, Scope::Project).unwrap(),
            InstallOutcome::Unchanged
        );
        assert_eq!(
            installer.remove_mcp_server("db", Scope::Project).unwrap(),
            InstallOutcome::Changed
        );
    }

    #[test]
    fn test_missing_cli_reports_command_error() {
        let (temp, host) = setup();
        let installer = HostInstaller::new(&host, "loadout-no-such-binary", temp.path().join("ext"));
        assert!(matches!(
            installer.install_plugin("a@m", Scope::User, false),
            Err(InstallError::Command { .. })
        ));
    }
}
