//! Reading and writing live per-scope configuration
//!
//! The writer only touches the keys loadout reconciles (`enabledPlugins`
//! and `mcpServers`); everything else in the host's JSON files is written
//! back unchanged.

use crate::error::{LoadoutError, LoadoutResult};
use crate::profile::Extensions;
use loadout_scanner::parser::mcp::load_mcp_config;
use loadout_scanner::parser::read_optional;
use loadout_scanner::parser::settings::load_settings;
use loadout_scanner::plugins::load_known_marketplaces;
use loadout_scanner::{
    list_extensions, HostLayout, InstalledPlugins, KnownMarketplace, McpServer, Scope,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Live content of one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeState {
    /// Enabled plugin references
    pub plugins: BTreeSet<String>,
    /// MCP servers keyed by name
    pub mcp_servers: BTreeMap<String, McpServer>,
    /// Extensions present in the scope's directories
    pub extensions: Extensions,
}

impl ScopeState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.mcp_servers.is_empty() && self.extensions.is_empty()
    }
}

/// Access to the live configuration of one host and working directory
pub trait LiveSettings: Sync {
    /// Directory project and local scopes refer to
    fn project_dir(&self) -> Option<&Path>;

    /// Read a scope's current state
    ///
    /// # Errors
    /// Returns an error if a file exists but cannot be parsed
    fn load_scope(&self, scope: Scope) -> LoadoutResult<ScopeState>;

    /// Write a scope's plugins and MCP servers
    ///
    /// Extensions are files on disk, not settings; they are left alone.
    ///
    /// # Errors
    /// Returns an error if a file cannot be read or written
    fn save_scope(&self, scope: Scope, state: &ScopeState) -> LoadoutResult<()>;

    /// Read, modify and write a scope as one step
    ///
    /// # Errors
    /// Returns an error if loading or saving fails
    fn update_scope(
        &self,
        scope: Scope,
        edit: &mut dyn FnMut(&mut ScopeState),
    ) -> LoadoutResult<()>;

    /// Marketplaces registered with the host
    ///
    /// # Errors
    /// Returns an error if the marketplace file cannot be parsed
    fn marketplaces(&self) -> LoadoutResult<Vec<KnownMarketplace>>;

    /// Install records of all plugins
    ///
    /// # Errors
    /// Returns an error if the install record file cannot be parsed
    fn installed_plugins(&self) -> LoadoutResult<InstalledPlugins>;
}

/// Claude Code's on-disk configuration
#[derive(Debug)]
pub struct HostSettings {
    layout: HostLayout,
    project_dir: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl HostSettings {
    #[must_use]
    pub fn new(layout: HostLayout, project_dir: Option<PathBuf>) -> Self {
        Self {
            layout,
            project_dir,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &HostLayout {
        &self.layout
    }

    fn write_plugins(&self, scope: Scope, plugins: &BTreeSet<String>) -> LoadoutResult<()> {
        let path = self.layout.settings_path(scope, self.project_dir.as_deref())?;
        let mut doc = read_document(&path)?;
        let before = doc.clone();

        if plugins.is_empty() && !has_section(&doc, &["enabledPlugins"]) {
            return Ok(());
        }
        let enabled = object_at(&mut doc, &["enabledPlugins"], &path)?;

        // Entries switched off by hand stay as they are
        enabled.retain(|name, on| !on.as_bool().unwrap_or(false) || plugins.contains(name));
        for plugin in plugins {
            enabled.insert(plugin.clone(), Value::Bool(true));
        }

        write_if_changed(&path, &before, &doc)
    }

    fn write_servers(
        &self,
        scope: Scope,
        current: &BTreeMap<String, McpServer>,
        servers: &BTreeMap<String, McpServer>,
    ) -> LoadoutResult<()> {
        let location = self.layout.mcp_location(scope, self.project_dir.as_deref())?;
        let path = &location.path;
        let mut doc = read_document(path)?;
        let before = doc.clone();

        let keys: Vec<&str> = match &location.project_key {
            Some(key) => vec!["projects", key.as_str(), "mcpServers"],
            None => vec!["mcpServers"],
        };
        if servers.is_empty() && !has_section(&doc, &keys) {
            return Ok(());
        }
        let section = object_at(&mut doc, &keys, path)?;

        section.retain(|name, _| servers.contains_key(name));
        for (name, server) in servers {
            // Unchanged servers keep their original body, including keys we do not model
            if current.get(name) != Some(server) {
                section.insert(name.clone(), server.to_host_json());
            }
        }

        write_if_changed(path, &before, &doc)
    }
}

impl LiveSettings for HostSettings {
    fn project_dir(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    fn load_scope(&self, scope: Scope) -> LoadoutResult<ScopeState> {
        let dir = self.project_dir.as_deref();
        let settings = load_settings(&self.layout.settings_path(scope, dir)?)?;
        let mcp = load_mcp_config(&self.layout.mcp_location(scope, dir)?)?;
        let extensions = match self.layout.extensions_root(scope, dir)? {
            Some(root) => list_extensions(&root)?.into(),
            None => Extensions::default(),
        };

        Ok(ScopeState {
            plugins: settings.enabled(),
            mcp_servers: mcp.servers,
            extensions,
        })
    }

    fn save_scope(&self, scope: Scope, state: &ScopeState) -> LoadoutResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LoadoutError::Internal("settings lock poisoned".into()))?;
        let current = self.load_scope(scope)?;
        self.write_plugins(scope, &state.plugins)?;
        self.write_servers(scope, &current.mcp_servers, &state.mcp_servers)
    }

    fn update_scope(
        &self,
        scope: Scope,
        edit: &mut dyn FnMut(&mut ScopeState),
    ) -> LoadoutResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LoadoutError::Internal("settings lock poisoned".into()))?;
        let current = self.load_scope(scope)?;
        let mut next = current.clone();
        edit(&mut next);
        if next == current {
            return Ok(());
        }
        self.write_plugins(scope, &next.plugins)?;
        self.write_servers(scope, &current.mcp_servers, &next.mcp_servers)
    }

    fn marketplaces(&self) -> LoadoutResult<Vec<KnownMarketplace>> {
        Ok(load_known_marketplaces(&self.layout.plugins_dir())?)
    }

    fn installed_plugins(&self) -> LoadoutResult<InstalledPlugins> {
        Ok(InstalledPlugins::load(&self.layout.plugins_dir())?)
    }
}

fn read_document(path: &Path) -> LoadoutResult<Value> {
    match read_optional(path)? {
        Some(content) if !content.trim().is_empty() => {
            serde_json::from_str(&content).map_err(|e| LoadoutError::json(path, &e))
        }
        _ => Ok(json!({})),
    }
}

fn has_section(doc: &Value, keys: &[&str]) -> bool {
    let mut current = doc;
    for key in keys {
        match current.get(*key) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

/// Walk (creating as needed) nested objects and return the innermost one
fn object_at<'a>(
    doc: &'a mut Value,
    keys: &[&str],
    path: &Path,
) -> LoadoutResult<&'a mut Map<String, Value>> {
    let mut current = doc;
    for key in keys {
        let obj = current.as_object_mut().ok_or_else(|| not_an_object(path, key))?;
        current = obj.entry((*key).to_string()).or_insert_with(|| json!({}));
    }
    let last = keys.last().copied().unwrap_or("document");
    current
        .as_object_mut()
        .ok_or_else(|| not_an_object(path, last))
}

fn not_an_object(path: &Path, key: &str) -> LoadoutError {
    LoadoutError::Json {
        path: path.to_path_buf(),
        message: format!("expected a JSON object at '{key}'"),
    }
}

fn write_if_changed(path: &Path, before: &Value, after: &Value) -> LoadoutResult<()> {
    if before == after {
        return Ok(());
    }
    crate::util::write_json_atomic(path, after)?;
    tracing::debug!(path = %path.display(), "wrote settings");
    Ok(())
}
