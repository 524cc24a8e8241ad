//! Where Claude Code keeps each scope's state on disk

use crate::error::{ScanError, ScanResult};
use crate::types::Scope;
use std::path::{Path, PathBuf};

/// File locations of one Claude Code installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// User-level config directory (~/.claude)
    pub claude_dir: PathBuf,
    /// User-level state file (~/.claude.json)
    pub claude_json: PathBuf,
}

/// Where the MCP servers of one scope live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpLocation {
    /// JSON file holding the servers
    pub path: PathBuf,
    /// Key under `projects` when the servers are nested per project
    pub project_key: Option<String>,
}

impl HostLayout {
    /// Layout for an explicit config directory and state file
    #[must_use]
    pub fn new(claude_dir: PathBuf, claude_json: PathBuf) -> Self {
        Self {
            claude_dir,
            claude_json,
        }
    }

    /// Default layout below a home directory
    #[must_use]
    pub fn for_home(home: &Path) -> Self {
        Self::new(home.join(".claude"), home.join(".claude.json"))
    }

    /// Default layout for the current user
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn detect() -> ScanResult<Self> {
        let home = dirs::home_dir().ok_or(ScanError::HomeNotFound)?;
        Ok(Self::for_home(&home))
    }

    /// Directory holding plugin bookkeeping (installed plugins, marketplaces)
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.claude_dir.join("plugins")
    }

    /// Settings file that carries `enabledPlugins` for a scope
    ///
    /// # Errors
    /// Returns an error if a project-bound scope has no project directory
    pub fn settings_path(&self, scope: Scope, project_dir: Option<&Path>) -> ScanResult<PathBuf> {
        match scope {
            Scope::User => Ok(self.claude_dir.join("settings.json")),
            Scope::Project => {
                Ok(require_dir(scope, project_dir)?.join(".claude").join("settings.json"))
            }
            Scope::Local => Ok(require_dir(scope, project_dir)?
                .join(".claude")
                .join("settings.local.json")),
        }
    }

    /// Location of the MCP servers for a scope
    ///
    /// Local-scope servers are private to one checkout, so Claude Code keeps
    /// them in ~/.claude.json under `projects.<dir>`.
    ///
    /// # Errors
    /// Returns an error if a project-bound scope has no project directory
    pub fn mcp_location(&self, scope: Scope, project_dir: Option<&Path>) -> ScanResult<McpLocation> {
        match scope {
            Scope::User => Ok(McpLocation {
                path: self.claude_json.clone(),
                project_key: None,
            }),
            Scope::Project => Ok(McpLocation {
                path: require_dir(scope, project_dir)?.join(".mcp.json"),
                project_key: None,
            }),
            Scope::Local => Ok(McpLocation {
                path: self.claude_json.clone(),
                project_key: Some(require_dir(scope, project_dir)?.to_string_lossy().into_owned()),
            }),
        }
    }

    /// Root directory whose category subdirectories hold extensions
    ///
    /// Local scope has no extension directory of its own.
    ///
    /// # Errors
    /// Returns an error if project scope has no project directory
    pub fn extensions_root(
        &self,
        scope: Scope,
        project_dir: Option<&Path>,
    ) -> ScanResult<Option<PathBuf>> {
        match scope {
            Scope::User => Ok(Some(self.claude_dir.clone())),
            Scope::Project => Ok(Some(require_dir(scope, project_dir)?.join(".claude"))),
            Scope::Local => Ok(None),
        }
    }
}

fn require_dir(scope: Scope, project_dir: Option<&Path>) -> ScanResult<&Path> {
    project_dir.ok_or(ScanError::ProjectDirRequired(scope))
}
