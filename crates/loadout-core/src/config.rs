//! Tool configuration and file locations

use crate::error::{LoadoutError, LoadoutResult};
use crate::util::read_json_optional;
use loadout_scanner::HostLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the loadout data directory (default `~/.loadout`)
pub const LOADOUT_HOME_ENV: &str = "LOADOUT_HOME";
/// Overrides the Claude Code config directory (default `~/.claude`)
pub const CLAUDE_CONFIG_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";

const DEFAULT_CONCURRENCY: usize = 4;

/// User-editable settings, read from `<loadout home>/config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadoutConfig {
    /// Maximum parallel plugin installs per scope
    pub concurrency: usize,
    /// Claude Code executable used for plugin and marketplace operations
    pub claude_bin: String,
    /// Force interactive prompts on or off (auto-detected when unset)
    pub interactive: Option<bool>,
}

impl Default for LoadoutConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            claude_bin: "claude".to_string(),
            interactive: None,
        }
    }
}

impl LoadoutConfig {
    /// Load the config file, falling back to defaults when it does not exist
    ///
    /// # Errors
    /// Returns an error if the file exists but is not valid
    pub fn load(path: &Path) -> LoadoutResult<Self> {
        let config: Self = read_json_optional(path)?.unwrap_or_default();
        if config.concurrency == 0 {
            return Err(LoadoutError::Json {
                path: path.to_path_buf(),
                message: "concurrency must be greater than 0".into(),
            });
        }
        Ok(config)
    }
}

/// Resolved locations of everything loadout reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Claude Code file layout
    pub layout: HostLayout,
    /// loadout's own data directory
    pub loadout_home: PathBuf,
}

impl Paths {
    /// Default locations below a home directory
    #[must_use]
    pub fn for_home(home: &Path) -> Self {
        Self {
            layout: HostLayout::for_home(home),
            loadout_home: home.join(".loadout"),
        }
    }

    /// Locations for the current user, honoring `LOADOUT_HOME` and
    /// `CLAUDE_CONFIG_DIR`
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn detect() -> LoadoutResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| LoadoutError::Internal("Cannot find home directory".into()))?;
        let mut paths = Self::for_home(&home);

        if let Some(dir) = env_path(CLAUDE_CONFIG_DIR_ENV) {
            paths.layout = HostLayout::new(dir.clone(), dir.join(".claude.json"));
        }
        if let Some(dir) = env_path(LOADOUT_HOME_ENV) {
            paths.loadout_home = dir;
        }

        tracing::debug!(
            claude_dir = %paths.layout.claude_dir.display(),
            loadout_home = %paths.loadout_home.display(),
            "resolved paths"
        );
        Ok(paths)
    }

    /// Root of the profile library
    #[must_use]
    pub fn profiles_dir(&self) -> PathBuf {
        self.loadout_home.join("profiles")
    }

    /// Library of extension files that profiles can enable
    #[must_use]
    pub fn ext_dir(&self) -> PathBuf {
        self.loadout_home.join("ext")
    }

    /// Last-applied breadcrumb file
    #[must_use]
    pub fn breadcrumb_file(&self) -> PathBuf {
        self.loadout_home.join("last-applied.json")
    }

    /// Tool configuration file
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.loadout_home.join("config.json")
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
