//! CLI command handlers
//!
//! Each handler is a thin translation onto the core API. Shared state
//! (paths, tool config, project directory, interactivity) lives in
//! [`Context`].

pub mod apply;
pub mod profile;
pub mod prompt;
pub mod status;

use anyhow::{bail, Context as _};
use loadout_core::apply::HostInstaller;
use loadout_core::profile::{explicit_path, ProfileStore};
use loadout_core::{HostSettings, LoadoutConfig, LoadoutError, LoadoutResult, Paths};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Everything a command needs to know about its environment
pub struct Context {
    pub paths: Paths,
    pub config: LoadoutConfig,
    pub project_dir: PathBuf,
    /// Prompts may be shown
    pub interactive: bool,
    /// `--yes` was given
    pub yes: bool,
}

impl Context {
    pub fn load(project_dir: Option<PathBuf>, yes: bool) -> anyhow::Result<Self> {
        let paths = Paths::detect()?;
        let config = LoadoutConfig::load(&paths.config_file())?;

        let dir = match project_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Cannot determine current directory")?,
        };
        let project_dir = dir
            .canonicalize()
            .with_context(|| format!("Project directory not found: {}", dir.display()))?;

        let interactive = !yes && config.interactive.unwrap_or_else(|| std::io::stdin().is_terminal());
        tracing::debug!(project = %project_dir.display(), interactive, "loaded context");

        Ok(Self {
            paths,
            config,
            project_dir,
            interactive,
            yes,
        })
    }

    pub fn store(&self) -> ProfileStore {
        ProfileStore::new(self.paths.profiles_dir())
    }

    pub fn host(&self) -> HostSettings {
        HostSettings::new(self.paths.layout.clone(), Some(self.project_dir.clone()))
    }

    pub fn installer<'a>(&self, host: &'a HostSettings) -> HostInstaller<'a> {
        HostInstaller::new(host, self.config.claude_bin.clone(), self.paths.ext_dir())
    }

    /// Ask a yes/no question; `--yes` answers yes, a non-interactive run no
    pub fn confirm(&self, question: &str) -> anyhow::Result<bool> {
        if self.yes {
            return Ok(true);
        }
        if !self.interactive {
            return Ok(false);
        }
        prompt::confirm(question)
    }
}

/// Run a lookup by profile name, letting the user pick when the name is
/// ambiguous and prompts are allowed
pub fn disambiguate<T>(
    ctx: &Context,
    name: &str,
    mut lookup: impl FnMut(&str) -> LoadoutResult<T>,
) -> anyhow::Result<T> {
    match lookup(name) {
        Err(LoadoutError::AmbiguousProfile { name, paths }) if ctx.interactive => {
            let Some(choice) = prompt::pick(&format!("'{name}' matches several profiles:"), &paths)?
            else {
                bail!("Cancelled.");
            };
            Ok(lookup(&explicit_path(&paths[choice]))?)
        }
        other => Ok(other?),
    }
}
