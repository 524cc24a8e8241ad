//! Installed plugin records and known marketplaces

use crate::error::{ScanError, ScanResult};
use crate::parser::read_optional;
use crate::types::Scope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const INSTALLED_FILE: &str = "installed_plugins.json";
const MARKETPLACES_FILE: &str = "known_marketplaces.json";

/// One installation record from installed_plugins.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    /// Full reference, `plugin@marketplace`
    pub reference: String,
    /// Plugin name
    pub name: String,
    /// Marketplace it came from
    pub marketplace: Option<String>,
    /// Installation scope
    pub scope: Scope,
    /// Project path (for project/local installs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    /// Where the plugin files were copied to
    pub install_path: PathBuf,
    /// Installed version
    pub version: String,
}

/// Everything recorded in installed_plugins.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstalledPlugins {
    pub plugins: Vec<InstalledPlugin>,
}

#[derive(Debug, Deserialize)]
struct RawInstalledPlugins {
    #[serde(default)]
    plugins: BTreeMap<String, Vec<RawPluginInstall>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPluginInstall {
    #[serde(default = "default_scope")]
    scope: String,
    project_path: Option<String>,
    install_path: String,
    #[serde(default)]
    version: String,
}

fn default_scope() -> String {
    "user".to_string()
}

/// Split `plugin@marketplace` into its parts
#[must_use]
pub fn split_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('@') {
        Some((name, marketplace)) if !marketplace.is_empty() => (name, Some(marketplace)),
        Some((name, _)) => (name, None),
        None => (reference, None),
    }
}

impl InstalledPlugins {
    /// Load installed_plugins.json from a plugins directory
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load(plugins_dir: &Path) -> ScanResult<Self> {
        let path = plugins_dir.join(INSTALLED_FILE);
        let Some(content) = read_optional(&path)? else {
            return Ok(Self::default());
        };
        Self::parse(&path, &content)
    }

    /// Parse installed_plugins.json content
    ///
    /// # Errors
    /// Returns an error if the content is not valid JSON of the expected shape
    pub fn parse(path: &Path, content: &str) -> ScanResult<Self> {
        let raw: RawInstalledPlugins =
            serde_json::from_str(content).map_err(|e| ScanError::json(path, e))?;

        let mut plugins = Vec::new();
        for (reference, installs) in raw.plugins {
            let (name, marketplace) = split_reference(&reference);
            for install in installs {
                let Ok(scope) = install.scope.parse::<Scope>() else {
                    tracing::debug!(
                        plugin = %reference,
                        scope = %install.scope,
                        "skipping install record with unsupported scope"
                    );
                    continue;
                };
                plugins.push(InstalledPlugin {
                    reference: reference.clone(),
                    name: name.to_string(),
                    marketplace: marketplace.map(str::to_string),
                    scope,
                    project_path: install.project_path,
                    install_path: PathBuf::from(install.install_path),
                    version: install.version,
                });
            }
        }

        Ok(Self { plugins })
    }

    /// Find the install record of a plugin at a scope
    ///
    /// Project and local records only match when their project path equals
    /// `project_dir`.
    #[must_use]
    pub fn find(
        &self,
        reference: &str,
        scope: Scope,
        project_dir: Option<&Path>,
    ) -> Option<&InstalledPlugin> {
        self.plugins.iter().find(|p| {
            p.reference == reference
                && p.scope == scope
                && (!scope.is_project_bound()
                    || match (&p.project_path, project_dir) {
                        (Some(recorded), Some(dir)) => same_dir(recorded, dir),
                        _ => false,
                    })
        })
    }
}

fn same_dir(recorded: &str, dir: &Path) -> bool {
    let normalize = |s: &str| s.replace('\\', "/").trim_end_matches('/').to_string();
    normalize(recorded) == normalize(&dir.to_string_lossy())
}

/// A marketplace registered with Claude Code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownMarketplace {
    /// Marketplace name (the part after `@` in plugin references)
    pub name: String,
    /// Source: `owner/repo` for GitHub, otherwise a git URL or local path
    pub repo: String,
    /// Where the marketplace was cloned to
    pub install_location: Option<PathBuf>,
}

/// Load known_marketplaces.json from a plugins directory
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed
pub fn load_known_marketplaces(plugins_dir: &Path) -> ScanResult<Vec<KnownMarketplace>> {
    let path = plugins_dir.join(MARKETPLACES_FILE);
    let Some(content) = read_optional(&path)? else {
        return Ok(Vec::new());
    };

    let raw: BTreeMap<String, Value> =
        serde_json::from_str(&content).map_err(|e| ScanError::json(&path, e))?;

    Ok(raw
        .into_iter()
        .map(|(name, entry)| {
            let source = entry.get("source");
            let repo = source
                .and_then(|s| {
                    s.get("repo")
                        .or_else(|| s.get("url"))
                        .or_else(|| s.get("path"))
                })
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let install_location = entry
                .get("installLocation")
                .and_then(Value::as_str)
                .map(PathBuf::from);
            KnownMarketplace {
                name,
                repo,
                install_location,
            }
        })
        .collect())
}
