//! Diff data types

use crate::error::{LoadoutError, LoadoutResult};
use crate::profile::{Extensions, Profile, ProfileShape, ScopeSettings};
use crate::settings::ScopeState;
use loadout_scanner::{McpServer, Scope};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What kind of configuration item a diff entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Plugin,
    McpServer,
    Marketplace,
    Extension,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plugin => write!(f, "plugin"),
            Self::McpServer => write!(f, "MCP server"),
            Self::Marketplace => write!(f, "marketplace"),
            Self::Extension => write!(f, "extension"),
        }
    }
}

/// Direction of a change, ordered the way diffs are displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Removed,
    Modified,
    Added,
}

impl DiffOp {
    /// The operation seen from the other side
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Removed => Self::Added,
            Self::Modified => Self::Modified,
            Self::Added => Self::Removed,
        }
    }
}

/// A single differing item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffItem {
    pub kind: ItemKind,
    /// Plugin reference, server name, marketplace repo or `category/name`
    pub name: String,
    #[serde(rename = "operation")]
    pub op: DiffOp,
    /// Line diff of the two definitions for modified items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Items differing in one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDiff {
    pub scope: Scope,
    pub items: Vec<DiffItem>,
}

impl ScopeDiff {
    /// Items with a given operation
    pub fn with_op(&self, op: DiffOp) -> impl Iterator<Item = &DiffItem> {
        self.items.iter().filter(move |i| i.op == op)
    }
}

/// Description before and after
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Complete difference between two normalized profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDiff {
    pub profile_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_change: Option<DescriptionChange>,
    /// Only scopes with at least one item
    pub scopes: Vec<ScopeDiff>,
}

impl ProfileDiff {
    /// True when nothing differs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description_change.is_none() && self.scopes.iter().all(|s| s.items.is_empty())
    }

    /// Total number of differing items across scopes
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.scopes.iter().map(|s| s.items.len()).sum()
    }

    /// Diff of one scope, if it has any items
    #[must_use]
    pub fn scope(&self, scope: Scope) -> Option<&ScopeDiff> {
        self.scopes.iter().find(|s| s.scope == scope)
    }
}

/// Which parts of a profile take part in a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    pub marketplaces: bool,
    pub description: bool,
}

impl DiffOptions {
    /// Everything compared
    pub const FULL: Self = Self {
        marketplaces: true,
        description: true,
    };
    /// Drift ignores marketplaces and the description
    pub const DRIFT: Self = Self {
        marketplaces: false,
        description: false,
    };
}

/// Content of one scope in comparable form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeContent {
    pub plugins: BTreeSet<String>,
    pub mcp_servers: BTreeMap<String, McpServer>,
    /// Env keys per server whose values are secrets and never compared
    pub secret_keys: BTreeMap<String, BTreeSet<String>>,
    pub extensions: Extensions,
}

impl ScopeContent {
    fn from_settings(settings: &ScopeSettings) -> Self {
        let mut content = Self {
            plugins: settings.plugins.iter().cloned().collect(),
            extensions: settings.extensions.clone(),
            ..Self::default()
        };
        for def in &settings.mcp_servers {
            content.mcp_servers.insert(def.name.clone(), def.to_live());
            if !def.secret_requirements.is_empty() {
                content.secret_keys.insert(
                    def.name.clone(),
                    def.secret_requirements.iter().cloned().collect(),
                );
            }
        }
        content
    }

    fn from_state(state: &ScopeState) -> Self {
        Self {
            plugins: state.plugins.clone(),
            mcp_servers: state.mcp_servers.clone(),
            secret_keys: BTreeMap::new(),
            extensions: state.extensions.clone(),
        }
    }
}

/// A profile or live configuration laid out per scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedProfile {
    pub name: String,
    pub description: Option<String>,
    pub scopes: BTreeMap<Scope, ScopeContent>,
    /// Marketplace repos
    pub marketplaces: BTreeSet<String>,
}

impl NormalizedProfile {
    /// Lay a resolved profile out per scope; flat content goes to `target`
    ///
    /// # Errors
    /// Returns `InvalidProfile` for an unresolved stack
    pub fn from_profile(profile: &Profile, target: Scope) -> LoadoutResult<Self> {
        let scopes = match profile.shape() {
            ProfileShape::Stack => {
                return Err(LoadoutError::invalid(
                    &profile.name,
                    "includes must be resolved before comparing",
                ))
            }
            ProfileShape::Flat => {
                BTreeMap::from([(target, ScopeContent::from_settings(&profile.flat_settings()))])
            }
            ProfileShape::MultiScope => profile
                .per_scope
                .iter()
                .filter(|(_, s)| !s.is_empty())
                .map(|(scope, s)| (*scope, ScopeContent::from_settings(s)))
                .collect(),
        };

        Ok(Self {
            name: profile.name.clone(),
            description: profile.description.clone(),
            scopes,
            marketplaces: profile
                .marketplaces
                .iter()
                .map(|m| normalize_repo(&m.repo))
                .collect(),
        })
    }

    /// Lay live scope states out for comparison
    #[must_use]
    pub fn from_live(
        name: &str,
        states: &BTreeMap<Scope, ScopeState>,
        marketplaces: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            scopes: states
                .iter()
                .map(|(scope, state)| (*scope, ScopeContent::from_state(state)))
                .collect(),
            marketplaces: marketplaces
                .into_iter()
                .map(|r| normalize_repo(&r))
                .collect(),
        }
    }

    /// Keep only the given scopes
    #[must_use]
    pub fn restrict(mut self, scopes: &BTreeSet<Scope>) -> Self {
        self.scopes.retain(|scope, _| scopes.contains(scope));
        self
    }
}

/// Canonical form of a marketplace source for comparison
///
/// GitHub URLs and `owner/repo` shorthand compare equal.
#[must_use]
pub fn normalize_repo(repo: &str) -> String {
    let trimmed = repo.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    trimmed
        .strip_prefix("https://github.com/")
        .or_else(|| trimmed.strip_prefix("git@github.com:"))
        .unwrap_or(trimmed)
        .to_string()
}
