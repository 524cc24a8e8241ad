//! Profile types

use crate::error::{LoadoutError, LoadoutResult};
use crate::util::validate_name;
use loadout_scanner::{ExtensionCategory, McpServer, McpTransport, Scope};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named, declarative bundle of plugins, MCP servers, marketplaces and extensions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Profile name, unique within the profiles directory
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Plugin references (`plugin@marketplace`) for a flat profile
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
    /// MCP servers for a flat profile
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_servers: Vec<McpServerDef>,
    /// Marketplaces the plugins come from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marketplaces: Vec<MarketplaceRef>,
    /// File-based extensions for a flat profile
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
    /// Other profiles merged into this one (makes this profile a stack)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    /// Scope-specific content (makes this profile multi-scope)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_scope: BTreeMap<Scope, ScopeSettings>,
    /// Command or script run after a successful apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_apply: Option<PostApplyHook>,
}

/// Which of the three profile shapes a profile has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileShape {
    /// Top-level content, applied to one scope chosen at apply time
    Flat,
    /// `perScope` content, all populated scopes applied together
    MultiScope,
    /// `includes` list, resolved before diff or apply
    Stack,
}

impl std::fmt::Display for ProfileShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::MultiScope => write!(f, "multi-scope"),
            Self::Stack => write!(f, "stack"),
        }
    }
}

/// Content for one scope of a multi-scope profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_servers: Vec<McpServerDef>,
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl ScopeSettings {
    /// Whether this scope declares nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.mcp_servers.is_empty() && self.extensions.is_empty()
    }
}

/// MCP server declared by a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerDef {
    /// Server name
    pub name: String,
    /// Transport type (stdio, http, sse)
    #[serde(rename = "type", default, skip_serializing_if = "is_stdio")]
    pub transport: McpTransport,
    /// Command for stdio transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Command arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// URL for http/sse transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Environment keys whose values are secrets supplied at apply time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_requirements: Vec<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_stdio(t: &McpTransport) -> bool {
    *t == McpTransport::Stdio
}

impl McpServerDef {
    /// The server as it would appear in live configuration, without secrets
    #[must_use]
    pub fn to_live(&self) -> McpServer {
        McpServer {
            name: self.name.clone(),
            transport: self.transport,
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            url: self.url.clone(),
        }
    }

    /// Build a definition from a live server
    #[must_use]
    pub fn from_live(server: &McpServer) -> Self {
        Self {
            name: server.name.clone(),
            transport: server.transport,
            command: server.command.clone(),
            args: server.args.clone(),
            env: server.env.clone(),
            url: server.url.clone(),
            secret_requirements: Vec::new(),
        }
    }
}

/// Marketplace a profile's plugins come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceRef {
    /// `owner/repo` on GitHub, or a git URL / local path
    pub repo: String,
    /// Optional install location override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_location: Option<String>,
}

/// Extension names per category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensions(pub BTreeMap<ExtensionCategory, BTreeSet<String>>);

impl Extensions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }

    /// Add one extension; returns false if it was already present
    pub fn insert(&mut self, category: ExtensionCategory, name: impl Into<String>) -> bool {
        self.0.entry(category).or_default().insert(name.into())
    }

    #[must_use]
    pub fn contains(&self, category: ExtensionCategory, name: &str) -> bool {
        self.0.get(&category).is_some_and(|names| names.contains(name))
    }

    /// Set union with another extension set
    pub fn merge(&mut self, other: &Extensions) {
        for (category, names) in &other.0 {
            for name in names {
                self.insert(*category, name.clone());
            }
        }
    }

    /// Iterate `(category, name)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (ExtensionCategory, &str)> {
        self.0
            .iter()
            .flat_map(|(c, names)| names.iter().map(move |n| (*c, n.as_str())))
    }

    /// Number of extensions across all categories
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }
}

impl From<loadout_scanner::ExtensionListing> for Extensions {
    fn from(listing: loadout_scanner::ExtensionListing) -> Self {
        Self(listing)
    }
}

/// Hook run after a successful apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostApplyHook {
    /// Shell command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Script path, relative to the profiles directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// When the hook runs
    #[serde(default)]
    pub condition: HookCondition,
}

/// When a post-apply hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookCondition {
    /// After every successful apply
    #[default]
    Always,
    /// Only when the profile was not already the last one applied to the scope
    FirstRun,
}

impl Profile {
    /// Create an empty flat profile with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether this profile includes other profiles
    #[must_use]
    pub fn is_stack(&self) -> bool {
        !self.includes.is_empty()
    }

    /// The profile's shape
    #[must_use]
    pub fn shape(&self) -> ProfileShape {
        if self.is_stack() {
            ProfileShape::Stack
        } else if self.per_scope.is_empty() {
            ProfileShape::Flat
        } else {
            ProfileShape::MultiScope
        }
    }

    /// Top-level content as scope settings
    #[must_use]
    pub fn flat_settings(&self) -> ScopeSettings {
        ScopeSettings {
            plugins: self.plugins.clone(),
            mcp_servers: self.mcp_servers.clone(),
            extensions: self.extensions.clone(),
        }
    }

    /// Whether the top-level plugin/MCP/extension fields are all empty
    #[must_use]
    pub fn has_flat_content(&self) -> bool {
        !self.flat_settings().is_empty()
    }

    /// Scopes this profile writes when applied with `target` as the flat scope
    #[must_use]
    pub fn target_scopes(&self, target: Scope) -> Vec<Scope> {
        if self.per_scope.is_empty() {
            vec![target]
        } else {
            // BTreeMap keys come out in apply order
            self.per_scope
                .iter()
                .filter(|(_, s)| !s.is_empty())
                .map(|(scope, _)| *scope)
                .collect()
        }
    }

    /// Check the shape rules and reference formats
    ///
    /// # Errors
    /// Returns `InvalidProfile` describing the first violation found
    pub fn validate(&self) -> LoadoutResult<()> {
        validate_name(&self.name)?;

        if self.is_stack() && !self.per_scope.is_empty() {
            return Err(LoadoutError::invalid(
                &self.name,
                "a stack cannot declare perScope content; move it into an included profile",
            ));
        }
        if !self.per_scope.is_empty() && self.has_flat_content() {
            return Err(LoadoutError::invalid(
                &self.name,
                "top-level plugins/mcpServers/extensions cannot be combined with perScope",
            ));
        }
        if self
            .per_scope
            .get(&Scope::Local)
            .is_some_and(|s| !s.extensions.is_empty())
        {
            return Err(LoadoutError::invalid(
                &self.name,
                "local scope has no extension directory",
            ));
        }
        if self.includes.iter().any(|i| i.trim().is_empty()) {
            return Err(LoadoutError::invalid(&self.name, "empty include entry"));
        }

        let all_settings = std::iter::once(self.flat_settings()).chain(self.per_scope.values().cloned());
        for settings in all_settings {
            for plugin in &settings.plugins {
                validate_plugin_ref(&self.name, plugin)?;
            }
            let mut seen = BTreeSet::new();
            for server in &settings.mcp_servers {
                if server.name.is_empty() {
                    return Err(LoadoutError::invalid(&self.name, "MCP server without a name"));
                }
                if !seen.insert(server.name.as_str()) {
                    return Err(LoadoutError::invalid(
                        &self.name,
                        format!("MCP server '{}' declared twice in one scope", server.name),
                    ));
                }
            }
        }

        if let Some(hook) = &self.post_apply {
            if hook.command.is_some() == hook.script.is_some() {
                return Err(LoadoutError::invalid(
                    &self.name,
                    "postApply needs exactly one of 'command' or 'script'",
                ));
            }
        }

        Ok(())
    }
}

fn validate_plugin_ref(profile: &str, reference: &str) -> LoadoutResult<()> {
    match reference.split_once('@') {
        Some((name, market)) if !name.is_empty() && !market.is_empty() && !market.contains('@') => {
            Ok(())
        }
        _ => Err(LoadoutError::invalid(
            profile,
            format!("plugin reference '{reference}' must look like plugin@marketplace"),
        )),
    }
}
