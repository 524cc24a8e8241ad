//! Settings and MCP configuration types

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Parsed plugin-enablement content of a settings.json file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    /// Path to the settings file
    pub path: PathBuf,
    /// Enabled plugins map, keyed by `plugin@marketplace`
    #[serde(default)]
    pub enabled_plugins: BTreeMap<String, bool>,
}

impl SettingsFile {
    /// Plugin references switched on in this file
    #[must_use]
    pub fn enabled(&self) -> BTreeSet<String> {
        self.enabled_plugins
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// MCP (Model Context Protocol) configuration read from one location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    /// Path to the config file
    #[serde(default)]
    pub path: PathBuf,
    /// Configured servers, keyed by name
    #[serde(default)]
    pub servers: BTreeMap<String, McpServer>,
}

/// MCP server configuration as Claude Code stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    /// Server name
    pub name: String,
    /// Transport type
    pub transport: McpTransport,
    /// Command to run (for stdio)
    pub command: Option<String>,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// URL (for http/sse)
    pub url: Option<String>,
}

impl McpServer {
    /// Render the server body in the host's JSON format (the name is the map key)
    #[must_use]
    pub fn to_host_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), json!(self.transport.as_str()));
        if let Some(command) = &self.command {
            obj.insert("command".into(), json!(command));
        }
        if !self.args.is_empty() {
            obj.insert("args".into(), json!(self.args));
        }
        if !self.env.is_empty() {
            obj.insert("env".into(), json!(self.env));
        }
        if let Some(url) = &self.url {
            obj.insert("url".into(), json!(url));
        }
        Value::Object(obj)
    }
}

/// MCP transport types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    #[default]
    Stdio,
    Http,
    Sse,
}

impl McpTransport {
    /// Name used in the `type` field
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
        }
    }

    /// Parse the `type` field, defaulting to stdio like Claude Code does
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("http") => Self::Http,
            Some("sse") => Self::Sse,
            _ => Self::Stdio,
        }
    }
}
