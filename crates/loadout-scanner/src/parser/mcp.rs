//! MCP configuration parser

use crate::error::{ScanError, ScanResult};
use crate::layout::McpLocation;
use crate::parser::read_optional;
use crate::settings::{McpConfig, McpServer, McpTransport};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMcpServer {
    #[serde(rename = "type")]
    transport_type: Option<String>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    url: Option<String>,
}

/// Convert a raw `mcpServers` object into typed servers
fn convert_servers(path: &Path, servers: &Value) -> ScanResult<BTreeMap<String, McpServer>> {
    let Some(map) = servers.as_object() else {
        return Err(ScanError::InvalidStructure {
            path: path.to_path_buf(),
            message: "mcpServers is not an object".into(),
        });
    };

    let mut result = BTreeMap::new();
    for (name, body) in map {
        let raw: RawMcpServer =
            serde_json::from_value(body.clone()).map_err(|e| ScanError::json(path, e))?;
        result.insert(
            name.clone(),
            McpServer {
                name: name.clone(),
                transport: McpTransport::parse(raw.transport_type.as_deref()),
                command: raw.command,
                args: raw.args,
                env: raw.env,
                url: raw.url,
            },
        );
    }
    Ok(result)
}

/// Parse MCP servers out of a JSON document
///
/// With `project_key` set, servers are read from
/// `projects.<project_key>.mcpServers` (the layout ~/.claude.json uses for
/// local-scope servers); otherwise from the top-level `mcpServers` object.
///
/// # Errors
/// Returns an error if parsing fails
pub fn parse_mcp_config(
    path: &Path,
    content: &str,
    project_key: Option<&str>,
) -> ScanResult<McpConfig> {
    let mut config = McpConfig {
        path: path.to_path_buf(),
        ..McpConfig::default()
    };
    if content.trim().is_empty() {
        return Ok(config);
    }

    let doc: Value = serde_json::from_str(content).map_err(|e| ScanError::json(path, e))?;

    let section = match project_key {
        Some(key) => doc
            .get("projects")
            .and_then(|p| p.get(key))
            .and_then(|p| p.get("mcpServers")),
        None => doc.get("mcpServers"),
    };

    if let Some(servers) = section {
        config.servers = convert_servers(path, servers)?;
    }
    Ok(config)
}

/// Load the MCP servers stored at a location, treating a missing file as empty
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed
pub fn load_mcp_config(location: &McpLocation) -> ScanResult<McpConfig> {
    match read_optional(&location.path)? {
        Some(content) => {
            parse_mcp_config(&location.path, &content, location.project_key.as_deref())
        }
        None => Ok(McpConfig {
            path: location.path.clone(),
            ..McpConfig::default()
        }),
    }
}
