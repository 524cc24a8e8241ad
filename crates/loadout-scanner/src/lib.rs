//! Loadout Scanner - live Claude Code state discovery
//!
//! Reads the per-scope settings files, MCP server definitions, installed
//! plugin records, known marketplaces and extension directories that make up
//! the live configuration of a Claude Code installation. Nothing in this
//! crate writes to disk.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

pub mod error;
pub mod extensions;
pub mod layout;
pub mod parser;
pub mod plugins;
pub mod repair;
pub mod settings;
pub mod types;

pub use error::{ScanError, ScanResult};
pub use extensions::{list_extensions, ExtensionCategory, ExtensionListing};
pub use layout::{HostLayout, McpLocation};
pub use plugins::{InstalledPlugin, InstalledPlugins, KnownMarketplace};
pub use repair::{repair_install_path, Repair, RepairRule, DEFAULT_REPAIR_RULES};
pub use settings::{McpConfig, McpServer, McpTransport, SettingsFile};
pub use types::Scope;
