//! Capture live configuration as a profile

use super::types::{MarketplaceRef, McpServerDef, Profile, ScopeSettings};
use crate::error::{LoadoutError, LoadoutResult};
use crate::settings::{LiveSettings, ScopeState};
use loadout_scanner::plugins::split_reference;
use loadout_scanner::Scope;
use std::collections::BTreeSet;

fn to_settings(state: &ScopeState) -> ScopeSettings {
    ScopeSettings {
        plugins: state.plugins.iter().cloned().collect(),
        mcp_servers: state.mcp_servers.values().map(McpServerDef::from_live).collect(),
        extensions: state.extensions.clone(),
    }
}

/// Build a profile from the live state of the given scopes
///
/// A single scope produces a flat profile; several produce a multi-scope
/// profile holding only the scopes that have content. Marketplaces are
/// derived from the plugin references and the host's known marketplaces.
///
/// # Errors
/// Returns an error if live settings cannot be read, or `InvalidProfile`
/// when several scopes were asked for and all of them are empty
pub fn snapshot_profile(
    name: &str,
    live: &dyn LiveSettings,
    scopes: &[Scope],
) -> LoadoutResult<Profile> {
    let mut profile = Profile::new(name);
    let mut market_names = BTreeSet::new();

    for scope in scopes {
        let state = live.load_scope(*scope)?;
        for plugin in &state.plugins {
            if let (_, Some(market)) = split_reference(plugin) {
                market_names.insert(market.to_string());
            }
        }

        let settings = to_settings(&state);
        if scopes.len() == 1 {
            profile.plugins = settings.plugins;
            profile.mcp_servers = settings.mcp_servers;
            profile.extensions = settings.extensions;
        } else if !settings.is_empty() {
            profile.per_scope.insert(*scope, settings);
        }
    }

    if scopes.len() > 1 && profile.per_scope.is_empty() {
        let names: Vec<String> = scopes.iter().map(ToString::to_string).collect();
        return Err(LoadoutError::invalid(
            name,
            format!("nothing configured in {} scope", names.join(", ")),
        ));
    }

    let known = live.marketplaces()?;
    for market in &market_names {
        match known.iter().find(|k| k.name == *market) {
            Some(k) if !k.repo.is_empty() => profile.marketplaces.push(MarketplaceRef {
                repo: k.repo.clone(),
                install_location: None,
            }),
            _ => tracing::debug!(marketplace = %market, "marketplace not registered, not recorded"),
        }
    }

    tracing::debug!(
        profile = name,
        scopes = scopes.len(),
        marketplaces = profile.marketplaces.len(),
        "captured live configuration"
    );
    Ok(profile)
}
