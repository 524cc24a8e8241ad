//! Stack (include) resolution
//!
//! A stack lists other profiles to merge. Includes are expanded depth-first
//! in list order; a nested stack contributes its own includes before its own
//! items, and the root's own items come last. The first occurrence of a
//! plugin or MCP server wins.

use super::storage::ProfileLoader;
use super::types::{Extensions, MarketplaceRef, McpServerDef, Profile, ScopeSettings};
use crate::error::{LoadoutError, LoadoutResult};
use loadout_scanner::Scope;
use std::collections::{BTreeMap, BTreeSet};

/// Limit on include nesting, well above anything hand-written
const MAX_INCLUDE_DEPTH: usize = 32;

/// Two profiles in a stack define the same MCP server differently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    /// Scope the server was declared for (`None` for flat content)
    pub scope: Option<Scope>,
    pub server: String,
    /// Profile whose definition was kept
    pub kept_from: String,
    /// Profile whose definition was dropped
    pub ignored_from: String,
}

/// A resolved profile plus the conflicts met while merging
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Flat or multi-scope profile with an empty include list
    pub profile: Profile,
    pub conflicts: Vec<MergeConflict>,
}

#[derive(Default)]
struct ScopeAcc {
    plugins: Vec<String>,
    seen_plugins: BTreeSet<String>,
    servers: Vec<McpServerDef>,
    server_origin: BTreeMap<String, String>,
    extensions: Extensions,
}

impl ScopeAcc {
    fn absorb(
        &mut self,
        scope: Option<Scope>,
        origin: &str,
        settings: &ScopeSettings,
        conflicts: &mut Vec<MergeConflict>,
    ) {
        for plugin in &settings.plugins {
            if self.seen_plugins.insert(plugin.clone()) {
                self.plugins.push(plugin.clone());
            }
        }
        for server in &settings.mcp_servers {
            self.absorb_server(scope, origin, server, conflicts);
        }
        self.extensions.merge(&settings.extensions);
    }

    fn absorb_server(
        &mut self,
        scope: Option<Scope>,
        origin: &str,
        server: &McpServerDef,
        conflicts: &mut Vec<MergeConflict>,
    ) {
        match self.servers.iter().find(|s| s.name == server.name) {
            None => {
                self.servers.push(server.clone());
                self.server_origin
                    .insert(server.name.clone(), origin.to_string());
            }
            Some(existing) if existing == server => {}
            Some(_) => {
                let kept_from = self
                    .server_origin
                    .get(&server.name)
                    .cloned()
                    .unwrap_or_default();
                tracing::warn!(
                    server = %server.name,
                    kept = %kept_from,
                    ignored = origin,
                    "conflicting MCP server definitions in stack, keeping the first"
                );
                conflicts.push(MergeConflict {
                    scope,
                    server: server.name.clone(),
                    kept_from,
                    ignored_from: origin.to_string(),
                });
            }
        }
    }

    fn into_settings(self) -> ScopeSettings {
        ScopeSettings {
            plugins: self.plugins,
            mcp_servers: self.servers,
            extensions: self.extensions,
        }
    }
}

#[derive(Default)]
struct Merger {
    flat: ScopeAcc,
    scoped: BTreeMap<Scope, ScopeAcc>,
    marketplaces: Vec<MarketplaceRef>,
    conflicts: Vec<MergeConflict>,
}

impl Merger {
    fn absorb_own(&mut self, profile: &Profile) {
        self.flat.absorb(
            None,
            &profile.name,
            &profile.flat_settings(),
            &mut self.conflicts,
        );
        for (scope, settings) in &profile.per_scope {
            self.scoped.entry(*scope).or_default().absorb(
                Some(*scope),
                &profile.name,
                settings,
                &mut self.conflicts,
            );
        }
        for market in &profile.marketplaces {
            if !self.marketplaces.iter().any(|m| m.repo == market.repo) {
                self.marketplaces.push(market.clone());
            }
        }
    }

    fn absorb_include(
        &mut self,
        name: &str,
        loader: &dyn ProfileLoader,
        visiting: &mut Vec<String>,
    ) -> LoadoutResult<()> {
        let included = loader.load(name)?.profile;

        if let Some(pos) = visiting.iter().position(|v| *v == included.name) {
            let mut chain = visiting[pos..].to_vec();
            chain.push(included.name);
            return Err(LoadoutError::Cycle { chain });
        }
        if visiting.len() > MAX_INCLUDE_DEPTH {
            return Err(LoadoutError::invalid(
                &visiting[0],
                format!("includes nest deeper than {MAX_INCLUDE_DEPTH} levels"),
            ));
        }

        visiting.push(included.name.clone());
        for nested in &included.includes {
            self.absorb_include(nested, loader, visiting)?;
        }
        self.absorb_own(&included);
        visiting.pop();
        Ok(())
    }

    fn finish(mut self, root: &Profile) -> Resolution {
        let mut resolved = Profile {
            name: root.name.clone(),
            description: root.description.clone(),
            marketplaces: self.marketplaces,
            post_apply: root.post_apply.clone(),
            ..Profile::default()
        };

        if self.scoped.is_empty() {
            let flat = self.flat.into_settings();
            resolved.plugins = flat.plugins;
            resolved.mcp_servers = flat.mcp_servers;
            resolved.extensions = flat.extensions;
        } else {
            // Flat members of a mixed stack land in user scope
            let flat = self.flat.into_settings();
            if !flat.is_empty() {
                tracing::debug!(profile = %root.name, "folding flat stack members into user scope");
                self.scoped.entry(Scope::User).or_default().absorb(
                    Some(Scope::User),
                    &root.name,
                    &flat,
                    &mut self.conflicts,
                );
            }
            resolved.per_scope = self
                .scoped
                .into_iter()
                .map(|(scope, acc)| (scope, acc.into_settings()))
                .filter(|(_, settings)| !settings.is_empty())
                .collect();
        }

        Resolution {
            profile: resolved,
            conflicts: self.conflicts,
        }
    }
}

/// Expand a stack's includes into a single flat or multi-scope profile
///
/// Non-stack profiles resolve to themselves.
///
/// # Errors
/// Returns `Cycle` when an include refers back to a profile being expanded,
/// or any error from loading an included profile
pub fn resolve_includes(profile: &Profile, loader: &dyn ProfileLoader) -> LoadoutResult<Resolution> {
    if !profile.is_stack() {
        return Ok(Resolution {
            profile: profile.clone(),
            conflicts: Vec::new(),
        });
    }

    let mut merger = Merger::default();
    let mut visiting = vec![profile.name.clone()];
    for include in &profile.includes {
        merger.absorb_include(include, loader, &mut visiting)?;
    }
    merger.absorb_own(profile);

    let resolution = merger.finish(profile);
    tracing::debug!(
        profile = %profile.name,
        includes = profile.includes.len(),
        conflicts = resolution.conflicts.len(),
        "resolved stack"
    );
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::storage::{LoadedProfile, ProfileSource};
    use crate::profile::ProfileShape;
    use std::collections::HashMap;

    struct MapLoader(HashMap<String, Profile>);

    impl ProfileLoader for MapLoader {
        fn load(&self, name: &str) -> LoadoutResult<LoadedProfile> {
            self.0
                .get(name)
                .cloned()
                .map(|profile| LoadedProfile {
                    profile,
                    source: ProfileSource::Builtin,
                })
                .ok_or_else(|| LoadoutError::ProfileNotFound(name.to_string()))
        }
    }

    fn loader(profiles: Vec<Profile>) -> MapLoader {
        MapLoader(profiles.into_iter().map(|p| (p.name.clone(), p)).collect())
    }

    fn flat(name: &str, plugins: &[&str]) -> Profile {
        let mut p = Profile::new(name);
        p.plugins = plugins.iter().map(|s| (*s).to_string()).collect();
        p
    }

    fn stack(name: &str, includes: &[&str]) -> Profile {
        let mut p = Profile::new(name);
        p.includes = includes.iter().map(|s| (*s).to_string()).collect();
        p
    }

    fn server(name: &str, command: &str) -> McpServerDef {
        McpServerDef {
            name: name.into(),
            transport: loadout_scanner::McpTransport::Stdio,
            command: Some(command.into()),
            args: Vec::new(),
            env: BTreeMap::new(),
            url: None,
            secret_requirements: Vec::new(),
        }
    }

    #[test]
    fn test_non_stack_resolves_to_itself() {
        let p = flat("a", &["x@m"]);
        let resolved = resolve_includes(&p, &loader(vec![])).unwrap();
        assert_eq!(resolved.profile, p);
    }

    #[test]
    fn test_duplicate_plugin_kept_once_in_order() {
        let l = loader(vec![flat("a", &["p@m", "q@m"]), flat("b", &["r@m", "p@m"])]);
        let resolved = resolve_includes(&stack("s", &["a", "b"]), &l).unwrap();
        assert_eq!(resolved.profile.plugins, vec!["p@m", "q@m", "r@m"]);
        assert!(resolved.profile.includes.is_empty());
        assert_eq!(resolved.profile.shape(), ProfileShape::Flat);
    }

    #[test]
    fn test_cycle_detected() {
        let l = loader(vec![stack("s1", &["s2"]), stack("s2", &["s1"])]);
        let err = resolve_includes(&stack("s1", &["s2"]), &l).unwrap_err();
        match err {
            LoadoutError::Cycle { chain } => assert_eq!(chain, vec!["s1", "s2", "s1"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let l = loader(vec![
            flat("base", &["b@m"]),
            stack("left", &["base"]),
            stack("right", &["base"]),
        ]);
        let resolved = resolve_includes(&stack("top", &["left", "right"]), &l).unwrap();
        assert_eq!(resolved.profile.plugins, vec!["b@m"]);
    }

    #[test]
    fn test_conflicting_mcp_keeps_first() {
        let mut a = Profile::new("a");
        a.mcp_servers = vec![server("db", "first")];
        let mut b = Profile::new("b");
        b.mcp_servers = vec![server("db", "second")];

        let resolved = resolve_includes(&stack("s", &["a", "b"]), &loader(vec![a, b])).unwrap();
        assert_eq!(resolved.profile.mcp_servers.len(), 1);
        assert_eq!(resolved.profile.mcp_servers[0].command.as_deref(), Some("first"));
        assert_eq!(resolved.conflicts.len(), 1);
        assert_eq!(resolved.conflicts[0].kept_from, "a");
        assert_eq!(resolved.conflicts[0].ignored_from, "b");
    }

    #[test]
    fn test_per_scope_union_and_flat_fold_into_user() {
        let mut scoped = Profile::new("scoped");
        scoped.per_scope.insert(
            Scope::Project,
            ScopeSettings {
                plugins: vec!["proj@m".into()],
                ..ScopeSettings::default()
            },
        );
        scoped.per_scope.insert(
            Scope::User,
            ScopeSettings {
                plugins: vec!["u1@m".into()],
                ..ScopeSettings::default()
            },
        );

        let l = loader(vec![scoped, flat("plain", &["u2@m", "u1@m"])]);
        let resolved = resolve_includes(&stack("s", &["scoped", "plain"]), &l).unwrap();
        let p = resolved.profile;
        assert_eq!(p.shape(), ProfileShape::MultiScope);
        assert!(p.plugins.is_empty());
        assert_eq!(p.per_scope[&Scope::User].plugins, vec!["u1@m", "u2@m"]);
        assert_eq!(p.per_scope[&Scope::Project].plugins, vec!["proj@m"]);
        p.validate().unwrap();
    }

    #[test]
    fn test_missing_include_is_error() {
        let err = resolve_includes(&stack("s", &["ghost"]), &loader(vec![])).unwrap_err();
        assert!(matches!(err, LoadoutError::ProfileNotFound(_)));
    }
}
