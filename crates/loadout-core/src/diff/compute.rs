//! Diff computation
//!
//! Every comparison goes through [`compute_diff`]: items only in `to` are
//! added, items only in `from` are removed, items in both with different
//! definitions are modified. [`drift_diff`] and [`plan_diff`] only fix the
//! argument order for their call sites.

use super::types::{
    DescriptionChange, DiffItem, DiffOp, DiffOptions, ItemKind, NormalizedProfile, ScopeContent,
    ScopeDiff,
};
use super::ProfileDiff;
use loadout_scanner::{McpServer, Scope};
use similar::{ChangeTag, TextDiff};
use std::collections::{BTreeMap, BTreeSet};

/// Compare two normalized profiles
#[must_use]
pub fn compute_diff(
    from: &NormalizedProfile,
    to: &NormalizedProfile,
    options: DiffOptions,
) -> ProfileDiff {
    let scopes: BTreeSet<Scope> = from.scopes.keys().chain(to.scopes.keys()).copied().collect();
    // Marketplaces are host-wide; report them once, in the first scope
    let market_scope = scopes.iter().next().copied().unwrap_or(Scope::User);
    let empty = ScopeContent::default();

    let mut scope_diffs = Vec::new();
    let mut market_reported = false;
    for scope in scopes {
        let a = from.scopes.get(&scope).unwrap_or(&empty);
        let b = to.scopes.get(&scope).unwrap_or(&empty);
        let mut items = diff_scope(a, b);

        if options.marketplaces && scope == market_scope {
            items.extend(diff_set(ItemKind::Marketplace, &from.marketplaces, &to.marketplaces));
            market_reported = true;
        }

        sort_items(&mut items);
        if !items.is_empty() {
            scope_diffs.push(ScopeDiff { scope, items });
        }
    }

    // Neither side has any scope: marketplaces still count
    if options.marketplaces && !market_reported {
        let items = diff_set(ItemKind::Marketplace, &from.marketplaces, &to.marketplaces);
        if !items.is_empty() {
            scope_diffs.push(ScopeDiff {
                scope: market_scope,
                items,
            });
        }
    }

    let description_change = (options.description && from.description != to.description).then(|| {
        DescriptionChange {
            old: from.description.clone(),
            new: to.description.clone(),
        }
    });

    ProfileDiff {
        profile_name: to.name.clone(),
        description_change,
        scopes: scope_diffs,
    }
}

/// Drift of live state away from a saved profile
///
/// `added` are extras in live, `removed` are missing from live.
/// Marketplaces and the description are not compared.
#[must_use]
pub fn drift_diff(saved: &NormalizedProfile, live: &NormalizedProfile) -> ProfileDiff {
    let mut diff = compute_diff(saved, live, DiffOptions::DRIFT);
    diff.profile_name.clone_from(&saved.name);
    diff
}

/// Changes needed to bring live state to a desired profile
///
/// `added` must be installed, `removed` must be uninstalled. Marketplaces
/// are never removed, so only their additions are kept.
#[must_use]
pub fn plan_diff(desired: &NormalizedProfile, live: &NormalizedProfile) -> ProfileDiff {
    let options = DiffOptions {
        marketplaces: true,
        description: false,
    };
    let mut diff = compute_diff(live, desired, options);
    for scope in &mut diff.scopes {
        scope
            .items
            .retain(|i| !(i.kind == ItemKind::Marketplace && i.op == DiffOp::Removed));
    }
    diff.scopes.retain(|s| !s.items.is_empty());
    diff.profile_name.clone_from(&desired.name);
    diff
}

fn diff_scope(from: &ScopeContent, to: &ScopeContent) -> Vec<DiffItem> {
    let mut items = diff_set(ItemKind::Plugin, &from.plugins, &to.plugins);
    items.extend(diff_servers(from, to));

    let ext = |c: &ScopeContent| -> BTreeSet<String> {
        c.extensions
            .iter()
            .map(|(category, name)| format!("{category}/{name}"))
            .collect()
    };
    items.extend(diff_set(ItemKind::Extension, &ext(from), &ext(to)));
    items
}

fn diff_set(kind: ItemKind, from: &BTreeSet<String>, to: &BTreeSet<String>) -> Vec<DiffItem> {
    let removed = from.difference(to).map(|n| (n, DiffOp::Removed));
    let added = to.difference(from).map(|n| (n, DiffOp::Added));
    removed
        .chain(added)
        .map(|(name, op)| DiffItem {
            kind,
            name: name.clone(),
            op,
            detail: None,
        })
        .collect()
}

fn diff_servers(from: &ScopeContent, to: &ScopeContent) -> Vec<DiffItem> {
    let mut items = Vec::new();
    let names: BTreeSet<&String> = from.mcp_servers.keys().chain(to.mcp_servers.keys()).collect();

    for name in names {
        let op = match (from.mcp_servers.get(name), to.mcp_servers.get(name)) {
            (Some(_), None) => Some((DiffOp::Removed, None)),
            (None, Some(_)) => Some((DiffOp::Added, None)),
            (Some(a), Some(b)) => {
                let secrets = secret_keys(name, from, to);
                let a = without_secrets(a, &secrets);
                let b = without_secrets(b, &secrets);
                (a != b).then(|| (DiffOp::Modified, Some(server_detail(&a, &b))))
            }
            (None, None) => None,
        };
        if let Some((op, detail)) = op {
            items.push(DiffItem {
                kind: ItemKind::McpServer,
                name: name.clone(),
                op,
                detail,
            });
        }
    }
    items
}

fn secret_keys(name: &str, from: &ScopeContent, to: &ScopeContent) -> BTreeSet<String> {
    let lookup = |c: &ScopeContent| c.secret_keys.get(name).cloned().unwrap_or_default();
    lookup(from).union(&lookup(to)).cloned().collect()
}

fn without_secrets(server: &McpServer, secrets: &BTreeSet<String>) -> McpServer {
    let mut server = server.clone();
    server.env.retain(|k, _| !secrets.contains(k));
    server
}

fn server_detail(from: &McpServer, to: &McpServer) -> String {
    let render = |s: &McpServer| {
        let mut text = serde_json::to_string_pretty(&s.to_host_json()).unwrap_or_default();
        text.push('\n');
        text
    };
    text_diff(&render(from), &render(to))
}

/// Line diff with `-`/`+`/` ` prefixes
#[must_use]
pub fn text_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        output.push_str(sign);
        output.push_str(change.value());
        if !change.value().ends_with('\n') {
            output.push('\n');
        }
    }

    output
}

fn sort_items(items: &mut [DiffItem]) {
    items.sort_by(|a, b| (a.op, a.kind, &a.name).cmp(&(b.op, b.kind, &b.name)));
}

/// Group diff items of one scope by operation, in display order
#[must_use]
pub fn group_by_op(scope: &ScopeDiff) -> BTreeMap<DiffOp, Vec<&DiffItem>> {
    let mut groups: BTreeMap<DiffOp, Vec<&DiffItem>> = BTreeMap::new();
    for item in &scope.items {
        groups.entry(item.op).or_default().push(item);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadout_scanner::McpTransport;

    fn profile(plugins: &[&str]) -> NormalizedProfile {
        let mut content = ScopeContent::default();
        content.plugins = plugins.iter().map(|s| (*s).to_string()).collect();
        NormalizedProfile {
            name: "p".into(),
            description: None,
            scopes: BTreeMap::from([(Scope::User, content)]),
            marketplaces: BTreeSet::new(),
        }
    }

    fn server(env: &[(&str, &str)]) -> McpServer {
        McpServer {
            name: "db".into(),
            transport: McpTransport::Stdio,
            command: Some("pg".into()),
            args: Vec::new(),
            env: env
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            url: None,
        }
    }

    #[test]
    fn test_directionality() {
        let saved = profile(&["a@m", "b@m"]);
        let live = profile(&["b@m", "c@m"]);

        let diff = compute_diff(&saved, &live, DiffOptions::FULL);
        let items = &diff.scope(Scope::User).unwrap().items;
        assert_eq!(items[0].name, "a@m");
        assert_eq!(items[0].op, DiffOp::Removed);
        assert_eq!(items[1].name, "c@m");
        assert_eq!(items[1].op, DiffOp::Added);
    }

    #[test]
    fn test_reverse_is_mirror_image() {
        let a = profile(&["a@m", "b@m"]);
        let b = profile(&["b@m", "c@m"]);

        let forward = compute_diff(&a, &b, DiffOptions::FULL);
        let backward = compute_diff(&b, &a, DiffOptions::FULL);

        let mirrored: BTreeSet<(String, DiffOp)> = forward.scopes[0]
            .items
            .iter()
            .map(|i| (i.name.clone(), i.op.inverse()))
            .collect();
        let reverse: BTreeSet<(String, DiffOp)> = backward.scopes[0]
            .items
            .iter()
            .map(|i| (i.name.clone(), i.op))
            .collect();
        assert_eq!(mirrored, reverse);
    }

    #[test]
    fn test_identical_is_empty() {
        let a = profile(&["a@m"]);
        assert!(compute_diff(&a, &a.clone(), DiffOptions::FULL).is_empty());
    }

    #[test]
    fn test_description_change_reported_once() {
        let mut a = profile(&[]);
        a.scopes.insert(Scope::Project, ScopeContent::default());
        let mut b = a.clone();
        b.description = Some("new".into());

        let diff = compute_diff(&a, &b, DiffOptions::FULL);
        assert!(diff.scopes.is_empty());
        assert_eq!(diff.description_change.unwrap().new.as_deref(), Some("new"));
        assert!(compute_diff(&a, &b, DiffOptions::DRIFT).is_empty());
    }

    #[test]
    fn test_marketplaces_excluded_from_drift() {
        let saved = profile(&["a@m"]);
        let mut live = saved.clone();
        live.marketplaces.insert("someone/unknown".into());
        assert!(drift_diff(&saved, &live).is_empty());

        live.scopes.get_mut(&Scope::User).unwrap().plugins.insert("extra@m".into());
        let drift = drift_diff(&saved, &live);
        assert_eq!(drift.item_count(), 1);
        assert_eq!(drift.scopes[0].items[0].op, DiffOp::Added);
    }

    #[test]
    fn test_plan_never_removes_marketplaces() {
        let mut desired = profile(&[]);
        desired.marketplaces.insert("acme/new".into());
        let mut live = profile(&[]);
        live.marketplaces.insert("acme/old".into());

        let plan = plan_diff(&desired, &live);
        let items = &plan.scope(Scope::User).unwrap().items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ItemKind::Marketplace);
        assert_eq!(items[0].op, DiffOp::Added);
    }

    #[test]
    fn test_secret_env_values_not_compared() {
        let mut desired = profile(&[]);
        let scope = desired.scopes.get_mut(&Scope::User).unwrap();
        scope.mcp_servers.insert("db".into(), server(&[]));
        scope
            .secret_keys
            .insert("db".into(), BTreeSet::from(["PG_PASSWORD".to_string()]));

        let mut live = profile(&[]);
        live.scopes
            .get_mut(&Scope::User)
            .unwrap()
            .mcp_servers
            .insert("db".into(), server(&[("PG_PASSWORD", "hunter2")]));

        assert!(plan_diff(&desired, &live).is_empty());
    }

    #[test]
    fn test_modified_server_carries_line_diff() {
        let mut a = profile(&[]);
        a.scopes
            .get_mut(&Scope::User)
            .unwrap()
            .mcp_servers
            .insert("db".into(), server(&[("MODE", "ro")]));
        let mut b = profile(&[]);
        b.scopes
            .get_mut(&Scope::User)
            .unwrap()
            .mcp_servers
            .insert("db".into(), server(&[("MODE", "rw")]));

        let diff = compute_diff(&a, &b, DiffOptions::FULL);
        let item = &diff.scopes[0].items[0];
        assert_eq!(item.op, DiffOp::Modified);
        let detail = item.detail.as_deref().unwrap();
        assert!(detail.contains("-") && detail.contains("\"ro\""));
        assert!(detail.contains("+") && detail.contains("\"rw\""));
    }
}
