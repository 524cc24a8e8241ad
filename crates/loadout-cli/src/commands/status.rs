//! Drift status and orphan cleanup
//!
//! Handles: loadout status/clean

use super::Context;
use loadout_core::clean::{find_orphans, remove_orphans};
use loadout_core::diff::{format_diff_terminal, DiffView};
use loadout_core::{Reconciler, Scope};
use std::collections::BTreeSet;

pub fn status(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store();
    let host = ctx.host();
    let installer = ctx.installer(&host);
    let reconciler = Reconciler::new(&store, &host, &installer, ctx.paths.breadcrumb_file());

    let drift = reconciler.drift()?;
    if drift.is_empty() {
        println!("No profile applied here.");
        return Ok(());
    }

    println!("Applied profiles:");
    for (scope, status) in &drift {
        let state = match (&status.error, status.modified) {
            (Some(error), _) => format!("cannot check: {error}"),
            (None, true) => "modified".to_string(),
            (None, false) => "in sync".to_string(),
        };
        println!(
            "  {:<8} {} (applied {}) - {state}",
            scope.to_string(),
            status.profile_name,
            status.applied_at.format("%Y-%m-%d %H:%M")
        );
    }

    // Scopes of one profile share a diff; print it once
    let mut shown = BTreeSet::new();
    for status in drift.values() {
        if let (true, Some(diff)) = (status.modified, &status.diff) {
            if shown.insert(status.profile_name.as_str()) {
                println!();
                print!("{}", format_diff_terminal(diff, DiffView::Drift));
            }
        }
    }
    Ok(())
}

pub fn clean(ctx: &Context, scope: Option<Scope>, dry_run: bool) -> anyhow::Result<()> {
    let host = ctx.host();
    let scopes = scope.map_or_else(|| Scope::ALL.to_vec(), |s| vec![s]);

    let orphans = find_orphans(&host, &scopes)?;
    if orphans.is_empty() {
        println!("No orphaned plugins found.");
        return Ok(());
    }

    println!("Orphaned plugins:");
    for orphan in &orphans {
        println!("  [{}] {} ({})", orphan.scope, orphan.reference, orphan.reason);
    }

    if dry_run {
        println!("\nDry run - no changes made.");
        return Ok(());
    }
    if !ctx.confirm(&format!("\nRemove {} entries?", orphans.len()))? {
        println!("Cancelled.");
        return Ok(());
    }

    let removed = remove_orphans(&host, &orphans)?;
    println!("Removed {removed} orphaned plugin entries.");
    Ok(())
}
