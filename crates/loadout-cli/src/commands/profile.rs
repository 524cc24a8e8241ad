//! Profile library commands
//!
//! Handles: loadout list/show/create/clone/save/delete/restore/rename

use super::{disambiguate, Context};
use anyhow::Context as _;
use loadout_core::profile::{explicit_path, ProfileKind, ProfileLoader, ProfileSource};
use loadout_core::{Breadcrumbs, Profile, Reconciler, Scope};

pub fn list(ctx: &Context) -> anyhow::Result<()> {
    let profiles = ctx.store().list()?;
    if profiles.is_empty() {
        println!("No profiles found.");
        return Ok(());
    }

    println!("Profiles:");
    for p in profiles {
        let marker = match p.kind {
            ProfileKind::Custom => "",
            ProfileKind::Builtin => " (built-in)",
            ProfileKind::CustomizedBuiltin => " (built-in, customized)",
        };
        let desc = p.description.as_deref().unwrap_or("No description");
        println!("  {} [{}]{marker} - {desc}", p.rel_path, p.shape);
    }
    Ok(())
}

pub fn show(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let store = ctx.store();
    let host = ctx.host();
    let installer = ctx.installer(&host);
    let reconciler = Reconciler::new(&store, &host, &installer, ctx.paths.breadcrumb_file());
    let prepared = disambiguate(ctx, name, |n| reconciler.prepare(n))?;

    let profile = &prepared.loaded.profile;
    println!("Profile: {}", prepared.key);
    match &prepared.loaded.source {
        ProfileSource::Disk(path) => println!("File: {}", path.display()),
        ProfileSource::Builtin => println!("File: built-in"),
    }
    if let Some(desc) = &profile.description {
        println!("Description: {desc}");
    }
    println!("Shape: {}", profile.shape());
    if !profile.includes.is_empty() {
        println!("Includes: {}", profile.includes.join(", "));
    }
    for conflict in &prepared.conflicts {
        println!(
            "Conflict: MCP server '{}' from '{}' ignored, '{}' wins",
            conflict.server, conflict.ignored_from, conflict.kept_from
        );
    }

    println!("\n{}", serde_json::to_string_pretty(&prepared.resolved)?);
    Ok(())
}

pub fn create(
    ctx: &Context,
    name: &str,
    description: Option<String>,
    plugins: Vec<String>,
) -> anyhow::Result<()> {
    let mut profile = Profile::new(name);
    profile.description = description;
    profile.plugins = plugins;

    let path = ctx.store().create(&profile)?;
    println!("Created profile '{name}' at {}", path.display());
    Ok(())
}

pub fn clone(ctx: &Context, source: &str, target: &str) -> anyhow::Result<()> {
    let store = ctx.store();
    disambiguate(ctx, source, |n| store.clone_profile(n, target))?;
    println!("Cloned '{source}' to '{target}'.");
    Ok(())
}

pub fn save(ctx: &Context, name: &str, scopes: &[Scope]) -> anyhow::Result<()> {
    let store = ctx.store();
    let host = ctx.host();
    let installer = ctx.installer(&host);
    let reconciler = Reconciler::new(&store, &host, &installer, ctx.paths.breadcrumb_file());

    let (profile, path) = reconciler.save_snapshot(name, scopes)?;
    println!(
        "Saved {} profile '{name}' to {}",
        profile.shape(),
        path.display()
    );
    Ok(())
}

/// Stable key of the profile a name refers to
fn key_of(ctx: &Context, name: &str) -> anyhow::Result<String> {
    let store = ctx.store();
    let loaded = disambiguate(ctx, name, |n| store.load(n))?;
    Ok(store.key_of(&loaded))
}

fn update_breadcrumbs(ctx: &Context, edit: impl FnOnce(&mut Breadcrumbs) -> bool) -> anyhow::Result<()> {
    let mut crumbs = Breadcrumbs::load(&ctx.paths.breadcrumb_file())?;
    if edit(&mut crumbs) {
        crumbs.save().context("Failed to update breadcrumbs")?;
    }
    Ok(())
}

pub fn delete(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let key = key_of(ctx, name)?;
    if !ctx.confirm(&format!("Delete profile '{key}'?"))? {
        println!("Cancelled.");
        return Ok(());
    }

    ctx.store().delete(&explicit_path(&key))?;
    update_breadcrumbs(ctx, |crumbs| crumbs.remove_profile(&key))?;
    println!("Deleted profile: {key}");
    Ok(())
}

pub fn restore(ctx: &Context, name: &str) -> anyhow::Result<()> {
    if ctx.store().restore(name)? {
        println!("Restored built-in profile '{name}'.");
    } else {
        println!("Built-in profile '{name}' has no local changes.");
    }
    Ok(())
}

pub fn rename(ctx: &Context, old: &str, new: &str) -> anyhow::Result<()> {
    let key = key_of(ctx, old)?;
    ctx.store().rename(&explicit_path(&key), new)?;
    update_breadcrumbs(ctx, |crumbs| crumbs.rename_profile(&key, new))?;
    println!("Renamed '{key}' to '{new}'.");
    Ok(())
}
