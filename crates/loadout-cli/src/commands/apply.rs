//! Diff, apply and reset
//!
//! Handles: loadout diff/apply/reset

use super::prompt::{self, ExtrasChoice};
use super::{disambiguate, Context};
use anyhow::bail;
use clap::Args;
use loadout_core::apply::{ApplyOptions, ApplyResult, ExtrasDecision, Progress};
use loadout_core::diff::{format_diff_terminal, DiffOp, DiffView, ProfileDiff};
use loadout_core::profile::PostApplyHook;
use loadout_core::reconcile::Prepared;
use loadout_core::{LoadoutError, Reconciler, Scope};

/// Arguments for `loadout apply`
#[derive(Args)]
pub struct ApplyArgs {
    /// Profile name or relative path
    pub name: String,

    /// Target scope for flat profiles
    #[arg(long, default_value = "user")]
    pub scope: Scope,

    /// Make user scope match the profile exactly
    #[arg(long)]
    pub replace: bool,

    /// Reinstall plugins that are already installed
    #[arg(long)]
    pub reinstall: bool,

    /// Show the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

fn prepare(ctx: &Context, reconciler: &Reconciler<'_>, name: &str) -> anyhow::Result<Prepared> {
    let prepared = disambiguate(ctx, name, |n| reconciler.prepare(n))?;
    for conflict in &prepared.conflicts {
        let scope = conflict.scope.map(|s| format!(" [{s}]")).unwrap_or_default();
        eprintln!(
            "Warning: MCP server '{}'{scope} differs between '{}' and '{}'; using '{}'",
            conflict.server, conflict.kept_from, conflict.ignored_from, conflict.kept_from
        );
    }
    Ok(prepared)
}

/// Drop removals the apply would not perform
fn visible_plan(diff: &ProfileDiff, options: &ApplyOptions<'_>) -> (ProfileDiff, usize) {
    let mut shown = diff.clone();
    let mut kept = 0;
    for scope in &mut shown.scopes {
        if options.allows_removal(scope.scope) {
            continue;
        }
        let before = scope.items.len();
        scope.items.retain(|i| i.op != DiffOp::Removed);
        kept += before - scope.items.len();
    }
    shown.scopes.retain(|s| !s.items.is_empty());
    (shown, kept)
}

pub fn diff(ctx: &Context, name: &str, scope: Scope) -> anyhow::Result<()> {
    let store = ctx.store();
    let host = ctx.host();
    let installer = ctx.installer(&host);
    let reconciler = Reconciler::new(&store, &host, &installer, ctx.paths.breadcrumb_file());

    let prepared = prepare(ctx, &reconciler, name)?;
    let diff = reconciler.compare(&prepared, scope)?;
    print!("{}", format_diff_terminal(&diff, DiffView::Drift));
    Ok(())
}

fn describe_hook(hook: &PostApplyHook) -> String {
    match (&hook.command, &hook.script) {
        (Some(command), _) => format!("command: {command}"),
        (None, Some(script)) => format!("script: {script}"),
        (None, None) => "nothing".to_string(),
    }
}

fn report_progress(progress: &Progress<'_>) {
    let verb = match (progress.op, progress.ok) {
        (DiffOp::Removed, true) => "removed",
        (_, true) => "installed",
        (DiffOp::Removed, false) => "failed to remove",
        (_, false) => "failed to install",
    };
    eprintln!(
        "[{}] {}/{} {verb} {} {}",
        progress.scope, progress.done, progress.total, progress.kind, progress.name
    );
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> anyhow::Result<()> {
    let store = ctx.store();
    let host = ctx.host();
    let installer = ctx.installer(&host);
    let reconciler = Reconciler::new(&store, &host, &installer, ctx.paths.breadcrumb_file());

    let prepared = prepare(ctx, &reconciler, &args.name)?;

    let mut options = ApplyOptions::new(args.scope);
    options.replace = args.replace;
    options.reinstall = args.reinstall;
    options.concurrency = ctx.config.concurrency;
    if ctx.interactive {
        options.progress = Some(&report_progress);
    }

    if !args.replace && ctx.interactive {
        let extras = reconciler.detect_extras(&prepared)?;
        if !extras.is_empty() {
            options.extras = match prompt::extras(&extras)? {
                ExtrasChoice::Keep => ExtrasDecision::Keep,
                ExtrasChoice::Replace => ExtrasDecision::Replace,
                ExtrasChoice::Cancel => {
                    println!("Cancelled.");
                    return Ok(());
                }
            };
        }
    }

    let plan = reconciler.plan(&prepared, args.scope)?;
    let (shown, kept) = visible_plan(&plan.diff, &options);
    let nothing_to_do = shown.is_empty() && !args.reinstall;
    if nothing_to_do {
        println!("'{}' is already up to date.", prepared.key);
    } else {
        print!("{}", format_diff_terminal(&shown, DiffView::Plan));
    }
    if kept > 0 {
        println!("Keeping {kept} user-scope item(s) not in the profile (use --replace to remove them).");
    }

    if args.dry_run {
        println!("\nDry run - no changes made.");
        return Ok(());
    }
    if !nothing_to_do && !ctx.confirm(&format!("\nApply profile '{}'?", prepared.key))? {
        println!("Cancelled.");
        return Ok(());
    }

    if prepared.needs_hook_approval() {
        if let Some(hook) = &prepared.resolved.post_apply {
            options.hook_approved = ctx.confirm(&format!(
                "Profile '{}' runs a post-apply hook ({}). Allow it?",
                prepared.key,
                describe_hook(hook)
            ))?;
        }
    }

    match reconciler.apply(&prepared, &options) {
        Ok(result) => {
            print_result(&prepared.key, &result);
            if !result.is_success() {
                bail!("{} item(s) failed", result.errors.len());
            }
            Ok(())
        }
        Err(LoadoutError::Hook {
            profile,
            message,
            result,
        }) => {
            print_result(&prepared.key, &result);
            Err(LoadoutError::Hook {
                profile,
                message,
                result,
            }
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn reset(ctx: &Context, name: &str, scope: Scope) -> anyhow::Result<()> {
    let store = ctx.store();
    let host = ctx.host();
    let installer = ctx.installer(&host);
    let reconciler = Reconciler::new(&store, &host, &installer, ctx.paths.breadcrumb_file());

    let prepared = prepare(ctx, &reconciler, name)?;
    let scopes = prepared.resolved.target_scopes(scope);
    let names: Vec<String> = scopes.iter().map(ToString::to_string).collect();
    if !ctx.confirm(&format!(
        "Uninstall everything '{}' declares from {}?",
        prepared.key,
        names.join(", ")
    ))? {
        println!("Cancelled.");
        return Ok(());
    }

    let result = reconciler.reset(&prepared, scope)?;
    println!(
        "Reset '{}': removed {} plugin(s), {} MCP server(s), {} extension(s).",
        prepared.key, result.plugins_removed, result.mcp_servers_removed, result.extensions_disabled
    );
    print_errors(&result);
    if !result.is_success() {
        bail!("{} item(s) failed", result.errors.len());
    }
    Ok(())
}

fn print_result(name: &str, result: &ApplyResult) {
    println!("\nApplied profile '{name}'.");
    println!(
        "  Plugins: {} installed, {} already present, {} removed",
        result.plugins_installed, result.plugins_already_present, result.plugins_removed
    );
    println!(
        "  MCP servers: {} installed, {} removed",
        result.mcp_servers_installed, result.mcp_servers_removed
    );
    if result.marketplaces_added > 0 {
        println!("  Marketplaces: {} added", result.marketplaces_added);
    }
    if result.extensions_enabled + result.extensions_disabled > 0 {
        println!(
            "  Extensions: {} enabled, {} disabled",
            result.extensions_enabled, result.extensions_disabled
        );
    }
    if !result.preserved.is_empty() {
        println!("  Kept {} item(s) not in the profile", result.preserved.len());
    }
    print_errors(result);
}

fn print_errors(result: &ApplyResult) {
    if result.errors.is_empty() {
        return;
    }
    println!("\nErrors:");
    for error in &result.errors {
        println!("  {error}");
    }
}
