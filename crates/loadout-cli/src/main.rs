//! loadout CLI - profile manager for Claude Code configuration
//!
//! Provides `loadout apply`, `loadout diff`, `loadout status` and the
//! profile library commands.

mod commands;

use clap::{Parser, Subcommand};
use commands::Context;
use loadout_core::{LoadoutError, Scope};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Overrides the log filter (e.g. `LOADOUT_LOG=loadout_core=debug`)
const LOG_ENV: &str = "LOADOUT_LOG";

/// Exit status when a command failed after changing configuration
const EXIT_CHANGED: i32 = 2;

#[derive(Parser)]
#[command(name = "loadout")]
#[command(about = "loadout - profile manager for Claude Code configuration")]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Project directory (defaults to current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Confirm every prompt without asking
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List profiles
    List,
    /// Show a profile with its includes resolved
    Show {
        /// Profile name or relative path
        name: String,
    },
    /// Create an empty profile
    Create {
        /// Profile name
        name: String,
        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
        /// Plugin reference (plugin@marketplace), can be repeated
        #[arg(long = "plugin", value_name = "REF")]
        plugins: Vec<String>,
    },
    /// Copy a profile under a new name
    Clone {
        /// Profile to copy
        source: String,
        /// New profile name
        target: String,
    },
    /// Save live configuration as a profile
    Save {
        /// Profile name
        name: String,
        /// Scope to capture
        #[arg(long, default_value = "user", conflicts_with = "all_scopes")]
        scope: Scope,
        /// Capture every scope into a multi-scope profile
        #[arg(long)]
        all_scopes: bool,
    },
    /// Compare a profile with live configuration
    Diff {
        /// Profile name or relative path
        name: String,
        /// Target scope for flat profiles
        #[arg(long, default_value = "user")]
        scope: Scope,
    },
    /// Apply a profile to live configuration
    Apply(commands::apply::ApplyArgs),
    /// Show which profiles are applied here and whether they drifted
    Status,
    /// Remove enabled plugins that are no longer installed
    Clean {
        /// Only clean this scope
        #[arg(long)]
        scope: Option<Scope>,
        /// List orphans without removing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Uninstall everything a profile declares
    Reset {
        /// Profile name or relative path
        name: String,
        /// Target scope for flat profiles
        #[arg(long, default_value = "user")]
        scope: Scope,
    },
    /// Delete a custom profile
    Delete {
        /// Profile name or relative path
        name: String,
    },
    /// Drop local changes to a built-in profile
    Restore {
        /// Built-in profile name
        name: String,
    },
    /// Rename a custom profile
    Rename {
        /// Current name or relative path
        old: String,
        /// New name
        new: String,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::load(cli.project_dir, cli.yes)?;

    match cli.command {
        Commands::List => commands::profile::list(&ctx),
        Commands::Show { name } => commands::profile::show(&ctx, &name),
        Commands::Create {
            name,
            description,
            plugins,
        } => commands::profile::create(&ctx, &name, description, plugins),
        Commands::Clone { source, target } => commands::profile::clone(&ctx, &source, &target),
        Commands::Save {
            name,
            scope,
            all_scopes,
        } => {
            let scopes = if all_scopes {
                Scope::ALL.to_vec()
            } else {
                vec![scope]
            };
            commands::profile::save(&ctx, &name, &scopes)
        }
        Commands::Diff { name, scope } => commands::apply::diff(&ctx, &name, scope),
        Commands::Apply(args) => commands::apply::apply(&ctx, &args),
        Commands::Status => commands::status::status(&ctx),
        Commands::Clean { scope, dry_run } => commands::status::clean(&ctx, scope, dry_run),
        Commands::Reset { name, scope } => commands::apply::reset(&ctx, &name, scope),
        Commands::Delete { name } => commands::profile::delete(&ctx, &name),
        Commands::Restore { name } => commands::profile::restore(&ctx, &name),
        Commands::Rename { old, new } => commands::profile::rename(&ctx, &old, &new),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        std::process::exit(report(&e));
    }
}

/// Print a failed command's error and pick its exit status
fn report(err: &anyhow::Error) -> i32 {
    let Some(loadout) = err.chain().find_map(|c| c.downcast_ref::<LoadoutError>()) else {
        eprintln!("Error: {err:#}");
        return 1;
    };

    eprintln!("Error [{}]: {err:#}", loadout.code());
    if loadout.is_pre_mutation() {
        1
    } else {
        EXIT_CHANGED
    }
}
