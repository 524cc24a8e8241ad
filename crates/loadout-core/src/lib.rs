//! Loadout Core - profile reconciliation engine
//!
//! This crate provides the profile model, stack (include) resolution,
//! the diff engine, the apply engine, profile name disambiguation and
//! breadcrumb-based drift tracking.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

pub mod apply;
pub mod breadcrumb;
pub mod clean;
pub mod config;
pub mod diff;
pub mod error;
pub mod profile;
pub mod reconcile;
pub mod settings;
pub mod util;

pub use loadout_scanner;
pub use loadout_scanner::{ExtensionCategory, Scope};

pub use apply::{ApplyOptions, ApplyResult, Installer};
pub use breadcrumb::Breadcrumbs;
pub use config::{LoadoutConfig, Paths};
pub use diff::ProfileDiff;
pub use error::{LoadoutError, LoadoutResult};
pub use profile::Profile;
pub use reconcile::Reconciler;
pub use settings::{HostSettings, LiveSettings, ScopeState};
