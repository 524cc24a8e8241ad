//! Applying profiles to live configuration

pub mod engine;
pub mod hook;
pub mod installer;
pub mod options;
mod result;

pub use engine::{apply, detect_extras, load_live, plan, ApplyPlan};
pub use hook::run_hook;
pub use installer::{HostInstaller, InstallError, InstallOutcome, InstallResult, Installer};
pub use options::{ApplyOptions, EnvSecrets, ExtrasDecision, Progress, SecretSource};
pub use result::{ApplyResult, ItemError, PreservedItem};
