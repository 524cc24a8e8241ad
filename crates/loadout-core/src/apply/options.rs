//! Apply options

use crate::diff::{DiffOp, ItemKind};
use loadout_scanner::Scope;

const DEFAULT_CONCURRENCY: usize = 4;

/// What to do with live user-scope items a multi-scope profile does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtrasDecision {
    /// No decision yet; apply stops if extras exist
    #[default]
    Undecided,
    /// Leave extras installed
    Keep,
    /// Remove extras so user scope matches the profile
    Replace,
}

/// Progress report for one completed unit of work
#[derive(Debug, Clone)]
pub struct Progress<'a> {
    pub scope: Scope,
    pub kind: ItemKind,
    pub name: &'a str,
    pub op: DiffOp,
    pub ok: bool,
    /// Units finished so far in this scope
    pub done: usize,
    /// Units scheduled in this scope
    pub total: usize,
}

/// Where secret values for MCP servers come from
pub trait SecretSource: Sync {
    /// Value of a secret, if available
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads secrets from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

static ENV_SECRETS: EnvSecrets = EnvSecrets;

/// Callback invoked after each unit of work
pub type ProgressFn<'a> = &'a (dyn Fn(&Progress<'_>) + Sync);

/// Options controlling an apply
#[derive(Clone, Copy)]
pub struct ApplyOptions<'a> {
    /// Target scope for flat profiles
    pub scope: Scope,
    /// Make user scope match the profile exactly
    pub replace: bool,
    /// Reinstall plugins that are already present
    pub reinstall: bool,
    /// Parallel plugin operations per scope; the installer may set a lower cap
    pub concurrency: usize,
    pub extras: ExtrasDecision,
    /// The profile's post-apply hook was confirmed (or comes from a built-in)
    pub hook_approved: bool,
    pub secrets: &'a dyn SecretSource,
    pub progress: Option<ProgressFn<'a>>,
}

impl<'a> ApplyOptions<'a> {
    /// Additive apply to one scope with default settings
    #[must_use]
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            replace: false,
            reinstall: false,
            concurrency: DEFAULT_CONCURRENCY,
            extras: ExtrasDecision::Undecided,
            hook_approved: false,
            secrets: &ENV_SECRETS,
            progress: None,
        }
    }

    /// Whether live items missing from the profile may be removed at `scope`
    #[must_use]
    pub fn allows_removal(&self, scope: Scope) -> bool {
        scope != Scope::User || self.replace || self.extras == ExtrasDecision::Replace
    }

    pub(crate) fn report(&self, progress: &Progress<'_>) {
        if let Some(callback) = self.progress {
            callback(progress);
        }
    }
}

impl std::fmt::Debug for ApplyOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyOptions")
            .field("scope", &self.scope)
            .field("replace", &self.replace)
            .field("reinstall", &self.reinstall)
            .field("concurrency", &self.concurrency)
            .field("extras", &self.extras)
            .field("hook_approved", &self.hook_approved)
            .finish_non_exhaustive()
    }
}
