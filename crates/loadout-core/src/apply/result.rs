//! Outcome of an apply

use crate::diff::{DiffOp, ItemKind};
use loadout_scanner::Scope;
use serde::Serialize;

/// Counts of what an apply changed, plus per-item failures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub plugins_installed: usize,
    pub plugins_already_present: usize,
    pub plugins_removed: usize,
    pub plugins_already_removed: usize,
    pub mcp_servers_installed: usize,
    pub mcp_servers_removed: usize,
    pub marketplaces_added: usize,
    pub extensions_enabled: usize,
    pub extensions_disabled: usize,
    /// Live items not in the profile that were left in place
    pub preserved: Vec<PreservedItem>,
    /// Items that could not be installed or removed
    pub errors: Vec<ItemError>,
}

/// An extra item kept by an additive apply
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PreservedItem {
    pub scope: Scope,
    pub kind: ItemKind,
    pub name: String,
}

/// Failure of a single install or removal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ItemError {
    pub scope: Scope,
    pub kind: ItemKind,
    pub name: String,
    pub op: DiffOp,
    pub message: String,
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.op {
            DiffOp::Added | DiffOp::Modified => "install",
            DiffOp::Removed => "remove",
        };
        write!(
            f,
            "[{}] failed to {verb} {} {}: {}",
            self.scope, self.kind, self.name, self.message
        )
    }
}

impl ApplyResult {
    /// Whether every item succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of changes made to the host
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.plugins_installed
            + self.plugins_removed
            + self.mcp_servers_installed
            + self.mcp_servers_removed
            + self.marketplaces_added
            + self.extensions_enabled
            + self.extensions_disabled
    }

    /// Put errors and preserved items in a stable order
    pub(crate) fn normalize(&mut self) {
        self.errors.sort();
        self.preserved.sort();
    }

    pub(crate) fn record_error(
        &mut self,
        scope: Scope,
        kind: ItemKind,
        name: &str,
        op: DiffOp,
        message: impl Into<String>,
    ) {
        let message = message.into();
        tracing::warn!(%scope, %kind, name, %message, "item failed");
        self.errors.push(ItemError {
            scope,
            kind,
            name: name.to_string(),
            op,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_sorted_independent_of_insertion_order() {
        let mut a = ApplyResult::default();
        a.record_error(Scope::User, ItemKind::Plugin, "z@m", DiffOp::Added, "boom");
        a.record_error(Scope::User, ItemKind::Plugin, "a@m", DiffOp::Added, "boom");
        a.normalize();

        let mut b = ApplyResult::default();
        b.record_error(Scope::User, ItemKind::Plugin, "a@m", DiffOp::Added, "boom");
        b.record_error(Scope::User, ItemKind::Plugin, "z@m", DiffOp::Added, "boom");
        b.normalize();

        assert_eq!(a, b);
        assert!(!a.is_success());
    }

    #[test]
    fn test_item_error_display() {
        let err = ItemError {
            scope: Scope::Project,
            kind: ItemKind::McpServer,
            name: "db".into(),
            op: DiffOp::Removed,
            message: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "[project] failed to remove MCP server db: permission denied"
        );
    }
}
