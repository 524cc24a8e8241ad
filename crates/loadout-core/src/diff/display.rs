//! Diff formatting for terminal review

use super::compute::group_by_op;
use super::types::{DiffOp, ProfileDiff};
use std::fmt::Write;

/// How the two sides of a diff are described to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffView {
    /// Saved profile against live state
    Drift,
    /// Changes an apply would make
    Plan,
}

impl DiffView {
    fn heading(self, op: DiffOp) -> &'static str {
        match (self, op) {
            (Self::Drift, DiffOp::Removed) => "Missing from live config",
            (Self::Drift, DiffOp::Added) => "Not in profile",
            (Self::Plan, DiffOp::Removed) => "Remove",
            (Self::Plan, DiffOp::Added) => "Install",
            (_, DiffOp::Modified) => "Changed",
        }
    }
}

fn sign(op: DiffOp) -> char {
    match op {
        DiffOp::Removed => '-',
        DiffOp::Modified => '~',
        DiffOp::Added => '+',
    }
}

/// Format a diff for terminal display
#[must_use]
pub fn format_diff_terminal(diff: &ProfileDiff, view: DiffView) -> String {
    let mut output = String::new();

    if diff.is_empty() {
        let _ = writeln!(output, "'{}': no differences", diff.profile_name);
        return output;
    }

    let _ = writeln!(output, "=== {} ===", diff.profile_name);
    if let Some(change) = &diff.description_change {
        let _ = writeln!(
            output,
            "Description: {:?} -> {:?}",
            change.old.as_deref().unwrap_or(""),
            change.new.as_deref().unwrap_or("")
        );
    }

    for scope in &diff.scopes {
        let _ = writeln!(output);
        let _ = writeln!(output, "[{}]", scope.scope);
        for (op, items) in group_by_op(scope) {
            let _ = writeln!(output, "  {}:", view.heading(op));
            for item in items {
                let _ = writeln!(output, "    {} {} {}", sign(op), item.kind, item.name);
                if let Some(detail) = &item.detail {
                    for line in detail.lines() {
                        let _ = writeln!(output, "        {line}");
                    }
                }
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::types::{DiffItem, ItemKind, ScopeDiff};
    use loadout_scanner::Scope;

    fn item(name: &str, op: DiffOp) -> DiffItem {
        DiffItem {
            kind: ItemKind::Plugin,
            name: name.into(),
            op,
            detail: None,
        }
    }

    #[test]
    fn test_removed_listed_before_added() {
        let diff = ProfileDiff {
            profile_name: "web".into(),
            description_change: None,
            scopes: vec![ScopeDiff {
                scope: Scope::Project,
                items: vec![item("a@m", DiffOp::Removed), item("c@m", DiffOp::Added)],
            }],
        };

        let text = format_diff_terminal(&diff, DiffView::Plan);
        assert!(text.contains("[project]"));
        let remove = text.find("Remove:").unwrap();
        let install = text.find("Install:").unwrap();
        assert!(remove < install);
        assert!(text.contains("- plugin a@m"));
        assert!(text.contains("+ plugin c@m"));
    }

    #[test]
    fn test_empty_diff_message() {
        let diff = ProfileDiff {
            profile_name: "web".into(),
            description_change: None,
            scopes: Vec::new(),
        };
        assert!(format_diff_terminal(&diff, DiffView::Drift).contains("no differences"));
    }
}
