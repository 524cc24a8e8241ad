//! Shared types for the loadout scanner

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configuration scope of a Claude Code installation
///
/// The derived ordering (`User < Project < Local`) is the order scopes are
/// applied in. Use [`Scope::precedence`] to decide which scope wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// User-global (~/.claude/settings.json, ~/.claude.json)
    User,
    /// Shared project (.claude/settings.json, .mcp.json)
    Project,
    /// Personal project overrides (.claude/settings.local.json) - gitignored
    Local,
}

impl Scope {
    /// All scopes in apply order
    pub const ALL: [Scope; 3] = [Scope::User, Scope::Project, Scope::Local];

    /// Precedence order (higher = takes priority when deciding the active profile)
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            Self::Local => 3,
            Self::Project => 2,
            Self::User => 1,
        }
    }

    /// Whether this scope is tied to a project directory
    #[must_use]
    pub fn is_project_bound(self) -> bool {
        !matches!(self, Self::User)
    }

    /// Lowercase name as used in settings files and on the command line
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "global" => Ok(Self::User),
            "project" => Ok(Self::Project),
            "local" => Ok(Self::Local),
            _ => Err(format!("Invalid scope: {s}. Use 'user', 'project', or 'local'.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_precedence() {
        assert!(Scope::Local.precedence() > Scope::Project.precedence());
        assert!(Scope::Project.precedence() > Scope::User.precedence());
    }

    #[test]
    fn test_scope_apply_order() {
        let mut scopes = vec![Scope::Local, Scope::User, Scope::Project];
        scopes.sort();
        assert_eq!(scopes, Scope::ALL.to_vec());
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!(Scope::from_str("user").unwrap(), Scope::User);
        assert_eq!(Scope::from_str("global").unwrap(), Scope::User);
        assert_eq!(Scope::from_str("Project").unwrap(), Scope::Project);
        assert_eq!(Scope::from_str("local").unwrap(), Scope::Local);
        assert!(Scope::from_str("managed").is_err());
    }

    #[test]
    fn test_scope_serde_lowercase() {
        let json = serde_json::to_string(&Scope::Local).unwrap();
        assert_eq!(json, "\"local\"");
        let scope: Scope = serde_json::from_str("\"project\"").unwrap();
        assert_eq!(scope, Scope::Project);
    }
}
