use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The two real configuration roots Cursor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    /// Application settings directory (e.g. ~/.config/Cursor)
    Primary,
    /// Dotfile directory (~/.cursor)
    Secondary,
}

impl RootKind {
    /// Both kinds, in the order they are repointed
    pub fn all() -> [RootKind; 2] {
        [RootKind::Primary, RootKind::Secondary]
    }

    /// Directory name of this kind inside a profile snapshot
    pub fn dir_name(&self) -> &'static str {
        match self {
            RootKind::Primary => "primary",
            RootKind::Secondary => "secondary",
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            RootKind::Primary => "Application settings",
            RootKind::Secondary => "Dotfiles (~/.cursor)",
        }
    }
}

impl FromStr for RootKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(RootKind::Primary),
            "secondary" => Ok(RootKind::Secondary),
            _ => Err(format!("Unknown root kind: {}", s)),
        }
    }
}
