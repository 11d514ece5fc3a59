use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ProfileError, ProfileResult};
use crate::roots::RootKind;

/// Host platforms with a known Cursor layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    /// Platform this binary was compiled for
    pub fn current() -> ProfileResult<Self> {
        std::env::consts::OS.parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        }
    }
}

impl FromStr for Platform {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "macos" | "darwin" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            other => Err(ProfileError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All computed paths used by cursorprof
#[derive(Debug, Clone)]
pub struct Paths {
    pub platform: Platform,
    /// Where Cursor keeps its application settings (e.g. ~/.config/Cursor)
    pub primary_root: PathBuf,
    /// ~/.cursor
    pub secondary_root: PathBuf,
    /// Where profile snapshots live (e.g. ~/.config/CursorProfiles)
    pub store_root: PathBuf,
    /// ~/.cursor-profiles
    pub state_dir: PathBuf,
    /// ~/.cursor-profiles/backups
    pub backups_dir: PathBuf,
    /// ~/.cursor-profiles/identities.json
    pub identities_file: PathBuf,
    /// ~/.cursor-profiles/store.lock
    pub lock_file: PathBuf,
}

/// Compute every root for `platform` under `home`.
///
/// Pure: touches nothing on disk.
pub fn resolve_roots(platform: Platform, home: &Path) -> Paths {
    let app_data = match platform {
        Platform::MacOs => home.join("Library").join("Application Support"),
        Platform::Windows => home.join("AppData").join("Roaming"),
        Platform::Linux => home.join(".config"),
    };
    let state_dir = home.join(".cursor-profiles");

    Paths {
        platform,
        primary_root: app_data.join("Cursor"),
        secondary_root: home.join(".cursor"),
        store_root: app_data.join("CursorProfiles"),
        backups_dir: state_dir.join("backups"),
        identities_file: state_dir.join("identities.json"),
        lock_file: state_dir.join("store.lock"),
        state_dir,
    }
}

impl Paths {
    /// Get the path to a specific profile directory
    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.store_root.join(name)
    }

    /// Get the snapshot a real root is redirected to for a profile
    pub fn snapshot(&self, name: &str, kind: RootKind) -> PathBuf {
        self.profile_dir(name).join(kind.dir_name())
    }

    /// The real configuration root of a kind
    pub fn real_root(&self, kind: RootKind) -> &Path {
        match kind {
            RootKind::Primary => &self.primary_root,
            RootKind::Secondary => &self.secondary_root,
        }
    }

    /// Get the path to a specific profile's mcp.json
    pub fn profile_manifest(&self, name: &str) -> PathBuf {
        self.snapshot(name, RootKind::Secondary).join("mcp.json")
    }

    /// Check if a path is within the profile store
    pub fn is_in_store(&self, path: &Path) -> bool {
        path.starts_with(&self.store_root)
    }

    /// Ensure the store and state directories exist
    pub fn ensure_dirs(&self) -> ProfileResult<()> {
        for dir in [&self.store_root, &self.state_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ProfileError::io(dir, e))?;
        }
        Ok(())
    }
}
