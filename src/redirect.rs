//! Redirection of the real configuration roots.
//!
//! This module implements the core mechanism of `cursorprof`: each real root
//! (e.g. `~/.cursor`) is replaced by a directory symlink into
//! `<store>/<profile>/<kind>`. It handles:
//! - Classifying what currently sits at a real root.
//! - Deriving the active profile from both links, never from cached state.
//! - Repointing one root at a time, each swap atomic on its own.
//! - Moving an unmanaged real directory aside before the first redirection.

use chrono::Utc;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ProfileError, ProfileResult};
use crate::paths::Paths;
use crate::roots::RootKind;

/// Number of adopted directories to keep per root kind
const MAX_BACKUPS: usize = 10;

/// What sits at a real root path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootStatus {
    Missing,
    Directory,
    Symlink { target: PathBuf },
    BrokenSymlink { target: PathBuf },
}

impl RootStatus {
    pub fn detect(path: &Path) -> Self {
        // Check if it's a symlink first
        if let Ok(target) = fs::read_link(path) {
            if path.exists() {
                Self::Symlink { target }
            } else {
                Self::BrokenSymlink { target }
            }
        } else if path.exists() {
            Self::Directory
        } else {
            Self::Missing
        }
    }
}

/// Where a real root points, in profile terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pointer {
    /// Nothing at the root
    Missing,
    /// A real, unmanaged directory
    Unmanaged,
    /// Symlink that is not `<store>/<name>/<kind>`
    Foreign(PathBuf),
    /// Symlink into the store
    Profile(String),
}

impl Pointer {
    pub fn read(paths: &Paths, kind: RootKind) -> Self {
        let link = paths.real_root(kind);
        match RootStatus::detect(link) {
            RootStatus::Missing => Pointer::Missing,
            RootStatus::Directory => Pointer::Unmanaged,
            RootStatus::Symlink { target } | RootStatus::BrokenSymlink { target } => {
                let absolute = absolutize(link, &target);
                match profile_of(paths, kind, &absolute) {
                    Some(name) => Pointer::Profile(name),
                    None => Pointer::Foreign(absolute),
                }
            }
        }
    }

    pub fn profile(&self) -> Option<&str> {
        match self {
            Pointer::Profile(name) => Some(name),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Pointer::Missing => "(missing)".to_string(),
            Pointer::Unmanaged => "(unmanaged directory)".to_string(),
            Pointer::Foreign(target) => target.display().to_string(),
            Pointer::Profile(name) => name.clone(),
        }
    }
}

/// Resolve a possibly-relative link target against the link's parent
fn absolutize(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return normalize(target);
    }
    let base = link.parent().unwrap_or(Path::new(""));
    normalize(&base.join(target))
}

/// Lexically fold `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// `<store>/<name>/<kind>` -> `name`
fn profile_of(paths: &Paths, kind: RootKind, target: &Path) -> Option<String> {
    let rest = target.strip_prefix(&paths.store_root).ok()?;
    let mut parts = rest.components();
    let name = parts.next()?.as_os_str().to_str()?.to_string();
    let dir = parts.next()?.as_os_str().to_str()?;
    if dir != kind.dir_name() || parts.next().is_some() {
        return None;
    }
    Some(name)
}

/// The active profile, derived from both redirections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirection {
    /// Neither root points into the store
    Unset,
    /// Both roots point at this existing profile
    Active(String),
    /// Roots disagree; only legal mid-switch
    Inconsistent { primary: Pointer, secondary: Pointer },
    /// Both roots agree on a profile that no longer exists
    Dangling(String),
}

impl Redirection {
    pub fn inspect(paths: &Paths) -> Self {
        let primary = Pointer::read(paths, RootKind::Primary);
        let secondary = Pointer::read(paths, RootKind::Secondary);

        match (primary.profile(), secondary.profile()) {
            (None, None) => Redirection::Unset,
            (Some(a), Some(b)) if a == b => {
                if paths.profile_dir(a).is_dir() {
                    Redirection::Active(a.to_string())
                } else {
                    Redirection::Dangling(a.to_string())
                }
            }
            _ => Redirection::Inconsistent { primary, secondary },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Redirection::Unset => "unset",
            Redirection::Active(_) => "active",
            Redirection::Inconsistent { .. } => "inconsistent",
            Redirection::Dangling(_) => "dangling",
        }
    }

    pub fn active(&self) -> Option<&str> {
        match self {
            Redirection::Active(name) => Some(name),
            _ => None,
        }
    }

    /// Does either root reference `name`?
    pub fn references(&self, name: &str) -> bool {
        match self {
            Redirection::Unset => false,
            Redirection::Active(n) | Redirection::Dangling(n) => n == name,
            Redirection::Inconsistent { primary, secondary } => {
                primary.profile() == Some(name) || secondary.profile() == Some(name)
            }
        }
    }

    /// Turn a detected bad state into its error
    pub fn check(&self) -> ProfileResult<()> {
        match self {
            Redirection::Inconsistent { primary, secondary } => {
                Err(ProfileError::InconsistentRedirection {
                    primary: primary.describe(),
                    secondary: secondary.describe(),
                })
            }
            Redirection::Dangling(name) => Err(ProfileError::DanglingRedirection(name.clone())),
            Redirection::Unset | Redirection::Active(_) => Ok(()),
        }
    }
}

/// Point one real root at `target`.
///
/// An existing symlink is swapped by renaming a freshly built sibling link over
/// it. An unmanaged directory is moved to the backups dir first. A symlink that
/// leads outside the store is refused.
pub fn repoint(paths: &Paths, kind: RootKind, target: &Path) -> ProfileResult<()> {
    let link = paths.real_root(kind);

    match RootStatus::detect(link) {
        RootStatus::Missing => make_symlink(target, link)?,
        RootStatus::Directory => {
            let backup = backup_root(link, &paths.backups_dir, kind)?;
            warn!(
                root = %link.display(),
                backup = %backup.display(),
                "moved unmanaged configuration directory aside"
            );
            make_symlink(target, link)?;
        }
        RootStatus::Symlink { target: current } | RootStatus::BrokenSymlink { target: current } => {
            let absolute = absolutize(link, &current);
            if profile_of(paths, kind, &absolute).is_none() {
                return Err(ProfileError::UnmanagedRoot {
                    path: link.to_path_buf(),
                    target: absolute,
                });
            }
            swap_symlink(target, link)?;
        }
    }

    debug!(root = %link.display(), target = %target.display(), "root repointed");
    Ok(())
}

fn swap_symlink(target: &Path, link: &Path) -> ProfileResult<()> {
    let mut staged = link.as_os_str().to_os_string();
    staged.push(".cursorprof-swap");
    let staged = PathBuf::from(staged);

    if fs::symlink_metadata(&staged).is_ok() {
        remove_link(&staged)?;
    }
    make_symlink(target, &staged)?;

    #[cfg(windows)]
    remove_link(link)?;

    fs::rename(&staged, link).map_err(|e| ProfileError::io(link, e))
}

fn make_symlink(target: &Path, link: &Path) -> ProfileResult<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).map_err(|e| ProfileError::io(parent, e))?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link).map_err(|e| ProfileError::io(link, e))?;

    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(target, link).map_err(|e| ProfileError::io(link, e))?;

    Ok(())
}

fn remove_link(link: &Path) -> ProfileResult<()> {
    // Directory symlinks on Windows are removed with remove_dir
    #[cfg(windows)]
    let result = fs::remove_dir(link).or_else(|_| fs::remove_file(link));
    #[cfg(not(windows))]
    let result = fs::remove_file(link);

    result.map_err(|e| ProfileError::io(link, e))
}

/// Move an unmanaged root into the backups dir, returning its new path
fn backup_root(path: &Path, backups_dir: &Path, kind: RootKind) -> ProfileResult<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f").to_string();
    let backup_path = backups_dir.join(format!("{}.{}.bak", kind.dir_name(), timestamp));

    crate::fs_utils::move_dir(path, &backup_path)?;
    cleanup_old_backups(backups_dir, kind.dir_name())?;

    Ok(backup_path)
}

fn cleanup_old_backups(backups_dir: &Path, name_prefix: &str) -> ProfileResult<()> {
    let entries = fs::read_dir(backups_dir).map_err(|e| ProfileError::io(backups_dir, e))?;
    let mut backups: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(name_prefix) && n.ends_with(".bak"))
        })
        .collect();

    if backups.len() <= MAX_BACKUPS {
        return Ok(());
    }

    // Timestamped names sort oldest first
    backups.sort_by_key(|b| b.file_name());

    let to_remove = backups.len() - MAX_BACKUPS;
    for entry in backups.iter().take(to_remove) {
        let path = entry.path();
        fs::remove_dir_all(&path).map_err(|e| ProfileError::io(&path, e))?;
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_paths;
    use tempfile::TempDir;

    fn make_profile(paths: &Paths, name: &str) {
        for kind in RootKind::all() {
            fs::create_dir_all(paths.snapshot(name, kind)).unwrap();
        }
    }

    #[test]
    fn test_root_status_detect() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);

        assert_eq!(RootStatus::detect(&paths.secondary_root), RootStatus::Missing);

        fs::create_dir_all(&paths.secondary_root).unwrap();
        assert_eq!(RootStatus::detect(&paths.secondary_root), RootStatus::Directory);

        fs::remove_dir(&paths.secondary_root).unwrap();
        make_symlink(&temp.path().join("nowhere"), &paths.secondary_root).unwrap();
        assert!(matches!(
            RootStatus::detect(&paths.secondary_root),
            RootStatus::BrokenSymlink { .. }
        ));
    }

    #[test]
    fn test_unset_when_nothing_redirected() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        assert_eq!(Redirection::inspect(&paths), Redirection::Unset);
    }

    #[test]
    fn test_repoint_both_makes_active() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        make_profile(&paths, "work");

        for kind in RootKind::all() {
            repoint(&paths, kind, &paths.snapshot("work", kind)).unwrap();
        }

        assert_eq!(Redirection::inspect(&paths), Redirection::Active("work".into()));
    }

    #[test]
    fn test_half_switch_is_inconsistent() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        make_profile(&paths, "work");
        make_profile(&paths, "personal");

        for kind in RootKind::all() {
            repoint(&paths, kind, &paths.snapshot("work", kind)).unwrap();
        }
        repoint(&paths, RootKind::Primary, &paths.snapshot("personal", RootKind::Primary)).unwrap();

        let state = Redirection::inspect(&paths);
        assert!(matches!(state, Redirection::Inconsistent { .. }));
        assert!(state.references("work"));
        assert!(state.references("personal"));
        assert!(matches!(
            state.check(),
            Err(ProfileError::InconsistentRedirection { .. })
        ));
    }

    #[test]
    fn test_dangling_detected() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        make_profile(&paths, "gone");
        for kind in RootKind::all() {
            repoint(&paths, kind, &paths.snapshot("gone", kind)).unwrap();
        }
        fs::remove_dir_all(paths.profile_dir("gone")).unwrap();

        let state = Redirection::inspect(&paths);
        assert_eq!(state, Redirection::Dangling("gone".into()));
        assert!(matches!(state.check(), Err(ProfileError::DanglingRedirection(_))));
    }

    #[test]
    fn test_relative_link_target_is_understood() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        make_profile(&paths, "rel");

        // ~/.cursor -> .config/CursorProfiles/rel/secondary
        make_symlink(
            Path::new(".config/CursorProfiles/rel/secondary"),
            &paths.secondary_root,
        )
        .unwrap();
        assert_eq!(
            Pointer::read(&paths, RootKind::Secondary),
            Pointer::Profile("rel".into())
        );
    }

    #[test]
    fn test_unmanaged_directory_is_backed_up() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        make_profile(&paths, "work");
        fs::create_dir_all(&paths.secondary_root).unwrap();
        fs::write(paths.secondary_root.join("mcp.json"), "{}").unwrap();

        repoint(&paths, RootKind::Secondary, &paths.snapshot("work", RootKind::Secondary)).unwrap();

        assert_eq!(
            Pointer::read(&paths, RootKind::Secondary),
            Pointer::Profile("work".into())
        );
        let backups: Vec<_> = fs::read_dir(&paths.backups_dir).unwrap().collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_foreign_symlink_refused() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        make_profile(&paths, "work");
        let elsewhere = temp.path().join("elsewhere");
        fs::create_dir_all(&elsewhere).unwrap();
        make_symlink(&elsewhere, &paths.secondary_root).unwrap();

        let result = repoint(&paths, RootKind::Secondary, &paths.snapshot("work", RootKind::Secondary));
        assert!(matches!(result, Err(ProfileError::UnmanagedRoot { .. })));
        assert_eq!(fs::read_link(&paths.secondary_root).unwrap(), elsewhere);
    }
}
