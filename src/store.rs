//! Core profile management logic.
//!
//! This module handles the "data model" of profiles:
//! - Validating profile names
//! - Listing profiles and deriving which one is active
//! - Creating profiles from the live roots or from another profile
//! - Renaming profiles, carrying redirections along
//! - Repointing both real roots at a profile
//!
//! Public operations guard on host liveness and take the store lock. The
//! `*_locked` variants expect the caller to hold a [`StoreLock`] already, so
//! the orchestrator can compose them into larger transactions.

use serde::Serialize;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ProfileError, ProfileResult};
use crate::fs_utils::copy_dir_recursive;
use crate::host::{ProcessInspector, ensure_host_stopped};
use crate::lock::StoreLock;
use crate::paths::Paths;
use crate::redirect::{Pointer, Redirection, repoint};
use crate::roots::RootKind;

const MAX_NAME_LEN: usize = 64;

/// One row of a store listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileEntry {
    pub name: String,
    pub is_active: bool,
    /// Referenced by one root but not the other
    pub inconsistent: bool,
}

/// All profiles plus the derived redirection state
#[derive(Debug, Clone)]
pub struct Listing {
    pub profiles: Vec<ProfileEntry>,
    pub redirection: Redirection,
}

impl Listing {
    pub fn active(&self) -> Option<&str> {
        self.redirection.active()
    }
}

/// Validate profile name
///
/// Allows ASCII letters, digits, dots, hyphens and underscores.
pub fn validate_profile_name(name: &str) -> ProfileResult<()> {
    let invalid = |reason: &str| ProfileError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid("name cannot be longer than 64 characters"));
    }

    if name == "." || name == ".." {
        return Err(invalid("name cannot be a relative path component"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(invalid("only letters, digits, '.', '-' and '_' are allowed"));
    }

    Ok(())
}

pub struct ProfileStore {
    paths: Paths,
    inspector: Arc<dyn ProcessInspector>,
    lock_timeout: Duration,
}

impl ProfileStore {
    pub fn new(paths: Paths, inspector: Arc<dyn ProcessInspector>, lock_timeout: Duration) -> Self {
        Self {
            paths,
            inspector,
            lock_timeout,
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Fail unless Cursor is known to be stopped
    pub fn guard(&self) -> ProfileResult<()> {
        ensure_host_stopped(self.inspector.as_ref())
    }

    pub fn lock(&self) -> ProfileResult<StoreLock> {
        StoreLock::acquire(&self.paths.lock_file, self.lock_timeout)
    }

    /// Check if a profile exists
    pub fn exists(&self, name: &str) -> bool {
        validate_profile_name(name).is_ok() && self.paths.profile_dir(name).is_dir()
    }

    /// Profile names in the store, sorted
    pub fn names(&self) -> ProfileResult<Vec<String>> {
        let root = &self.paths.store_root;
        let mut names = Vec::new();

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(ProfileError::io(root, err)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| ProfileError::io(root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    pub fn redirection(&self) -> Redirection {
        Redirection::inspect(&self.paths)
    }

    /// The active profile, or an error if the roots are in a bad state
    pub fn active(&self) -> ProfileResult<Option<String>> {
        let redirection = self.redirection();
        redirection.check()?;
        Ok(redirection.active().map(str::to_string))
    }

    /// List available profiles
    ///
    /// Disagreeing roots do not fail the listing; the profiles they reference
    /// are flagged `inconsistent`.
    pub fn list(&self) -> ProfileResult<Listing> {
        let redirection = self.redirection();
        let inconsistent = matches!(redirection, Redirection::Inconsistent { .. });

        let profiles = self
            .names()?
            .into_iter()
            .map(|name| ProfileEntry {
                is_active: redirection.active() == Some(name.as_str()),
                inconsistent: inconsistent && redirection.references(&name),
                name,
            })
            .collect();

        Ok(Listing {
            profiles,
            redirection,
        })
    }

    /// Create a profile from the live roots, or from `source`'s snapshot
    pub fn create(&self, name: &str, source: Option<&str>) -> ProfileResult<()> {
        validate_profile_name(name)?;
        self.guard()?;
        let lock = self.lock()?;
        self.create_locked(&lock, name, source)
    }

    pub fn create_locked(
        &self,
        _lock: &StoreLock,
        name: &str,
        source: Option<&str>,
    ) -> ProfileResult<()> {
        validate_profile_name(name)?;
        let base = match source {
            Some(source) => {
                validate_profile_name(source)?;
                if !self.exists(source) {
                    return Err(ProfileError::ProfileNotFound(source.to_string()));
                }
                Some(source.to_string())
            }
            // Default source is the active profile; only an unset store copies the live roots
            None => {
                let redirection = self.redirection();
                redirection.check()?;
                redirection.active().map(str::to_string)
            }
        };

        self.paths.ensure_dirs()?;
        let profile_dir = self.paths.profile_dir(name);
        if fs::symlink_metadata(&profile_dir).is_ok() {
            return Err(ProfileError::DuplicateProfile(name.to_string()));
        }

        fs::create_dir(&profile_dir).map_err(|e| ProfileError::io(&profile_dir, e))?;

        if let Err(err) = self.populate(name, base.as_deref()) {
            if let Err(cleanup) = fs::remove_dir_all(&profile_dir) {
                warn!(profile = name, error = %cleanup, "failed to clean up partial profile");
            }
            return Err(err);
        }

        info!(profile = name, source = base.as_deref().unwrap_or("(live roots)"), "profile created");
        Ok(())
    }

    /// Fill `name`'s snapshots from `base`, or from the unmanaged live roots
    fn populate(&self, name: &str, base: Option<&str>) -> ProfileResult<()> {
        for kind in RootKind::all() {
            let from = match base {
                Some(base) => self.paths.snapshot(base, kind),
                None => self.paths.real_root(kind).to_path_buf(),
            };
            let to = self.paths.snapshot(name, kind);

            if from.is_dir() {
                copy_dir_recursive(&from, &to)?;
            } else {
                fs::create_dir_all(&to).map_err(|e| ProfileError::io(&to, e))?;
            }
        }
        Ok(())
    }

    /// Rename a profile
    ///
    /// Returns whether any redirection had to follow the rename.
    pub fn rename(&self, old_name: &str, new_name: &str) -> ProfileResult<bool> {
        validate_profile_name(old_name)?;
        validate_profile_name(new_name)?;
        self.guard()?;
        let lock = self.lock()?;
        self.rename_locked(&lock, old_name, new_name)
    }

    pub fn rename_locked(
        &self,
        _lock: &StoreLock,
        old_name: &str,
        new_name: &str,
    ) -> ProfileResult<bool> {
        validate_profile_name(old_name)?;
        validate_profile_name(new_name)?;

        let old_dir = self.paths.profile_dir(old_name);
        let new_dir = self.paths.profile_dir(new_name);

        if !old_dir.is_dir() {
            return Err(ProfileError::ProfileNotFound(old_name.to_string()));
        }
        if fs::symlink_metadata(&new_dir).is_ok() {
            return Err(ProfileError::DuplicateProfile(new_name.to_string()));
        }

        fs::rename(&old_dir, &new_dir).map_err(|e| ProfileError::io(&old_dir, e))?;

        let mut repointed = false;
        for kind in RootKind::all() {
            if Pointer::read(&self.paths, kind).profile() == Some(old_name) {
                repoint(&self.paths, kind, &self.paths.snapshot(new_name, kind))?;
                repointed = true;
            }
        }

        info!(from = old_name, to = new_name, repointed, "profile renamed");
        Ok(repointed)
    }

    /// Point both real roots at `name`
    pub fn switch_to(&self, name: &str) -> ProfileResult<()> {
        validate_profile_name(name)?;
        self.guard()?;
        let lock = self.lock()?;
        self.switch_locked(&lock, name)
    }

    /// Repoints primary then secondary. A failure between the two leaves one
    /// stale root, which [`ProfileStore::list`] reports as inconsistent.
    pub fn switch_locked(&self, _lock: &StoreLock, name: &str) -> ProfileResult<()> {
        validate_profile_name(name)?;
        if !self.exists(name) {
            return Err(ProfileError::ProfileNotFound(name.to_string()));
        }

        for kind in RootKind::all() {
            let snapshot = self.paths.snapshot(name, kind);
            fs::create_dir_all(&snapshot).map_err(|e| ProfileError::io(&snapshot, e))?;
        }

        for kind in RootKind::all() {
            repoint(&self.paths, kind, &self.paths.snapshot(name, kind))?;
        }

        info!(profile = name, "roots switched");
        Ok(())
    }
}
