use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ProfileError, ProfileResult};

/// One profile -> account association. Holds a handle, never a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub account: String,
    pub bound_at: DateTime<Utc>,
}

/// Bindings stored in ~/.cursor-profiles/identities.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityBook {
    #[serde(default)]
    pub bindings: BTreeMap<String, Binding>,

    /// When the book was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IdentityBook {
    /// Read the book from file, returning default if file doesn't exist
    pub fn read(path: &Path) -> ProfileResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(ProfileError::io(path, err)),
        };
        Self::parse(&content, path)
    }

    /// A present but empty document is corrupt, not an empty book
    fn parse(content: &str, path: &Path) -> ProfileResult<Self> {
        let invalid = |e: Box<dyn std::error::Error + Send + Sync>| {
            ProfileError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        };
        if content.trim().is_empty() {
            return Err(invalid("identities file is empty".into()));
        }
        serde_json::from_str(content).map_err(|e| invalid(e.into()))
    }

    pub fn account(&self, profile: &str) -> Option<&str> {
        self.bindings.get(profile).map(|b| b.account.as_str())
    }
}

/// Exclusive access to the identities file for one read-modify-write.
///
/// The lock lives on a sidecar `identities.json.lock` because the document
/// itself is replaced by rename on every save. Readers never lock: they see
/// either the previous or the next complete document.
struct LockedBook {
    lock: File,
    book: IdentityBook,
    path: PathBuf,
}

impl LockedBook {
    fn lock(path: &Path) -> ProfileResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProfileError::io(parent, e))?;
        }

        let lock_path = path.with_extension("json.lock");
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ProfileError::io(&lock_path, e))?;
        lock.lock_exclusive()
            .map_err(|e| ProfileError::io(&lock_path, e))?;

        let book = IdentityBook::read(path)?;
        Ok(Self {
            lock,
            book,
            path: path.to_path_buf(),
        })
    }

    /// Update and save the book
    fn update<F, T>(&mut self, f: F) -> ProfileResult<T>
    where
        F: FnOnce(&mut IdentityBook) -> T,
    {
        let out = f(&mut self.book);
        self.book.updated_at = Some(Utc::now());
        self.save()?;
        Ok(out)
    }

    /// Write to a temp sibling, then rename over the document
    fn save(&self) -> ProfileResult<()> {
        let content = serde_json::to_string_pretty(&self.book)
            .map_err(|e| ProfileError::io(&self.path, std::io::Error::other(e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        let io = |e| ProfileError::io(&temp_path, e);
        let mut file = File::create(&temp_path).map_err(io)?;
        file.write_all(content.as_bytes()).map_err(io)?;
        file.sync_all().map_err(io)?;
        drop(file);

        std::fs::rename(&temp_path, &self.path).map_err(|e| ProfileError::io(&self.path, e))
    }
}

impl Drop for LockedBook {
    fn drop(&mut self) {
        // Release the lock (ignore errors during drop)
        let _ = self.lock.unlock();
    }
}

/// Check an account handle before it reaches the account CLI
pub fn validate_handle(handle: &str) -> ProfileResult<()> {
    let ok = !handle.is_empty()
        && !handle.starts_with('-')
        && !handle.chars().any(|c| c.is_whitespace() || c.is_control());
    if !ok {
        return Err(ProfileError::InvalidAccountHandle(handle.to_string()));
    }
    Ok(())
}

/// Profile -> account handle mapping, persisted as one document
#[derive(Debug, Clone)]
pub struct IdentityBinder {
    path: PathBuf,
}

impl IdentityBinder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn lookup(&self, profile: &str) -> ProfileResult<Option<String>> {
        Ok(IdentityBook::read(&self.path)?
            .account(profile)
            .map(str::to_string))
    }

    pub fn book(&self) -> ProfileResult<IdentityBook> {
        IdentityBook::read(&self.path)
    }

    /// Upsert. Callers check that the profile exists.
    pub fn bind(&self, profile: &str, account: &str) -> ProfileResult<()> {
        validate_handle(account)?;
        let mut locked = LockedBook::lock(&self.path)?;
        locked.update(|book| {
            book.bindings.insert(
                profile.to_string(),
                Binding {
                    account: account.to_string(),
                    bound_at: Utc::now(),
                },
            );
        })?;
        info!(profile, account, "identity bound");
        Ok(())
    }

    /// Remove a binding; absent is fine. Returns whether one was removed.
    pub fn unbind(&self, profile: &str) -> ProfileResult<bool> {
        if self.lookup(profile)?.is_none() {
            return Ok(false);
        }
        let mut locked = LockedBook::lock(&self.path)?;
        let removed = locked.update(|book| book.bindings.remove(profile).is_some())?;
        if removed {
            info!(profile, "identity unbound");
        }
        Ok(removed)
    }

    /// Move a binding to a renamed profile
    pub fn rebind(&self, old: &str, new: &str) -> ProfileResult<()> {
        if self.lookup(old)?.is_none() {
            return Ok(());
        }
        let mut locked = LockedBook::lock(&self.path)?;
        locked.update(|book| {
            if let Some(binding) = book.bindings.remove(old) {
                book.bindings.insert(new.to_string(), binding);
            }
        })
    }
}
