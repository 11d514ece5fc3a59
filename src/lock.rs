//! Store-wide mutual exclusion.
//!
//! Every mutating transaction holds a [`StoreLock`] for its whole duration. It
//! is an advisory `flock`-style lock on `~/.cursor-profiles/store.lock`, so it
//! serializes independent processes (two tool-server connections) as well as
//! threads. Acquisition polls and gives up with [`ProfileError::Busy`] after the
//! timeout instead of blocking forever.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{ProfileError, ProfileResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Proof that the caller holds the store lock. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub fn acquire(path: &Path, timeout: Duration) -> ProfileResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProfileError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ProfileError::io(path, e))?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(ProfileError::Busy(path.to_path_buf()));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(ProfileError::io(path, err)),
            }
        }

        debug!(path = %path.display(), "store lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Release the lock (ignore errors during drop)
        let _ = self.file.unlock();
        debug!(path = %self.path.display(), "store lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_and_times_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/store.lock");

        let held = StoreLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let second = StoreLock::acquire(&path, Duration::from_millis(150));
        assert!(matches!(second, Err(ProfileError::Busy(_))));

        drop(held);
        assert!(StoreLock::acquire(&path, Duration::from_millis(100)).is_ok());
    }
}
