//! Test utilities shared across test modules
//!
//! Temp-dir homes plus deterministic fakes for the process and account seams.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::accounts::{AccountCli, AccountStatus};
use crate::error::{ProfileError, ProfileResult};
use crate::host::{HostLauncher, ProcessInspector};
use crate::manifest::SelfEntry;
use crate::orchestrator::{Collaborators, Engine};
use crate::paths::{Paths, Platform, resolve_roots};

/// Create a Paths struct rooted in a temporary home directory
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    resolve_roots(Platform::Linux, temp_dir.path())
}

/// Seed the real roots with some recognisable content
pub fn seed_real_roots(paths: &Paths, marker: &str) {
    fs::create_dir_all(paths.primary_root.join("User")).unwrap();
    fs::write(
        paths.primary_root.join("User/settings.json"),
        format!(r#"{{"marker": "{marker}"}}"#),
    )
    .unwrap();
    fs::create_dir_all(&paths.secondary_root).unwrap();
    fs::write(
        paths.secondary_root.join("mcp.json"),
        r#"{"mcpServers": {"github": {"command": "gh-mcp"}}}"#,
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy)]
enum HostState {
    Stopped,
    Running,
    Broken,
}

/// Process inspector whose answer the test controls
#[derive(Debug)]
pub struct FakeInspector {
    state: Mutex<HostState>,
}

impl FakeInspector {
    pub fn stopped() -> Self {
        Self {
            state: Mutex::new(HostState::Stopped),
        }
    }

    pub fn running() -> Self {
        Self {
            state: Mutex::new(HostState::Running),
        }
    }

    pub fn broken() -> Self {
        Self {
            state: Mutex::new(HostState::Broken),
        }
    }

    pub fn set_running(&self, running: bool) {
        *self.state.lock().unwrap() = if running { HostState::Running } else { HostState::Stopped };
    }
}

impl ProcessInspector for FakeInspector {
    fn is_host_running(&self) -> ProfileResult<bool> {
        match *self.state.lock().unwrap() {
            HostState::Stopped => Ok(false),
            HostState::Running => Ok(true),
            HostState::Broken => Err(ProfileError::LivenessUnknown("process listing unavailable".into())),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeLauncher {
    pub launches: AtomicUsize,
}

impl HostLauncher for FakeLauncher {
    fn launch(&self) -> ProfileResult<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Account CLI that records switches instead of running gh
#[derive(Debug, Default)]
pub struct RecordingAccounts {
    pub switched: Mutex<Vec<String>>,
    pub remotes: Mutex<HashMap<PathBuf, String>>,
    pub status: AccountStatus,
    pub fail_switch: bool,
}

impl RecordingAccounts {
    pub fn switches(&self) -> Vec<String> {
        self.switched.lock().unwrap().clone()
    }
}

impl AccountCli for RecordingAccounts {
    fn status(&self) -> ProfileResult<AccountStatus> {
        Ok(self.status.clone())
    }

    fn switch_account(&self, handle: &str) -> ProfileResult<()> {
        if self.fail_switch {
            return Err(ProfileError::external("gh", "no such account"));
        }
        self.switched.lock().unwrap().push(handle.to_string());
        Ok(())
    }

    fn remote_url(&self, repo: &Path) -> ProfileResult<String> {
        self.remotes
            .lock()
            .unwrap()
            .get(repo)
            .cloned()
            .ok_or_else(|| ProfileError::external("git", "no remote named origin"))
    }

    fn set_remote_url(&self, repo: &Path, url: &str) -> ProfileResult<()> {
        self.remotes
            .lock()
            .unwrap()
            .insert(repo.to_path_buf(), url.to_string());
        Ok(())
    }
}

/// Handles to the fakes wired into a test engine
pub struct TestHarness {
    pub engine: Engine,
    pub inspector: Arc<FakeInspector>,
    pub launcher: Arc<FakeLauncher>,
    pub accounts: Arc<RecordingAccounts>,
}

pub fn test_engine(temp_dir: &TempDir) -> TestHarness {
    test_engine_with(temp_dir, RecordingAccounts::default())
}

pub fn test_engine_with(temp_dir: &TempDir, accounts: RecordingAccounts) -> TestHarness {
    let inspector = Arc::new(FakeInspector::stopped());
    let launcher = Arc::new(FakeLauncher::default());
    let accounts = Arc::new(accounts);

    let engine = Engine::new(
        setup_test_paths(temp_dir),
        Collaborators {
            inspector: inspector.clone(),
            launcher: launcher.clone(),
            accounts: accounts.clone(),
        },
        Duration::from_millis(500),
        SelfEntry::default(),
    );

    TestHarness {
        engine,
        inspector,
        launcher,
        accounts,
    }
}
