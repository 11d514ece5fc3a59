//! User-facing transactions.
//!
//! [`Engine`] composes the liveness guard, the store, the manifest propagator
//! and the identity binder. The switch runs as a small state machine:
//!
//! ```text
//! Idle -> Guarding -> Switching -> Propagating -> ActivatingIdentity -> Done
//!            \___________\______________\_______________\______-> Failed
//! ```
//!
//! Nothing is rolled back on failure. A switch that dies between the two root
//! updates shows up as inconsistent in the next listing; re-running it converges.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::accounts::{AccountCli, AccountStatus, GhCli, embed_username};
use crate::config::Config;
use crate::error::{ProfileError, ProfileResult};
use crate::host::{HostLauncher, ProcessInspector, SystemHost};
use crate::identity::{IdentityBinder, validate_handle};
use crate::manifest::{self, PropagationReport, SelfEntry};
use crate::paths::Paths;
use crate::redirect::Redirection;
use crate::store::{ProfileStore, validate_profile_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStage {
    Idle,
    Guarding,
    Switching,
    Propagating,
    ActivatingIdentity,
    Done,
}

impl fmt::Display for SwitchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwitchStage::Idle => "idle",
            SwitchStage::Guarding => "guarding",
            SwitchStage::Switching => "switching",
            SwitchStage::Propagating => "propagating",
            SwitchStage::ActivatingIdentity => "activating-identity",
            SwitchStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tracks the current stage and tags failures with it
struct Transition<'a> {
    op: &'a str,
    stage: SwitchStage,
}

impl<'a> Transition<'a> {
    fn new(op: &'a str) -> Self {
        Self {
            op,
            stage: SwitchStage::Idle,
        }
    }

    fn enter(&mut self, stage: SwitchStage) {
        debug!(op = self.op, from = %self.stage, to = %stage, "transition");
        self.stage = stage;
    }

    fn run<T>(&self, result: ProfileResult<T>) -> ProfileResult<T> {
        result.inspect_err(|e| warn!(op = self.op, stage = %self.stage, error = %e, "failed"))
    }
}

/// Result of a completed switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchOutcome {
    pub profile: String,
    pub previous: Option<String>,
    /// Account handle activated, if the profile had one bound
    pub identity: Option<String>,
    pub manifest_repaired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameOutcome {
    pub old_name: String,
    pub new_name: String,
    pub was_active: bool,
    pub identity_moved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub is_active: bool,
    pub inconsistent: bool,
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub profiles: Vec<ProfileSummary>,
    pub active: Option<String>,
    /// Human-readable problem with the redirections, if any
    pub problem: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteAlignment {
    pub repo: PathBuf,
    pub account: String,
    pub before: String,
    pub after: String,
}

/// Everything the engine knows about the machine, for the overview resource
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub platform: String,
    pub paths: OverviewPaths,
    /// unset, active, inconsistent or dangling
    pub redirection: &'static str,
    pub report: ProfileReport,
    pub host_running: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewPaths {
    pub primary_root: PathBuf,
    pub secondary_root: PathBuf,
    pub store_root: PathBuf,
    pub identities_file: PathBuf,
}

/// The external seams the engine drives
pub struct Collaborators {
    pub inspector: Arc<dyn ProcessInspector>,
    pub launcher: Arc<dyn HostLauncher>,
    pub accounts: Arc<dyn AccountCli>,
}

impl Collaborators {
    pub fn system(config: &Config) -> Self {
        let host = Arc::new(SystemHost::new(config.platform));
        Self {
            inspector: host.clone(),
            launcher: host,
            accounts: Arc::new(GhCli::default()),
        }
    }
}

pub struct Engine {
    store: ProfileStore,
    identities: IdentityBinder,
    launcher: Arc<dyn HostLauncher>,
    accounts: Arc<dyn AccountCli>,
    inspector: Arc<dyn ProcessInspector>,
    self_entry: SelfEntry,
}

impl Engine {
    pub fn new(
        paths: Paths,
        collaborators: Collaborators,
        lock_timeout: Duration,
        self_entry: SelfEntry,
    ) -> Self {
        let identities = IdentityBinder::new(paths.identities_file.clone());
        let store = ProfileStore::new(paths, collaborators.inspector.clone(), lock_timeout);
        Self {
            store,
            identities,
            launcher: collaborators.launcher,
            accounts: collaborators.accounts,
            inspector: collaborators.inspector,
            self_entry,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths(),
            Collaborators::system(config),
            config.lock_timeout,
            SelfEntry::new(config.self_command.clone()),
        )
    }

    pub fn paths(&self) -> &Paths {
        self.store.paths()
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn identities(&self) -> &IdentityBinder {
        &self.identities
    }

    pub fn self_entry(&self) -> &SelfEntry {
        &self.self_entry
    }

    pub fn is_host_running(&self) -> ProfileResult<bool> {
        self.inspector.is_host_running()
    }

    /// Profiles with their bound identities. Bad redirection state is
    /// reported in `problem`, not as an error.
    pub fn list(&self) -> ProfileResult<ProfileReport> {
        let listing = self.store.list()?;
        let book = self.identities.book()?;

        let profiles = listing
            .profiles
            .iter()
            .map(|p| ProfileSummary {
                name: p.name.clone(),
                is_active: p.is_active,
                inconsistent: p.inconsistent,
                identity: book.account(&p.name).map(str::to_string),
            })
            .collect();

        Ok(ProfileReport {
            profiles,
            active: listing.active().map(str::to_string),
            problem: listing.redirection.check().err().map(|e| e.to_string()),
        })
    }

    /// Switch both roots to `name` and activate its identity
    pub fn switch(&self, name: &str) -> ProfileResult<SwitchOutcome> {
        let mut t = Transition::new("switch");

        t.enter(SwitchStage::Guarding);
        t.run(validate_profile_name(name))?;
        t.run(self.store.guard())?;

        t.enter(SwitchStage::Switching);
        let lock = t.run(self.store.lock())?;
        let previous = self.store.redirection().active().map(str::to_string);
        t.run(self.store.switch_locked(&lock, name))?;

        t.enter(SwitchStage::Propagating);
        let manifest_repaired = t.run(manifest::repair_self_entry(
            self.paths(),
            name,
            &self.self_entry,
        ))?;
        if manifest_repaired {
            info!(profile = name, "self entry restored in mcp.json");
        }

        t.enter(SwitchStage::ActivatingIdentity);
        let identity = t.run(self.identities.lookup(name))?;
        if let Some(handle) = &identity {
            t.run(self.accounts.switch_account(handle))?;
        }

        t.enter(SwitchStage::Done);
        info!(profile = name, ?previous, identity = ?identity, "switched");
        Ok(SwitchOutcome {
            profile: name.to_string(),
            previous,
            identity,
            manifest_repaired,
        })
    }

    /// Create a profile; the active profile is untouched
    pub fn init(&self, name: &str, source: Option<&str>) -> ProfileResult<()> {
        let mut t = Transition::new("init");
        t.enter(SwitchStage::Guarding);
        t.run(validate_profile_name(name))?;
        t.run(self.store.guard())?;

        t.enter(SwitchStage::Switching);
        let lock = t.run(self.store.lock())?;
        t.run(self.store.create_locked(&lock, name, source))?;

        t.enter(SwitchStage::Done);
        Ok(())
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> ProfileResult<RenameOutcome> {
        let mut t = Transition::new("rename");
        t.enter(SwitchStage::Guarding);
        t.run(validate_profile_name(old_name))?;
        t.run(validate_profile_name(new_name))?;
        t.run(self.store.guard())?;

        t.enter(SwitchStage::Switching);
        let lock = t.run(self.store.lock())?;
        let was_active = t.run(self.store.rename_locked(&lock, old_name, new_name))?;
        let identity_moved = t.run(self.identities.lookup(old_name))?.is_some();
        t.run(self.identities.rebind(old_name, new_name))?;

        t.enter(SwitchStage::Done);
        Ok(RenameOutcome {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
            was_active,
            identity_moved,
        })
    }

    pub fn propagate(&self, source: &str) -> ProfileResult<PropagationReport> {
        validate_profile_name(source)?;
        let lock = self.store.lock()?;
        manifest::propagate_to_all(&self.store, &lock, source, &self.self_entry)
    }

    pub fn bind(&self, profile: &str, account: &str) -> ProfileResult<()> {
        validate_profile_name(profile)?;
        validate_handle(account)?;
        let _lock = self.store.lock()?;
        if !self.store.exists(profile) {
            return Err(ProfileError::ProfileNotFound(profile.to_string()));
        }
        self.identities.bind(profile, account)
    }

    pub fn unbind(&self, profile: &str) -> ProfileResult<bool> {
        let _lock = self.store.lock()?;
        self.identities.unbind(profile)
    }

    pub fn lookup(&self, profile: &str) -> ProfileResult<Option<String>> {
        self.identities.lookup(profile)
    }

    pub fn accounts(&self) -> ProfileResult<AccountStatus> {
        self.accounts.status()
    }

    /// Embed an account name into a repo's origin URL.
    ///
    /// With no explicit account, uses the identity bound to the active profile.
    pub fn align_remote(&self, repo: &Path, account: Option<&str>) -> ProfileResult<RemoteAlignment> {
        let account = match account {
            Some(account) => account.to_string(),
            None => {
                let active = self
                    .store
                    .active()?
                    .ok_or_else(|| ProfileError::ProfileNotFound("(no active profile)".into()))?;
                self.identities.lookup(&active)?.ok_or_else(|| {
                    ProfileError::InvalidAccountHandle(format!("(none bound to '{active}')"))
                })?
            }
        };
        validate_handle(&account)?;

        let before = self.accounts.remote_url(repo)?;
        let after = embed_username(&before, &account)?;
        if after != before {
            self.accounts.set_remote_url(repo, &after)?;
            info!(repo = %repo.display(), account = %account, "remote aligned");
        }

        Ok(RemoteAlignment {
            repo: repo.to_path_buf(),
            account,
            before,
            after,
        })
    }

    pub fn open_host(&self) -> ProfileResult<()> {
        self.launcher.launch()
    }

    pub fn overview(&self) -> ProfileResult<Overview> {
        let paths = self.paths();
        Ok(Overview {
            platform: paths.platform.to_string(),
            paths: OverviewPaths {
                primary_root: paths.primary_root.clone(),
                secondary_root: paths.secondary_root.clone(),
                store_root: paths.store_root.clone(),
                identities_file: paths.identities_file.clone(),
            },
            redirection: self.redirection().label(),
            report: self.list()?,
            host_running: self.inspector.is_host_running().ok(),
        })
    }

    pub fn redirection(&self) -> Redirection {
        self.store.redirection()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::manifest::{ensure_self_entry, read_manifest, write_manifest};
    use crate::roots::RootKind;
    use crate::test_utils::{
        RecordingAccounts, TestHarness, seed_real_roots, test_engine, test_engine_with,
    };
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    /// Store with `work` (active) and `personal`
    fn work_and_personal(temp: &TempDir) -> TestHarness {
        let h = test_engine(temp);
        seed_real_roots(h.engine.paths(), "live");
        h.engine.init("work", None).unwrap();
        h.engine.init("personal", None).unwrap();
        h.engine.switch("work").unwrap();
        h
    }

    #[test]
    fn test_switch_scenario_work_to_personal() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        h.engine.bind("personal", "alice").unwrap();
        let work_manifest = read_manifest(h.engine.paths(), "work").unwrap();

        let outcome = h.engine.switch("personal").unwrap();

        assert_eq!(outcome.profile, "personal");
        assert_eq!(outcome.previous.as_deref(), Some("work"));
        assert_eq!(outcome.identity.as_deref(), Some("alice"));
        assert_eq!(h.accounts.switches(), vec!["alice"]);
        assert_eq!(read_manifest(h.engine.paths(), "work").unwrap(), work_manifest);

        let report = h.engine.list().unwrap();
        assert_eq!(report.active.as_deref(), Some("personal"));
        assert!(report.problem.is_none());
    }

    #[test]
    fn test_switch_without_identity_skips_account_cli() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        let outcome = h.engine.switch("personal").unwrap();
        assert_eq!(outcome.identity, None);
        assert!(h.accounts.switches().is_empty());
    }

    #[test]
    fn test_switch_repairs_self_entry() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        let paths = h.engine.paths();

        let outcome = h.engine.switch("personal").unwrap();
        assert!(outcome.manifest_repaired);
        let manifest = read_manifest(paths, "personal").unwrap().unwrap();
        assert!(manifest.has_self_entry());
        assert!(manifest.server_names().contains(&"github".to_string()));

        // Visible through the live root too
        assert!(paths.secondary_root.join("mcp.json").exists());

        let again = h.engine.switch("personal").unwrap();
        assert!(!again.manifest_repaired);
    }

    #[test]
    fn test_switch_blocked_while_host_running() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        let paths = h.engine.paths();
        let before: Vec<_> = RootKind::all()
            .iter()
            .map(|k| fs::read_link(paths.real_root(*k)).unwrap())
            .collect();

        h.inspector.set_running(true);
        assert!(matches!(
            h.engine.switch("personal"),
            Err(ProfileError::HostRunning)
        ));

        let after: Vec<_> = RootKind::all()
            .iter()
            .map(|k| fs::read_link(paths.real_root(*k)).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_switch_reports_account_failure_after_switching() {
        let temp = TempDir::new().unwrap();
        let h = test_engine_with(
            &temp,
            RecordingAccounts {
                fail_switch: true,
                ..Default::default()
            },
        );
        h.engine.init("work", None).unwrap();
        h.engine.bind("work", "ghost").unwrap();

        assert!(matches!(
            h.engine.switch("work"),
            Err(ProfileError::ExternalTool { .. })
        ));
        // Directories already moved; not rolled back
        assert_eq!(h.engine.store().active().unwrap().as_deref(), Some("work"));
    }

    #[test]
    fn test_init_while_host_running() {
        let temp = TempDir::new().unwrap();
        let h = test_engine(&temp);
        h.inspector.set_running(true);

        assert!(matches!(
            h.engine.init("client-x", None),
            Err(ProfileError::HostRunning)
        ));
        assert!(!h.engine.paths().profile_dir("client-x").exists());
    }

    #[test]
    fn test_init_does_not_change_active() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        h.engine.init("client-x", Some("personal")).unwrap();

        let report = h.engine.list().unwrap();
        assert_eq!(report.active.as_deref(), Some("work"));
        let entry = report.profiles.iter().find(|p| p.name == "client-x").unwrap();
        assert!(!entry.is_active);
    }

    #[test]
    fn test_rename_then_switch() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        h.engine.bind("work", "alice").unwrap();

        let outcome = h.engine.rename("work", "job").unwrap();
        assert!(outcome.was_active);
        assert!(outcome.identity_moved);
        assert_eq!(h.engine.lookup("job").unwrap().as_deref(), Some("alice"));
        assert_eq!(h.engine.lookup("work").unwrap(), None);

        assert!(h.engine.list().unwrap().problem.is_none());
        h.engine.switch("job").unwrap();

        assert!(matches!(
            h.engine.rename("job", "personal"),
            Err(ProfileError::DuplicateProfile(_))
        ));
        assert!(matches!(
            h.engine.switch("work"),
            Err(ProfileError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_bind_requires_existing_profile() {
        let temp = TempDir::new().unwrap();
        let h = test_engine(&temp);
        assert!(matches!(
            h.engine.bind("ghost", "alice"),
            Err(ProfileError::ProfileNotFound(_))
        ));

        h.engine.init("real", None).unwrap();
        h.engine.bind("real", "alice").unwrap();
        assert_eq!(h.engine.lookup("real").unwrap().as_deref(), Some("alice"));
        assert!(h.engine.unbind("real").unwrap());
        assert_eq!(h.engine.lookup("real").unwrap(), None);
        assert!(!h.engine.unbind("real").unwrap());
    }

    #[test]
    fn test_propagate_through_engine() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        let paths = h.engine.paths();
        let source = ensure_self_entry(
            &crate::manifest::Manifest::from_value(json!({
                "mcpServers": {"linear": {"url": "https://mcp.linear.app/sse"}}
            }))
            .unwrap(),
            h.engine.self_entry(),
        );
        write_manifest(paths, "work", &source).unwrap();

        let report = h.engine.propagate("work").unwrap();
        assert_eq!(report.written, vec!["personal"]);
        assert_eq!(read_manifest(paths, "personal").unwrap(), Some(source));
    }

    #[test]
    fn test_list_surfaces_inconsistency() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        let paths = h.engine.paths();
        crate::redirect::repoint(
            paths,
            RootKind::Secondary,
            &paths.snapshot("personal", RootKind::Secondary),
        )
        .unwrap();

        let report = h.engine.list().unwrap();
        assert!(report.active.is_none());
        assert!(report.problem.is_some());
        assert!(report.profiles.iter().all(|p| p.inconsistent));

        h.engine.switch("work").unwrap();
        assert!(h.engine.list().unwrap().problem.is_none());
    }

    #[test]
    fn test_align_remote_uses_bound_identity() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        h.engine.bind("work", "alice").unwrap();
        let repo = temp.path().join("repo");
        h.accounts
            .remotes
            .lock()
            .unwrap()
            .insert(repo.clone(), "https://github.com/acme/app.git".into());

        let aligned = h.engine.align_remote(&repo, None).unwrap();
        assert_eq!(aligned.account, "alice");
        assert_eq!(aligned.after, "https://alice@github.com/acme/app.git");
        assert_eq!(h.accounts.remote_url(&repo).unwrap(), aligned.after);
    }

    #[test]
    fn test_open_host_uses_launcher() {
        let temp = TempDir::new().unwrap();
        let h = test_engine(&temp);
        h.engine.open_host().unwrap();
        assert_eq!(
            h.launcher.launches.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[test]
    fn test_overview_serializes() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        let value = serde_json::to_value(h.engine.overview().unwrap()).unwrap();
        assert_eq!(value["platform"], "linux");
        assert_eq!(value["report"]["active"], "work");
        assert_eq!(value["redirection"], "active");
        assert_eq!(value["host_running"], false);
    }

    #[test]
    fn test_mutations_wait_out_a_held_store_lock() {
        let temp = TempDir::new().unwrap();
        let h = work_and_personal(&temp);
        let held = h.engine.store().lock().unwrap();

        assert!(matches!(h.engine.switch("personal"), Err(ProfileError::Busy(_))));
        assert!(matches!(h.engine.bind("work", "bob"), Err(ProfileError::Busy(_))));
        assert!(matches!(h.engine.propagate("work"), Err(ProfileError::Busy(_))));
        assert_eq!(h.engine.redirection().active(), Some("work"));
        assert_eq!(h.engine.lookup("work").unwrap(), None);

        drop(held);
        assert!(h.engine.bind("work", "bob").is_ok());
    }
}
