//! Host IDE process handling.
//!
//! Liveness checks sit behind [`ProcessInspector`] so the engine can be
//! driven by a deterministic fake in tests. They fail closed: if the check
//! cannot run, callers get [`ProfileError::LivenessUnknown`] and must not mutate.

use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::error::{ProfileError, ProfileResult};
use crate::paths::Platform;

/// Answers "is Cursor running right now?"
pub trait ProcessInspector: Send + Sync {
    fn is_host_running(&self) -> ProfileResult<bool>;
}

/// Starts Cursor
pub trait HostLauncher: Send + Sync {
    fn launch(&self) -> ProfileResult<()>;
}

/// The real host: checks with pgrep / tasklist and launches the installed app
#[derive(Debug, Clone, Copy)]
pub struct SystemHost {
    platform: Platform,
}

impl SystemHost {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Process name pgrep matches exactly
    fn process_name(&self) -> &'static str {
        match self.platform {
            Platform::MacOs => "Cursor",
            Platform::Windows => "Cursor.exe",
            Platform::Linux => "cursor",
        }
    }
}

impl ProcessInspector for SystemHost {
    fn is_host_running(&self) -> ProfileResult<bool> {
        let name = self.process_name();

        if self.platform == Platform::Windows {
            let output = Command::new("tasklist")
                .args(["/FI", &format!("IMAGENAME eq {name}"), "/NH"])
                .output()
                .map_err(|e| ProfileError::LivenessUnknown(format!("tasklist: {e}")))?;
            if !output.status.success() {
                return Err(ProfileError::LivenessUnknown(format!(
                    "tasklist exited with {}",
                    output.status
                )));
            }
            let stdout = String::from_utf8_lossy(&output.stdout).to_ascii_lowercase();
            return Ok(stdout.contains(&name.to_ascii_lowercase()));
        }

        let status = Command::new("pgrep")
            .args(["-x", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| ProfileError::LivenessUnknown(format!("pgrep: {e}")))?;

        // pgrep: 0 = matched, 1 = no match, anything else = check failure
        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(ProfileError::LivenessUnknown(format!(
                "pgrep exited with {status}"
            ))),
        }
    }
}

/// Gate for destructive operations
pub fn ensure_host_stopped(inspector: &dyn ProcessInspector) -> ProfileResult<()> {
    let running = inspector.is_host_running()?;
    debug!(running, "host liveness checked");
    if running {
        return Err(ProfileError::HostRunning);
    }
    Ok(())
}

impl HostLauncher for SystemHost {
    fn launch(&self) -> ProfileResult<()> {
        launch_host(self.platform)
    }
}

/// Start Cursor without waiting for it to exit
pub fn launch_host(platform: Platform) -> ProfileResult<()> {
    let mut cmd = match platform {
        Platform::MacOs => {
            let mut cmd = Command::new("open");
            cmd.args(["-a", "Cursor"]);
            cmd
        }
        Platform::Windows => {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", "cursor"]);
            cmd
        }
        Platform::Linux => Command::new("cursor"),
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ProfileError::external("cursor", format!("failed to launch: {e}")))?;

    info!(%platform, "launched Cursor");
    Ok(())
}
