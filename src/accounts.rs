//! GitHub account switching through the `gh` and `git` CLIs.
//!
//! The engine only ever passes account handles around; credentials stay in
//! gh's own keyring. Output parsing lives in free functions so it can be tested
//! without the tools installed.

use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{ProfileError, ProfileResult};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HOST: &str = "github.com";

/// Authenticated accounts as reported by the account manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    pub accounts: Vec<String>,
    pub active: Option<String>,
}

pub trait AccountCli: Send + Sync {
    fn status(&self) -> ProfileResult<AccountStatus>;
    fn switch_account(&self, handle: &str) -> ProfileResult<()>;
    fn remote_url(&self, repo: &Path) -> ProfileResult<String>;
    fn set_remote_url(&self, repo: &Path, url: &str) -> ProfileResult<()>;
}

/// Real implementation backed by `gh` and `git`
#[derive(Debug, Clone)]
pub struct GhCli {
    host: String,
}

impl Default for GhCli {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
        }
    }
}

impl AccountCli for GhCli {
    fn status(&self) -> ProfileResult<AccountStatus> {
        let output = run("gh", &["auth", "status", "--hostname", &self.host])?;
        parse_auth_status(&output)
    }

    fn switch_account(&self, handle: &str) -> ProfileResult<()> {
        run(
            "gh",
            &["auth", "switch", "--hostname", &self.host, "--user", handle],
        )?;
        info!(account = handle, "gh account switched");
        Ok(())
    }

    fn remote_url(&self, repo: &Path) -> ProfileResult<String> {
        let repo = repo.to_string_lossy();
        let url = run("git", &["-C", &repo, "remote", "get-url", "origin"])?;
        let url = url.trim();
        if url.is_empty() {
            return Err(ProfileError::external("git", "empty remote URL for origin"));
        }
        Ok(url.to_string())
    }

    fn set_remote_url(&self, repo: &Path, url: &str) -> ProfileResult<()> {
        let repo = repo.to_string_lossy();
        run("git", &["-C", &repo, "remote", "set-url", "origin", url])?;
        Ok(())
    }
}

/// Run a command to completion (bounded by a timeout), returning stdout and
/// stderr concatenated. Non-zero exit is an error.
fn run(program: &str, args: &[&str]) -> ProfileResult<String> {
    debug!(program, ?args, "running external command");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProfileError::external(program, e.to_string()))?;

    // Drained concurrently so a chatty child cannot fill a pipe and stall
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + COMMAND_TIMEOUT;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProfileError::external(program, "timed out"));
            }
            Ok(None) => thread::sleep(Duration::from_millis(20)),
            Err(e) => return Err(ProfileError::external(program, e.to_string())),
        }
    };

    let mut stdout = collect(stdout);
    let stderr = collect(stderr);

    if !status.success() {
        let detail = stderr.trim();
        let detail = if detail.is_empty() { stdout.trim() } else { detail };
        return Err(ProfileError::external(
            program,
            format!("exited with {status}: {detail}"),
        ));
    }

    stdout.push_str(&stderr);
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

fn collect(reader: Option<thread::JoinHandle<String>>) -> String {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Parse `gh auth status` output.
///
/// ```text
/// github.com
///   ✓ Logged in to github.com account alice (keyring)
///   - Active account: true
///   ✓ Logged in to github.com account bob (keyring)
///   - Active account: false
/// ```
pub fn parse_auth_status(text: &str) -> ProfileResult<AccountStatus> {
    let mut status = AccountStatus::default();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(idx) = line.find("Logged in to ") {
            let rest = &line[idx..];
            let account = rest
                .split_whitespace()
                .skip_while(|w| *w != "account")
                .nth(1)
                .map(str::to_string);
            match account {
                Some(account) => {
                    status.accounts.push(account.clone());
                    current = Some(account);
                }
                None => {
                    return Err(ProfileError::external(
                        "gh",
                        format!("unrecognised auth status line: {line}"),
                    ));
                }
            }
        } else if let Some(flag) = line.strip_prefix("- Active account:") {
            if flag.trim() == "true" {
                status.active = current.clone();
            }
        }
    }

    if status.accounts.is_empty() {
        return Err(ProfileError::external("gh", "no authenticated accounts found"));
    }
    Ok(status)
}

/// Put `user` into the userinfo of an https remote URL.
///
/// `https://github.com/o/r.git` -> `https://alice@github.com/o/r.git`. Any
/// existing userinfo is replaced. Other schemes cannot carry a username in a
/// way gh honours and are refused.
pub fn embed_username(url: &str, user: &str) -> ProfileResult<String> {
    let rest = url
        .strip_prefix("https://")
        .ok_or_else(|| ProfileError::external("git", format!("remote is not an https URL: {url}")))?;

    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if host.is_empty() {
        return Err(ProfileError::external("git", format!("remote has no host: {url}")));
    }

    if path.is_empty() {
        Ok(format!("https://{user}@{host}"))
    } else {
        Ok(format!("https://{user}@{host}/{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_run_reads_output_larger_than_pipe_buffer() {
        let out = run("sh", &["-c", "head -c 200000 /dev/zero | tr '\\0' a"]).unwrap();
        assert_eq!(out.len(), 200_000);
        assert!(out.bytes().all(|b| b == b'a'));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_stderr_on_failure() {
        let err = run("sh", &["-c", "echo nope >&2; exit 3"]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_parse_auth_status_multiple_accounts() {
        let text = "github.com\n  ✓ Logged in to github.com account alice (keyring)\n  - Active account: false\n  - Git operations protocol: https\n  ✓ Logged in to github.com account bob (keyring)\n  - Active account: true\n";
        let status = parse_auth_status(text).unwrap();
        assert_eq!(status.accounts, vec!["alice", "bob"]);
        assert_eq!(status.active.as_deref(), Some("bob"));
    }

    #[test]
    fn test_parse_auth_status_no_accounts() {
        assert!(matches!(
            parse_auth_status("You are not logged into any GitHub hosts."),
            Err(ProfileError::ExternalTool { .. })
        ));
    }

    #[test]
    fn test_parse_auth_status_garbled_login_line() {
        assert!(parse_auth_status("✓ Logged in to github.com as ???").is_err());
    }

    #[test]
    fn test_embed_username() {
        assert_eq!(
            embed_username("https://github.com/acme/app.git", "alice").unwrap(),
            "https://alice@github.com/acme/app.git"
        );
        assert_eq!(
            embed_username("https://bob@github.com/acme/app", "alice").unwrap(),
            "https://alice@github.com/acme/app"
        );
        assert!(embed_username("git@github.com:acme/app.git", "alice").is_err());
    }
}
