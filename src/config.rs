//! Runtime configuration resolved from the environment.
//!
//! | variable | meaning |
//! |---|---|
//! | `CURSORPROF_HOME` | home directory to resolve roots under |
//! | `CURSORPROF_PLATFORM` | `macos`/`darwin`, `windows` or `linux` |
//! | `CURSORPROF_LOCK_TIMEOUT_SECS` | how long to wait for the store lock |
//! | `CURSORPROF_SELF_COMMAND` | command registered in mcp.json for this server |
//! | `CURSORPROF_LOG` | tracing filter (read by `logging`) |

use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::PathBuf;
use std::time::Duration;

use crate::paths::{Paths, Platform, resolve_roots};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SELF_COMMAND: &str = "cursorprof";

#[derive(Debug, Clone)]
pub struct Config {
    pub platform: Platform,
    pub home: PathBuf,
    pub lock_timeout: Duration,
    pub self_command: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let home = match std::env::var_os("CURSORPROF_HOME") {
            Some(home) => PathBuf::from(home),
            None => BaseDirs::new()
                .context("Failed to determine home directory")?
                .home_dir()
                .to_path_buf(),
        };

        let platform = match std::env::var("CURSORPROF_PLATFORM") {
            Ok(name) => name.parse::<Platform>()?,
            Err(_) => Platform::current()?,
        };

        let lock_timeout = match std::env::var("CURSORPROF_LOCK_TIMEOUT_SECS") {
            Ok(secs) => Duration::from_secs(
                secs.trim()
                    .parse()
                    .with_context(|| format!("Invalid CURSORPROF_LOCK_TIMEOUT_SECS: {}", secs))?,
            ),
            Err(_) => DEFAULT_LOCK_TIMEOUT,
        };

        let self_command = std::env::var("CURSORPROF_SELF_COMMAND")
            .ok()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SELF_COMMAND.to_string());

        Ok(Self {
            platform,
            home,
            lock_timeout,
            self_command,
        })
    }

    pub fn paths(&self) -> Paths {
        resolve_roots(self.platform, &self.home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "CURSORPROF_HOME",
            "CURSORPROF_PLATFORM",
            "CURSORPROF_LOCK_TIMEOUT_SECS",
            "CURSORPROF_SELF_COMMAND",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("CURSORPROF_HOME", "/tmp/fake-home");
            std::env::set_var("CURSORPROF_PLATFORM", "darwin");
            std::env::set_var("CURSORPROF_LOCK_TIMEOUT_SECS", "3");
            std::env::set_var("CURSORPROF_SELF_COMMAND", "/opt/bin/cursorprof");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.home, PathBuf::from("/tmp/fake-home"));
        assert_eq!(config.platform, Platform::MacOs);
        assert_eq!(config.lock_timeout, Duration::from_secs(3));
        assert_eq!(config.self_command, "/opt/bin/cursorprof");
        assert!(config.paths().store_root.starts_with("/tmp/fake-home"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unsupported_platform_override() {
        clear_env();
        unsafe { std::env::set_var("CURSORPROF_PLATFORM", "plan9") };
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        unsafe { std::env::set_var("CURSORPROF_HOME", "/tmp/h") };
        let config = Config::from_env().unwrap();
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);
        assert_eq!(config.self_command, DEFAULT_SELF_COMMAND);
        clear_env();
    }
}
