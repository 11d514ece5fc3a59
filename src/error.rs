//! Error types for the profile engine
//!
//! Every failure the engine can report is a variant of [`ProfileError`]. The CLI
//! wraps these in `anyhow` for display; the tool server turns them into error
//! results carrying [`ProfileError::remedy`].

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for engine operations
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Errors that can occur while inspecting or mutating the profile store
#[derive(Error, Debug)]
pub enum ProfileError {
    /// Profile name failed validation
    #[error("Invalid profile name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A profile with that name already exists
    #[error("Profile '{0}' already exists")]
    DuplicateProfile(String),

    /// No profile with that name exists
    #[error("Profile '{0}' does not exist")]
    ProfileNotFound(String),

    /// The host IDE is running
    #[error("Cursor is currently running")]
    HostRunning,

    /// The process check itself failed, so liveness is unknown
    #[error("Could not determine whether Cursor is running: {0}")]
    LivenessUnknown(String),

    /// Platform identifier outside the supported set
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The two redirections disagree
    #[error(
        "Configuration roots disagree: primary -> {primary}, secondary -> {secondary}"
    )]
    InconsistentRedirection { primary: String, secondary: String },

    /// Both redirections point at a profile that is gone
    #[error("Configuration roots point at missing profile '{0}'")]
    DanglingRedirection(String),

    /// A real root is a symlink that does not point into the store
    #[error("{} is a symlink to {} which is not managed by cursorprof", .path.display(), .target.display())]
    UnmanagedRoot { path: PathBuf, target: PathBuf },

    /// Account CLI (or git) failed or produced output we cannot parse
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Filesystem access denied
    #[error("Permission denied: {}", .path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other filesystem failure
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Manifest file exists but is not a JSON object
    #[error("Invalid manifest {}: {message}", .path.display())]
    InvalidManifest { path: PathBuf, message: String },

    /// Propagation source has no manifest
    #[error("Profile '{0}' has no mcp.json to propagate")]
    ManifestNotFound(String),

    /// Account handle failed validation
    #[error("Invalid account handle '{0}'")]
    InvalidAccountHandle(String),

    /// Another invocation holds the store lock
    #[error("Profile store is busy (lock held on {})", .0.display())]
    Busy(PathBuf),
}

impl ProfileError {
    /// Wrap an I/O error with the path it happened on.
    ///
    /// `PermissionDenied` becomes [`ProfileError::Permission`]; everything else is
    /// [`ProfileError::Io`].
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::Permission { path, source }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn external(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// What the operator can do about it, if anything
    pub fn remedy(&self) -> Option<&'static str> {
        match self {
            Self::InvalidName { .. } => Some(
                "Use only letters, digits, dots (.), hyphens (-) and underscores (_).",
            ),
            Self::DuplicateProfile(_) => Some("Choose a different name."),
            Self::ProfileNotFound(_) => Some("Run 'cursorprof list' to see available profiles."),
            Self::HostRunning => Some("Quit Cursor, then try again."),
            Self::LivenessUnknown(_) => {
                Some("Make sure Cursor is closed and the process tools (pgrep/tasklist) work.")
            }
            Self::UnsupportedPlatform(_) => Some("Supported platforms are macos, windows and linux."),
            Self::InconsistentRedirection { .. } | Self::DanglingRedirection(_) => {
                Some("Re-run 'cursorprof use <profile>' to converge both roots.")
            }
            Self::UnmanagedRoot { .. } => {
                Some("Remove or move the symlink yourself, then switch again.")
            }
            Self::ExternalTool { .. } => Some("Check that 'gh' and 'git' are installed and authenticated."),
            Self::Permission { .. } => Some("Check ownership and permissions of the path."),
            Self::InvalidManifest { .. } => Some("Fix the JSON in mcp.json so its top level is an object."),
            Self::ManifestNotFound(_) => Some("Create mcp.json in that profile first, or pick another source."),
            Self::InvalidAccountHandle(_) => Some("Pass the GitHub username shown by 'gh auth status'."),
            Self::Busy(_) => Some("Another cursorprof invocation is running; retry shortly."),
            Self::Io { .. } => None,
        }
    }
}
