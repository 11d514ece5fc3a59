//! The shared tool-registration manifest (`mcp.json`).
//!
//! Every profile must carry an entry that registers this server, otherwise
//! switching into it would leave the agent without a way to switch back.
//! Propagation copies one profile's manifest over all others wholesale: there
//! is no field-level merge, so the last profile written wins.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fs;
use tracing::{debug, info};

use crate::error::{ProfileError, ProfileResult};
use crate::lock::StoreLock;
use crate::paths::Paths;
use crate::store::ProfileStore;

/// Key under which servers are registered
pub const SERVERS_KEY: &str = "mcpServers";

/// Name this server registers itself under
pub const SELF_ENTRY_NAME: &str = "cursor-profiles";

/// A parsed mcp.json. The top level is always a JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    pub fn parse(content: &str) -> Result<Self, String> {
        match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err("top level is not an object".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn to_pretty(&self) -> String {
        // A Map of Values always serializes
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Names of the registered servers
    pub fn server_names(&self) -> Vec<String> {
        self.0
            .get(SERVERS_KEY)
            .and_then(Value::as_object)
            .map(|servers| servers.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_self_entry(&self) -> bool {
        self.0
            .get(SERVERS_KEY)
            .and_then(Value::as_object)
            .is_some_and(|servers| servers.contains_key(SELF_ENTRY_NAME))
    }
}

/// How this server is launched from mcp.json
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfEntry {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for SelfEntry {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SELF_COMMAND)
    }
}

impl SelfEntry {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec!["serve".to_string()],
        }
    }

    fn to_value(&self) -> Value {
        json!({
            "command": self.command,
            "args": self.args,
        })
    }
}

/// Copy of `doc` guaranteed to register this server.
///
/// An existing self entry is left as-is and no other entry is touched, so
/// applying this twice gives the same document as applying it once. A
/// `mcpServers` value that is not an object cannot hold entries and is replaced.
pub fn ensure_self_entry(doc: &Manifest, entry: &SelfEntry) -> Manifest {
    let mut map = doc.0.clone();
    let servers = map
        .entry(SERVERS_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !servers.is_object() {
        *servers = Value::Object(Map::new());
    }
    if let Value::Object(servers) = servers {
        servers
            .entry(SELF_ENTRY_NAME)
            .or_insert_with(|| entry.to_value());
    }
    Manifest(map)
}

/// Read a profile's manifest; `None` if it has none
pub fn read_manifest(paths: &Paths, profile: &str) -> ProfileResult<Option<Manifest>> {
    let path = paths.profile_manifest(profile);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ProfileError::io(&path, err)),
    };

    Manifest::parse(&content)
        .map(Some)
        .map_err(|message| ProfileError::InvalidManifest { path, message })
}

/// Overwrite a profile's manifest, creating parent directories as needed.
///
/// Uses atomic write pattern: write to temp file, then rename.
pub fn write_manifest(paths: &Paths, profile: &str, doc: &Manifest) -> ProfileResult<()> {
    let path = paths.profile_manifest(profile);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ProfileError::io(parent, e))?;
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, doc.to_pretty()).map_err(|e| ProfileError::io(&temp_path, e))?;
    fs::rename(&temp_path, &path).map_err(|e| ProfileError::io(&path, e))?;

    debug!(profile, path = %path.display(), "manifest written");
    Ok(())
}

/// Make sure `profile` registers this server. Returns whether it had to be repaired.
pub fn repair_self_entry(paths: &Paths, profile: &str, entry: &SelfEntry) -> ProfileResult<bool> {
    let current = read_manifest(paths, profile)?.unwrap_or_default();
    let repaired = ensure_self_entry(&current, entry);
    if repaired == current && paths.profile_manifest(profile).exists() {
        return Ok(false);
    }
    write_manifest(paths, profile, &repaired)?;
    Ok(true)
}

#[derive(Debug, Clone, Serialize)]
pub struct PropagationReport {
    pub source: String,
    /// Profiles whose manifest was written (the source only if it lacked the self entry)
    pub written: Vec<String>,
    pub servers: Vec<String>,
}

/// Copy `source`'s manifest (plus the self entry) into every profile.
pub fn propagate_to_all(
    store: &ProfileStore,
    _lock: &StoreLock,
    source: &str,
    entry: &SelfEntry,
) -> ProfileResult<PropagationReport> {
    if !store.exists(source) {
        return Err(ProfileError::ProfileNotFound(source.to_string()));
    }
    let paths = store.paths();
    let original = read_manifest(paths, source)?
        .ok_or_else(|| ProfileError::ManifestNotFound(source.to_string()))?;
    let doc = ensure_self_entry(&original, entry);

    let mut written = Vec::new();
    for name in store.names()? {
        if name == source && doc == original {
            continue;
        }
        write_manifest(paths, &name, &doc)?;
        written.push(name);
    }

    info!(source, count = written.len(), "manifest propagated");
    Ok(PropagationReport {
        source: source.to_string(),
        written,
        servers: doc.server_names(),
    })
}
