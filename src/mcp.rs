//! Stdio tool server (JSON-RPC 2.0, one message per line).
//!
//! Each engine operation is exposed as one tool. Tool failures are returned as
//! `isError` results carrying the error and its remedy; protocol failures use
//! JSON-RPC error objects. Logs go to stderr via `tracing`, never stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::ProfileError;
use crate::orchestrator::Engine;

pub const SERVER_NAME: &str = "cursor-profiles";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const OVERVIEW_URI: &str = "cursor://profiles";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Serve requests from `input` until EOF
pub fn serve<R: BufRead, W: Write>(engine: &Engine, input: R, mut output: W) -> Result<()> {
    info!(server = SERVER_NAME, version = env!("CARGO_PKG_VERSION"), "tool server started");

    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(line) {
            Ok(msg) => handle_message(engine, &msg),
            Err(e) => {
                warn!(error = %e, "unparseable request");
                Some(error_response(&Value::Null, PARSE_ERROR, &e.to_string()))
            }
        };

        if let Some(response) = response {
            let text = serde_json::to_string(&response).context("Failed to encode response")?;
            output.write_all(text.as_bytes())?;
            output.write_all(b"\n")?;
            output.flush()?;
        }
    }

    info!("stdin closed, tool server stopping");
    Ok(())
}

/// Answer one message. Notifications get no response.
pub fn handle_message(engine: &Engine, msg: &Value) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();
    let params = &msg["params"];
    debug!(method, "request");

    // Notifications carry no id
    let id = match id {
        Some(id) => id,
        None => return None,
    };

    let result = match method {
        "initialize" => json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {}, "resources": {} },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        }),
        "ping" => json!({}),
        "tools/list" => json!({ "tools": tool_definitions() }),
        "tools/call" => {
            let Some(name) = params["name"].as_str() else {
                return Some(error_response(&id, INVALID_PARAMS, "missing tool name"));
            };
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            call_tool(engine, name, &args)
        }
        "resources/list" => json!({
            "resources": [{
                "uri": OVERVIEW_URI,
                "name": "Cursor Profiles Overview",
                "mimeType": "application/json",
            }]
        }),
        "resources/read" => {
            let uri = params["uri"].as_str().unwrap_or("");
            if uri != OVERVIEW_URI {
                return Some(error_response(&id, INVALID_PARAMS, &format!("Unknown resource: {uri}")));
            }
            match engine.overview() {
                Ok(overview) => json!({
                    "contents": [{
                        "uri": OVERVIEW_URI,
                        "mimeType": "application/json",
                        "text": to_pretty(&overview),
                    }]
                }),
                Err(e) => return Some(error_response(&id, -32000, &e.to_string())),
            }
        }
        other => {
            return Some(error_response(&id, METHOD_NOT_FOUND, &format!("Unknown method: {other}")));
        }
    };

    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// MCP tool definition helper
fn tool_def(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

fn tool_definitions() -> Vec<Value> {
    let profile_name = json!({ "type": "string", "description": "Name of the profile" });
    let open = json!({ "type": "boolean", "description": "Open Cursor afterwards (default true)" });

    vec![
        tool_def("list_profiles", "List all Cursor profiles and which one is active", json!({}), &[]),
        tool_def(
            "switch_profile",
            "Switch to a Cursor profile and activate its bound GitHub account",
            json!({ "profile_name": profile_name, "open": open }),
            &["profile_name"],
        ),
        tool_def(
            "init_profile",
            "Create a new profile from the current Cursor configuration or another profile",
            json!({
                "profile_name": profile_name,
                "source_profile": { "type": "string", "description": "Profile to copy instead of the live configuration" },
                "open": open,
            }),
            &["profile_name"],
        ),
        tool_def(
            "rename_profile",
            "Rename an existing Cursor profile",
            json!({
                "old_name": { "type": "string", "description": "Current name of the profile" },
                "new_name": { "type": "string", "description": "New name for the profile" },
            }),
            &["old_name", "new_name"],
        ),
        tool_def("open_cursor", "Open Cursor with the current profile", json!({}), &[]),
        tool_def(
            "propagate_manifest",
            "Copy one profile's mcp.json into every other profile (replaces theirs)",
            json!({ "source_profile": profile_name }),
            &["source_profile"],
        ),
        tool_def(
            "bind_identity",
            "Bind a GitHub account to a profile; it is activated on switch",
            json!({
                "profile_name": profile_name,
                "account": { "type": "string", "description": "GitHub username known to gh" },
            }),
            &["profile_name", "account"],
        ),
        tool_def(
            "unbind_identity",
            "Remove a profile's GitHub account binding",
            json!({ "profile_name": profile_name }),
            &["profile_name"],
        ),
        tool_def(
            "get_identity",
            "Show the GitHub account bound to a profile",
            json!({ "profile_name": profile_name }),
            &["profile_name"],
        ),
        tool_def("list_accounts", "List GitHub accounts authenticated in gh", json!({}), &[]),
        tool_def(
            "align_remote",
            "Embed a GitHub username into a repository's https origin URL",
            json!({
                "repo_path": { "type": "string", "description": "Path to the git repository" },
                "account": { "type": "string", "description": "Username (defaults to the active profile's binding)" },
            }),
            &["repo_path"],
        ),
    ]
}

/// Outcome of one tool call before it is wrapped into a result
enum ToolError {
    Args(String),
    Engine(ProfileError),
}

impl From<ProfileError> for ToolError {
    fn from(e: ProfileError) -> Self {
        ToolError::Engine(e)
    }
}

fn call_tool(engine: &Engine, name: &str, args: &Value) -> Value {
    match dispatch(engine, name, args) {
        Ok(text) => json!({ "content": [{ "type": "text", "text": text }] }),
        Err(err) => {
            let text = match err {
                ToolError::Args(msg) => format!("Error: {msg}"),
                ToolError::Engine(e) => match e.remedy() {
                    Some(hint) => format!("Error: {e}\nHint: {hint}"),
                    None => format!("Error: {e}"),
                },
            };
            warn!(tool = name, "{}", text);
            json!({ "content": [{ "type": "text", "text": text }], "isError": true })
        }
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args[key]
        .as_str()
        .ok_or_else(|| ToolError::Args(format!("missing string argument '{key}'")))
}

fn opt_str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args[key].as_str().filter(|s| !s.is_empty())
}

fn to_pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn dispatch(engine: &Engine, name: &str, args: &Value) -> Result<String, ToolError> {
    let open = args["open"].as_bool().unwrap_or(true);

    match name {
        "list_profiles" => {
            let report = engine.list()?;
            if report.profiles.is_empty() {
                return Ok("No profiles found".to_string());
            }
            let mut lines = vec!["Available profiles:".to_string()];
            for p in &report.profiles {
                let marker = if p.is_active { "* " } else if p.inconsistent { "! " } else { "  " };
                let identity = p
                    .identity
                    .as_deref()
                    .map(|a| format!(" (github: {a})"))
                    .unwrap_or_default();
                lines.push(format!("{marker}{}{identity}", p.name));
            }
            if let Some(problem) = &report.problem {
                lines.push(format!("Warning: {problem}"));
            }
            Ok(lines.join("\n"))
        }
        "switch_profile" => {
            let profile = str_arg(args, "profile_name")?;
            let outcome = engine.switch(profile)?;
            let mut text = format!("Switched to profile '{}'", outcome.profile);
            if let Some(account) = &outcome.identity {
                text.push_str(&format!(", GitHub account '{account}' activated"));
            }
            if outcome.manifest_repaired {
                text.push_str(", restored cursor-profiles entry in mcp.json");
            }
            if open {
                engine.open_host()?;
                text.push_str(" and opened Cursor");
            }
            Ok(text)
        }
        "init_profile" => {
            let profile = str_arg(args, "profile_name")?;
            engine.init(profile, opt_str_arg(args, "source_profile"))?;
            let mut text = format!("Initialized new profile '{profile}'");
            if open {
                engine.open_host()?;
                text.push_str(" and opened Cursor");
            }
            Ok(text)
        }
        "rename_profile" => {
            let outcome = engine.rename(str_arg(args, "old_name")?, str_arg(args, "new_name")?)?;
            Ok(format!(
                "Renamed profile '{}' to '{}'",
                outcome.old_name, outcome.new_name
            ))
        }
        "open_cursor" => {
            engine.open_host()?;
            Ok("Opened Cursor application".to_string())
        }
        "propagate_manifest" => {
            let report = engine.propagate(str_arg(args, "source_profile")?)?;
            Ok(format!(
                "Propagated mcp.json from '{}' to {} profile(s): {}",
                report.source,
                report.written.len(),
                report.written.join(", ")
            ))
        }
        "bind_identity" => {
            let profile = str_arg(args, "profile_name")?;
            let account = str_arg(args, "account")?;
            engine.bind(profile, account)?;
            Ok(format!("Bound GitHub account '{account}' to profile '{profile}'"))
        }
        "unbind_identity" => {
            let profile = str_arg(args, "profile_name")?;
            Ok(if engine.unbind(profile)? {
                format!("Removed GitHub binding from profile '{profile}'")
            } else {
                format!("Profile '{profile}' had no GitHub binding")
            })
        }
        "get_identity" => {
            let profile = str_arg(args, "profile_name")?;
            Ok(match engine.lookup(profile)? {
                Some(account) => format!("Profile '{profile}' is bound to GitHub account '{account}'"),
                None => format!("Profile '{profile}' is not bound"),
            })
        }
        "list_accounts" => Ok(to_pretty(&engine.accounts()?)),
        "align_remote" => {
            let repo = str_arg(args, "repo_path")?;
            let aligned = engine.align_remote(Path::new(repo), opt_str_arg(args, "account"))?;
            Ok(format!("origin: {} -> {}", aligned.before, aligned.after))
        }
        other => Err(ToolError::Args(format!("Unknown tool: {other}"))),
    }
}
