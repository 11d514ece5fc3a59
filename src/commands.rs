//! Handler functions for each CLI subcommand.
//!
//! Everything here goes through [`Engine`]; this layer only adds prompts,
//! tables and spinners. Engine errors are converted with [`hinted`] so the
//! user sees the remedy under the message.

use anyhow::{Context, Result, anyhow, bail};
use inquire::{Confirm, Select};
use std::io;
use std::path::Path;

use crate::doctor::run_doctor;
use crate::error::ProfileError;
use crate::fs_utils::dir_size;
use crate::manifest::read_manifest;
use crate::mcp;
use crate::orchestrator::Engine;
use crate::redirect::RootStatus;
use crate::roots::RootKind;
use crate::ui::{Tone, Ui};

/// Attach the error's remedy as a `Hint:` line
pub fn hinted(err: ProfileError) -> anyhow::Error {
    match err.remedy() {
        Some(hint) => anyhow!("{err}\nHint: {hint}"),
        None => anyhow::Error::new(err),
    }
}

/// List all available profiles
pub fn list(engine: &Engine, ui: &Ui) -> Result<()> {
    let report = engine.list().map_err(hinted)?;

    if report.profiles.is_empty() {
        ui.warn("No profiles found.");
        ui.newline();
        ui.println("Create one from your current Cursor setup with:");
        ui.println(format!("  {} init <name>", ui.bold("cursorprof")));
        return Ok(());
    }

    let mut table = ui.grid();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("GitHub"),
        ui.header_cell("Status"),
    ]);

    for p in &report.profiles {
        let [marker, status] = ui.profile_state_cells(p.is_active, p.inconsistent);
        table.add_row(vec![
            marker,
            ui.cell(&p.name),
            ui.identity_cell(p.identity.as_deref()),
            status,
        ]);
    }

    ui.section("Profiles");
    ui.println(table.to_string());

    if let Some(problem) = &report.problem {
        ui.newline();
        ui.warn(problem);
        ui.println(format!(
            "  Run {} to repair.",
            ui.bold("cursorprof use <name>")
        ));
    }

    Ok(())
}

/// Show the active profile and what sits at each configuration root
pub fn current(engine: &Engine, json: bool, ui: &Ui) -> Result<()> {
    if json {
        let overview = engine.overview().map_err(hinted)?;
        ui.println(serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    let paths = engine.paths();
    let redirection = engine.redirection();

    ui.section("Current Profile");
    ui.newline();

    let mut table = ui.grid();
    match redirection.active() {
        Some(name) => {
            table.add_row(vec![ui.cell("Active profile:"), ui.header_cell(name)]);
            let identity = engine.lookup(name).map_err(hinted)?;
            table.add_row(vec![ui.cell("GitHub account:"), ui.identity_cell(identity.as_deref())]);
        }
        None => {
            table.add_row(vec![ui.cell("Active profile:"), ui.cell("(none)")]);
        }
    }

    for kind in RootKind::all() {
        let status = RootStatus::detect(paths.real_root(kind));
        table.add_row(vec![ui.cell(format!("{}:", kind.display_name())), ui.root_cell(&status)]);
    }

    ui.println(table.to_string());

    if let Err(e) = redirection.check() {
        ui.newline();
        ui.warn(e.to_string());
    }
    Ok(())
}

/// Show detailed information about a profile
pub fn inspect(engine: &Engine, name: &str, ui: &Ui) -> Result<()> {
    if !engine.store().exists(name) {
        bail!(
            "Profile '{}' does not exist.\nHint: Use 'cursorprof list' to see available profiles.",
            name
        );
    }
    let paths = engine.paths();
    let is_active = engine.redirection().active() == Some(name);

    ui.section(format!("Profile: {}", name));
    ui.newline();

    let mut table = ui.grid();
    table.add_row(vec![
        ui.cell("Location:"),
        ui.cell(paths.profile_dir(name).display().to_string()),
    ]);
    table.add_row(vec![
        ui.cell("Active:"),
        if is_active {
            ui.tinted_cell("yes", Tone::Good)
        } else {
            ui.cell("no")
        },
    ]);
    let identity = engine.lookup(name).map_err(hinted)?;
    table.add_row(vec![ui.cell("GitHub account:"), ui.identity_cell(identity.as_deref())]);
    ui.println(table.to_string());
    ui.newline();

    ui.section("Snapshots");
    ui.newline();
    let mut snap_table = ui.grid();
    snap_table.set_header(vec![
        ui.header_cell("Root"),
        ui.header_cell("Path"),
        ui.header_cell("Size"),
    ]);
    for kind in RootKind::all() {
        let path = paths.snapshot(name, kind);
        let size = if path.is_dir() {
            ui.cell(format_bytes(calculate_size(&path)?))
        } else {
            ui.tinted_cell("missing", Tone::Bad)
        };
        snap_table.add_row(vec![
            ui.cell(kind.display_name()),
            ui.cell(path.display().to_string()),
            size,
        ]);
    }
    ui.println(snap_table.to_string());
    ui.newline();

    ui.section("mcp.json");
    match read_manifest(paths, name) {
        Ok(Some(manifest)) => {
            let servers = manifest.server_names();
            ui.println(format!(
                "  Servers: {}",
                if servers.is_empty() { "(none)".to_string() } else { servers.join(", ") }
            ));
            if manifest.has_self_entry() {
                ui.check(Tone::Good, "cursor-profiles entry present");
            } else {
                ui.check(Tone::Warn, "cursor-profiles entry missing (restored on next switch)");
            }
        }
        Ok(None) => ui.check(Tone::Note, "no mcp.json"),
        Err(e) => ui.check(Tone::Bad, e.to_string()),
    }

    Ok(())
}

fn calculate_size(path: &Path) -> Result<u64> {
    dir_size(path).with_context(|| format!("Failed to calculate size for {}", path.display()))
}

/// Format bytes as human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Create a profile from the live configuration or another profile
pub fn init(engine: &Engine, name: &str, from: Option<&str>, open: bool, ui: &Ui) -> Result<()> {
    let spinner = ui.spinner(format!("Creating profile '{}'...", name));

    if let Err(e) = engine.init(name, from) {
        ui.spinner_done(&spinner, Tone::Bad, format!("Failed to create profile: {}", e));
        return Err(hinted(e));
    }

    let origin = match from {
        Some(source) => format!("copied from '{}'", source),
        None => "from current Cursor configuration".to_string(),
    };
    ui.spinner_done(&spinner, Tone::Good, format!("Created profile '{}' ({})", name, origin));

    if open {
        engine.open_host().map_err(hinted)?;
        ui.info("Opened Cursor");
    } else {
        ui.newline();
        ui.println("To activate it:");
        ui.println(format!("  cursorprof use {}", name));
    }
    Ok(())
}

/// Pick a profile interactively when none was given on the command line
fn select_profile(engine: &Engine) -> Result<String> {
    let report = engine.list().map_err(hinted)?;
    let options: Vec<String> = report
        .profiles
        .iter()
        .filter(|p| !p.is_active)
        .map(|p| p.name.clone())
        .collect();

    if options.is_empty() {
        bail!("No other profiles to switch to.\nHint: Create one with 'cursorprof init <name>'.");
    }

    Select::new("Switch to which profile?", options)
        .prompt()
        .context("Profile selection cancelled")
}

/// Switch to a profile
pub fn use_profile(engine: &Engine, name: Option<&str>, open: bool, ui: &Ui) -> Result<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => select_profile(engine)?,
    };

    let spinner = ui.spinner(format!("Switching to profile '{}'...", name));

    let outcome = match engine.switch(&name) {
        Ok(outcome) => outcome,
        Err(e) => {
            ui.spinner_done(&spinner, Tone::Bad, format!("Failed to switch: {}", e));
            return Err(hinted(e));
        }
    };
    ui.spinner_done(&spinner, Tone::Good, format!("Active profile: {}", outcome.profile));

    if let Some(account) = &outcome.identity {
        ui.ok(format!("GitHub account: {}", account));
    }
    if outcome.manifest_repaired {
        ui.info("Restored the cursor-profiles entry in mcp.json");
    }
    if open {
        engine.open_host().map_err(hinted)?;
        ui.info("Opened Cursor");
    }
    Ok(())
}

/// Rename a profile, carrying its identity binding
pub fn rename(engine: &Engine, old_name: &str, new_name: &str, ui: &Ui) -> Result<()> {
    let outcome = engine.rename(old_name, new_name).map_err(hinted)?;
    ui.ok(format!("Renamed profile '{}' to '{}'", outcome.old_name, outcome.new_name));
    if outcome.was_active {
        ui.info("It is still the active profile");
    }
    if outcome.identity_moved {
        ui.info("GitHub binding moved with it");
    }
    Ok(())
}

/// Overwrite every profile's mcp.json with the source's
pub fn propagate(engine: &Engine, source: &str, yes: bool, ui: &Ui) -> Result<()> {
    if !yes {
        let others = engine
            .store()
            .names()
            .map_err(hinted)?
            .into_iter()
            .filter(|n| n != source)
            .count();
        let confirmed = Confirm::new(&format!(
            "Replace mcp.json in {} other profile(s) with the one from '{}'?",
            others, source
        ))
        .with_default(false)
        .with_help_message("Servers that only exist in other profiles will be lost")
        .prompt()
        .context("Confirmation cancelled")?;
        if !confirmed {
            ui.warn("Nothing changed");
            return Ok(());
        }
    }

    let report = engine.propagate(source).map_err(hinted)?;
    ui.ok(format!(
        "Propagated mcp.json from '{}' to {} profile(s)",
        report.source,
        report.written.len()
    ));
    for name in &report.written {
        ui.check(Tone::Good, name);
    }
    ui.println(ui.dim(format!("Servers: {}", report.servers.join(", "))));
    Ok(())
}

pub fn bind(engine: &Engine, profile: &str, account: &str, ui: &Ui) -> Result<()> {
    engine.bind(profile, account).map_err(hinted)?;
    ui.ok(format!("Bound GitHub account '{}' to profile '{}'", account, profile));
    Ok(())
}

pub fn unbind(engine: &Engine, profile: &str, ui: &Ui) -> Result<()> {
    if engine.unbind(profile).map_err(hinted)? {
        ui.ok(format!("Removed GitHub binding from '{}'", profile));
    } else {
        ui.info(format!("Profile '{}' had no GitHub binding", profile));
    }
    Ok(())
}

/// Show the identity of a profile, or of the active one
pub fn whoami(engine: &Engine, profile: Option<&str>, ui: &Ui) -> Result<()> {
    let profile = match profile {
        Some(p) => p.to_string(),
        None => match engine.redirection().active() {
            Some(active) => active.to_string(),
            None => bail!("No profile is active.\nHint: Pass a profile name or run 'cursorprof use <name>'."),
        },
    };

    match engine.lookup(&profile).map_err(hinted)? {
        Some(account) => ui.println(format!("{} → {}", profile, ui.bold(account))),
        None => ui.println(format!("{} → {}", profile, ui.dim("(not bound)"))),
    }
    Ok(())
}

/// List accounts known to gh
pub fn accounts(engine: &Engine, ui: &Ui) -> Result<()> {
    let status = engine.accounts().map_err(hinted)?;
    ui.section("GitHub accounts");
    for account in &status.accounts {
        if status.active.as_deref() == Some(account.as_str()) {
            ui.check(Tone::Good, ui.tinted(account, Tone::Good));
        } else {
            ui.println(format!("    {}", account));
        }
    }
    Ok(())
}

pub fn align_remote(engine: &Engine, repo: &Path, account: Option<&str>, ui: &Ui) -> Result<()> {
    let aligned = engine.align_remote(repo, account).map_err(hinted)?;
    if aligned.before == aligned.after {
        ui.info(format!("origin already uses '{}'", aligned.account));
    } else {
        ui.ok(format!("origin now uses '{}'", aligned.account));
        ui.println(ui.dim(format!("  {} → {}", aligned.before, aligned.after)));
    }
    Ok(())
}

pub fn open(engine: &Engine, ui: &Ui) -> Result<()> {
    engine.open_host().map_err(hinted)?;
    ui.ok("Opened Cursor");
    Ok(())
}

pub fn doctor(engine: &Engine, ui: &Ui) -> Result<()> {
    run_doctor(engine, ui);
    Ok(())
}

/// Run the tool server on stdin/stdout until stdin closes
pub fn serve(engine: &Engine) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    mcp::serve(engine, stdin.lock(), stdout.lock())
}
