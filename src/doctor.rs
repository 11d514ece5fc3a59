//! Diagnostics for `cursorprof doctor`.
//!
//! Checks the state directory, both configuration roots, the profile store,
//! the identities file and the external tools, printing pass/warn/fail lines.
//! Nothing here mutates disk.

use crate::identity::IdentityBook;
use crate::manifest::read_manifest;
use crate::orchestrator::Engine;
use crate::redirect::{Pointer, Redirection, RootStatus};
use crate::roots::RootKind;
use crate::ui::{Tone, Ui};

/// Run the doctor diagnostics. Returns whether every check passed.
pub fn run_doctor(engine: &Engine, ui: &Ui) -> bool {
    let paths = engine.paths();
    let mut healthy = true;

    ui.section("cursorprof Doctor");
    ui.newline();

    healthy &= check_step(ui, "Directories", || {
        for (label, dir) in [("State directory", &paths.state_dir), ("Profile store", &paths.store_root)] {
            if dir.is_dir() {
                ui.check(Tone::Good, format!("{} exists: {}", label, dir.display()));
            } else {
                // Created on first init
                ui.check(Tone::Warn, format!("{} missing: {}", label, dir.display()));
            }
        }
        true
    });

    healthy &= check_step(ui, "Configuration Roots", || {
        let mut ok = true;
        for kind in RootKind::all() {
            let root = paths.real_root(kind);
            let name = kind.display_name();
            match RootStatus::detect(root) {
                RootStatus::Missing => {
                    ui.check(Tone::Warn, format!("{} missing: {}", name, root.display()))
                }
                RootStatus::Directory => ui.check(
                    Tone::Note,
                    format!("{} is a plain directory (adopted on first switch)", name),
                ),
                RootStatus::Symlink { .. } => match Pointer::read(paths, kind) {
                    Pointer::Profile(profile) => {
                        ui.check(Tone::Good, format!("{} → profile '{}'", name, profile))
                    }
                    other => {
                        ui.check(
                            Tone::Bad,
                            format!("{} points outside the store: {}", name, other.describe()),
                        );
                        ok = false;
                    }
                },
                RootStatus::BrokenSymlink { target } => {
                    ui.check(
                        Tone::Bad,
                        format!("{} is a BROKEN symlink to {}", name, target.display()),
                    );
                    ok = false;
                }
            }
        }
        ok
    });

    healthy &= check_step(ui, "Active Profile", || match engine.redirection() {
        Redirection::Unset => {
            ui.check(Tone::Note, "No profile active");
            true
        }
        Redirection::Active(name) => {
            ui.check(Tone::Good, format!("Both roots agree on '{}'", name));
            match read_manifest(paths, &name) {
                Ok(Some(m)) if m.has_self_entry() => {
                    ui.check(Tone::Good, "mcp.json registers cursor-profiles")
                }
                Ok(_) => ui.check(
                    Tone::Warn,
                    "mcp.json lacks the cursor-profiles entry (fixed on next switch)",
                ),
                Err(e) => {
                    ui.check(Tone::Bad, e.to_string());
                    return false;
                }
            }
            true
        }
        bad => {
            if let Err(e) = bad.check() {
                ui.check(Tone::Bad, e.to_string());
            }
            false
        }
    });

    healthy &= check_step(ui, "Profiles", || {
        let names = match engine.store().names() {
            Ok(n) => n,
            Err(e) => {
                ui.check(Tone::Bad, format!("Failed to list profiles: {}", e));
                return false;
            }
        };
        if names.is_empty() {
            ui.check(Tone::Warn, "No profiles found");
            return true;
        }

        ui.println(format!("  Found {} profiles:", names.len()));
        let mut all_valid = true;
        for name in names {
            let missing: Vec<&str> = RootKind::all()
                .into_iter()
                .filter(|k| !paths.snapshot(&name, *k).is_dir())
                .map(|k| k.display_name())
                .collect();
            let manifest = read_manifest(paths, &name);

            if let Err(e) = &manifest {
                ui.check_item(Tone::Bad, format!("{} ({})", name, e));
                all_valid = false;
            } else if !missing.is_empty() {
                ui.check_item(
                    Tone::Bad,
                    format!("{} (missing snapshot: {})", name, missing.join(", ")),
                );
                all_valid = false;
            } else {
                ui.check_item(Tone::Good, name);
            }
        }
        all_valid
    });

    healthy &= check_step(ui, "Identities", || match IdentityBook::read(&paths.identities_file) {
        Ok(book) => {
            ui.check(Tone::Good, format!("{} binding(s)", book.bindings.len()));
            for (profile, binding) in &book.bindings {
                if !engine.store().exists(profile) {
                    ui.check_item(
                        Tone::Warn,
                        format!("'{}' → {} refers to a missing profile", profile, binding.account),
                    );
                }
            }
            true
        }
        Err(e) => {
            ui.check(Tone::Bad, e.to_string());
            false
        }
    });

    healthy &= check_step(ui, "Environment", || {
        match engine.is_host_running() {
            Ok(true) => ui.check(Tone::Warn, "Cursor is running (switching will be refused)"),
            Ok(false) => ui.check(Tone::Good, "Cursor is not running"),
            Err(e) => ui.check(Tone::Warn, e.to_string()),
        }
        match engine.accounts() {
            Ok(status) => ui.check(
                Tone::Good,
                format!(
                    "gh knows {} account(s), active: {}",
                    status.accounts.len(),
                    status.active.as_deref().unwrap_or("(none)")
                ),
            ),
            Err(e) => ui.check(Tone::Note, format!("gh unavailable: {}", e)),
        }
        true
    });

    healthy
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> bool
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.tinted("  Issues detected!", Tone::Bad));
    }
    ui.newline();
    success
}
