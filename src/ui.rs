//! Terminal output for cursorprof.
//!
//! Everything user-facing goes through [`Ui`]: labelled status lines, doctor
//! check lines, borderless tables with profile/identity/root cells, and
//! spinners. Diagnostics go through `tracing` to stderr instead.
//!
//! Color is disabled by `--no-color`, then `NO_COLOR`, then `TERM=dumb`, then
//! by `--color never` or a non-TTY stdout.

use anstream::{eprintln, println};
use anstyle::{AnsiColor, Color, Style};
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets};
use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::io::IsTerminal;
use std::time::Duration;

use crate::redirect::RootStatus;

/// Value of `--color`
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Always,
    #[default]
    Auto,
    Never,
}

impl std::str::FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "auto" => Ok(Self::Auto),
            "never" => Ok(Self::Never),
            _ => Err(format!("invalid color mode: {}", s)),
        }
    }
}

/// How a line or cell should read: fine, suspicious, broken, or neutral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Good,
    Warn,
    Bad,
    Note,
}

impl Tone {
    fn ansi(self) -> AnsiColor {
        match self {
            Tone::Good => AnsiColor::Green,
            Tone::Warn => AnsiColor::Yellow,
            Tone::Bad => AnsiColor::Red,
            Tone::Note => AnsiColor::Cyan,
        }
    }

    fn table_color(self) -> comfy_table::Color {
        match self {
            Tone::Good => comfy_table::Color::Green,
            Tone::Warn => comfy_table::Color::Yellow,
            Tone::Bad => comfy_table::Color::Red,
            Tone::Note => comfy_table::Color::Cyan,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Tone::Good => "OK",
            Tone::Warn => "WARN",
            Tone::Bad => "ERROR",
            Tone::Note => "INFO",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ui {
    pub color_enabled: bool,
    /// Spinners need both color and a TTY
    pub spinner_enabled: bool,
}

impl Ui {
    pub fn new(mode: ColorMode, force_no_color: bool) -> Self {
        let is_tty = std::io::stdout().is_terminal();
        let env_disabled = std::env::var_os("NO_COLOR").is_some()
            || std::env::var("TERM").is_ok_and(|t| t == "dumb");

        let color_enabled = !force_no_color
            && !env_disabled
            && match mode {
                ColorMode::Always => true,
                ColorMode::Never => false,
                ColorMode::Auto => is_tty,
            };

        if !color_enabled {
            anstream::ColorChoice::write_global(anstream::ColorChoice::Never);
        }

        Self {
            color_enabled,
            spinner_enabled: color_enabled && is_tty,
        }
    }

    fn paint(&self, s: &str, style: Style) -> String {
        if self.color_enabled {
            format!("{style}{s}{style:#}")
        } else {
            s.to_string()
        }
    }

    // Labelled status lines ------------------------------------------------

    fn labelled(&self, tone: Tone, msg: &str) {
        let label = self.paint(
            tone.label(),
            Style::new().fg_color(Some(Color::Ansi(tone.ansi()))).bold(),
        );
        if tone == Tone::Bad {
            eprintln!("{label} {msg}");
        } else {
            println!("{label} {msg}");
        }
    }

    pub fn ok(&self, msg: impl AsRef<str>) {
        self.labelled(Tone::Good, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.labelled(Tone::Warn, msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.labelled(Tone::Note, msg.as_ref());
    }

    // Inline styling -------------------------------------------------------

    pub fn bold(&self, s: impl AsRef<str>) -> String {
        self.paint(s.as_ref(), Style::new().bold())
    }

    pub fn dim(&self, s: impl AsRef<str>) -> String {
        self.paint(
            s.as_ref(),
            Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
        )
    }

    pub fn tinted(&self, s: impl AsRef<str>, tone: Tone) -> String {
        self.paint(s.as_ref(), Style::new().fg_color(Some(Color::Ansi(tone.ansi()))))
    }

    /// Status glyph, with an ASCII fallback when color is off
    pub fn icon(&self, tone: Tone) -> &'static str {
        match (tone, self.color_enabled) {
            (Tone::Good, true) => "✓",
            (Tone::Good, false) => "[OK]",
            (Tone::Warn, true) => "⚠",
            (Tone::Warn, false) => "[!]",
            (Tone::Bad, true) => "✗",
            (Tone::Bad, false) => "[X]",
            (Tone::Note, true) => "•",
            (Tone::Note, false) => "-",
        }
    }

    /// One doctor finding under a "Checking ..." heading
    pub fn check(&self, tone: Tone, msg: impl AsRef<str>) {
        println!("  {} {}", self.icon(tone), msg.as_ref());
    }

    /// A finding about one item inside a check (one profile, one binding)
    pub fn check_item(&self, tone: Tone, msg: impl AsRef<str>) {
        println!("    {} {}", self.icon(tone), msg.as_ref());
    }

    // Tables ---------------------------------------------------------------

    /// Borderless table; every listing in the CLI uses this
    pub fn grid(&self) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.load_preset(presets::NOTHING);
        table
    }

    pub fn cell(&self, content: impl Into<String>) -> Cell {
        Cell::new(content.into())
    }

    pub fn header_cell(&self, content: impl Into<String>) -> Cell {
        let cell = Cell::new(content.into());
        if self.color_enabled {
            cell.add_attribute(Attribute::Bold)
        } else {
            cell
        }
    }

    /// Colored through comfy-table so column widths stay right
    pub fn tinted_cell(&self, content: impl Into<String>, tone: Tone) -> Cell {
        let cell = Cell::new(content.into());
        if self.color_enabled {
            cell.fg(tone.table_color())
        } else {
            cell
        }
    }

    /// Marker and status cells for one profile row
    pub fn profile_state_cells(&self, is_active: bool, inconsistent: bool) -> [Cell; 2] {
        if is_active {
            [
                self.cell(self.icon(Tone::Good)),
                self.tinted_cell("active", Tone::Good),
            ]
        } else if inconsistent {
            [
                self.cell(self.icon(Tone::Warn)),
                self.tinted_cell("half-linked", Tone::Warn),
            ]
        } else {
            [self.cell(" "), self.cell("-")]
        }
    }

    /// A bound GitHub account, or a muted placeholder
    pub fn identity_cell(&self, account: Option<&str>) -> Cell {
        match account {
            Some(account) => self.cell(account),
            None => self.tinted_cell("(not bound)", Tone::Note),
        }
    }

    /// What sits at a real configuration root
    pub fn root_cell(&self, status: &RootStatus) -> Cell {
        match status {
            RootStatus::Missing => self.tinted_cell("missing", Tone::Warn),
            RootStatus::Directory => self.cell("unmanaged directory"),
            RootStatus::Symlink { target } => self.cell(format!("symlink → {}", target.display())),
            RootStatus::BrokenSymlink { target } => {
                self.tinted_cell(format!("broken symlink → {}", target.display()), Tone::Bad)
            }
        }
    }

    // Spinners -------------------------------------------------------------

    /// Spinner for a mutation; hidden when spinners are disabled
    pub fn spinner(&self, message: impl Into<Cow<'static, str>>) -> ProgressBar {
        let pb = if self.spinner_enabled {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
            }
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(message);
        pb
    }

    /// Replace the spinner with a final line. `Tone::Bad` lands on stderr when
    /// spinners are off.
    pub fn spinner_done(&self, pb: &ProgressBar, tone: Tone, msg: impl Into<Cow<'static, str>>) {
        let msg = msg.into();
        if self.spinner_enabled {
            if let Ok(style) = ProgressStyle::with_template("{msg}") {
                pb.set_style(style);
            }
            let icon = self.tinted(self.icon(tone), tone);
            pb.finish_with_message(format!("{icon} {msg}"));
        } else {
            pb.finish_and_clear();
            self.labelled(tone, &msg);
        }
    }

    // Plain output ---------------------------------------------------------

    pub fn println(&self, msg: impl AsRef<str>) {
        println!("{}", msg.as_ref());
    }

    pub fn newline(&self) {
        println!();
    }

    pub fn section(&self, title: impl AsRef<str>) {
        println!("{}", self.bold(title));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn plain() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    #[test]
    fn test_color_mode_parse() {
        assert_eq!("ALWAYS".parse::<ColorMode>().unwrap(), ColorMode::Always);
        assert_eq!("auto".parse::<ColorMode>().unwrap(), ColorMode::Auto);
        assert_eq!("never".parse::<ColorMode>().unwrap(), ColorMode::Never);
        assert!("sometimes".parse::<ColorMode>().is_err());
    }

    #[test]
    fn test_no_color_flag_wins_over_always() {
        let ui = Ui::new(ColorMode::Always, true);
        assert!(!ui.color_enabled);
        assert!(!ui.spinner_enabled);
    }

    #[test]
    fn test_plain_icons_and_styling() {
        let ui = plain();
        assert_eq!(ui.icon(Tone::Good), "[OK]");
        assert_eq!(ui.icon(Tone::Bad), "[X]");
        assert_eq!(ui.icon(Tone::Warn), "[!]");
        assert_eq!(ui.dim("x"), "x");
        assert_eq!(ui.tinted("x", Tone::Good), "x");
    }

    #[test]
    fn test_profile_rows_render() {
        let ui = plain();
        let mut table = ui.grid();
        for (name, active, half) in [("work", true, false), ("personal", false, true)] {
            let [marker, status] = ui.profile_state_cells(active, half);
            table.add_row(vec![marker, ui.cell(name), ui.identity_cell(None), status]);
        }
        let rendered = table.to_string();
        assert!(rendered.contains("active"));
        assert!(rendered.contains("half-linked"));
        assert!(rendered.contains("(not bound)"));
    }

    #[test]
    fn test_root_cell_shows_link_target() {
        let ui = plain();
        let mut table = ui.grid();
        table.add_row(vec![ui.root_cell(&RootStatus::BrokenSymlink {
            target: PathBuf::from("/store/gone/primary"),
        })]);
        assert!(table.to_string().contains("broken symlink → /store/gone/primary"));
    }

    #[test]
    fn test_hidden_spinner_finishes() {
        let ui = plain();
        let pb = ui.spinner("working");
        ui.spinner_done(&pb, Tone::Good, "done");
        assert!(pb.is_finished());
    }
}
