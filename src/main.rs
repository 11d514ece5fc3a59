use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use cursorprof::{
    commands,
    config::Config,
    logging,
    orchestrator::Engine,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "cursorprof")]
#[command(about = "Cursor Profile Switcher - isolated Cursor configurations with bound GitHub accounts")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Log debug output to stderr (overridden by CURSORPROF_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all available profiles
    #[command(alias = "ls")]
    List,

    /// Show the active profile and configuration root status
    #[command(alias = "status")]
    Current {
        /// Print a machine-readable overview
        #[arg(long)]
        json: bool,
    },

    /// Show detailed information about a profile
    Inspect {
        /// Name of the profile to inspect
        name: String,
    },

    /// Create a new profile from the current Cursor configuration
    #[command(alias = "add")]
    Init {
        /// Name of the profile to create
        name: String,

        /// Copy another profile instead of the live configuration
        #[arg(long, value_name = "PROFILE")]
        from: Option<String>,

        /// Open Cursor afterwards
        #[arg(long)]
        open: bool,
    },

    /// Switch to a profile (prompts when no name is given)
    Use {
        /// Name of the profile to activate
        name: Option<String>,

        /// Open Cursor afterwards
        #[arg(long)]
        open: bool,
    },

    /// Rename a profile
    Rename {
        old_name: String,
        new_name: String,
    },

    /// Copy one profile's mcp.json into every other profile
    Propagate {
        /// Profile whose mcp.json is copied
        source: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Bind a GitHub account to a profile
    Bind { profile: String, account: String },

    /// Remove a profile's GitHub binding
    Unbind { profile: String },

    /// Show the GitHub account bound to a profile (default: the active one)
    #[command(alias = "identity")]
    Whoami { profile: Option<String> },

    /// List GitHub accounts authenticated in gh
    Accounts,

    /// Embed a GitHub username into a repository's origin URL
    AlignRemote {
        /// Repository path
        #[arg(default_value = ".")]
        repo: PathBuf,

        /// Username (defaults to the active profile's binding)
        #[arg(long)]
        account: Option<String>,
    },

    /// Open Cursor
    Open,

    /// Run diagnostics on the cursorprof setup
    Doctor,

    /// Serve profile tools over stdio for the agent inside Cursor
    Serve,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "cursorprof", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::from_env()?;
    let engine = Engine::from_config(&config);
    let ui = Ui::new(cli.color, cli.no_color);

    match cli.command {
        Commands::List => commands::list(&engine, &ui),
        Commands::Current { json } => commands::current(&engine, json, &ui),
        Commands::Inspect { name } => commands::inspect(&engine, &name, &ui),
        Commands::Init { name, from, open } => {
            commands::init(&engine, &name, from.as_deref(), open, &ui)
        }
        Commands::Use { name, open } => commands::use_profile(&engine, name.as_deref(), open, &ui),
        Commands::Rename { old_name, new_name } => {
            commands::rename(&engine, &old_name, &new_name, &ui)
        }
        Commands::Propagate { source, yes } => commands::propagate(&engine, &source, yes, &ui),
        Commands::Bind { profile, account } => commands::bind(&engine, &profile, &account, &ui),
        Commands::Unbind { profile } => commands::unbind(&engine, &profile, &ui),
        Commands::Whoami { profile } => commands::whoami(&engine, profile.as_deref(), &ui),
        Commands::Accounts => commands::accounts(&engine, &ui),
        Commands::AlignRemote { repo, account } => {
            commands::align_remote(&engine, &repo, account.as_deref(), &ui)
        }
        Commands::Open => commands::open(&engine, &ui),
        Commands::Doctor => commands::doctor(&engine, &ui),
        Commands::Serve => commands::serve(&engine),
        Commands::Completions { .. } => Ok(()),
    }
}
