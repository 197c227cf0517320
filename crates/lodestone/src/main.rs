//! Lodestone CLI
//!
//! ```bash
//! # Show the dependency graph recorded in a project's lock artifact
//! lodestone deps Game/Game.toml --target net8.0
//!
//! # List the package upgrades a set of projects needs
//! lodestone plan Game/Game.toml Game.Shared/Game.Shared.toml
//!
//! # Load projects, applying upgrades without asking
//! lodestone load Game/Game.toml --upgrade-policy always
//!
//! # Convert a binary content file to its text form
//! lodestone content scene.bin --to text -o scene.json
//! ```

use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use lodestone::commands::{
    self, content::ContentArgs, deps::DepsArgs, load::LoadArgs, plan::PlanArgs,
};
use lodestone::config::LodestoneConfig;
use lodestone::utils::{LogFormat, LogLevel, setup_logs};
use std::path::PathBuf;
use tracing::{debug, error};

#[derive(Parser)]
#[command(
    name = "lodestone",
    version = env!("CARGO_PKG_VERSION"),
    about = "Loads project sessions: dependency graphs, package upgrades and binaries"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Set log level (overrides --verbose/--quiet)
    #[arg(long, global = true, value_enum)]
    log: Option<LogLevel>,

    /// Set log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Configuration file path (defaults to the nearest Lodestone.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    directory: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dependency graph of a project
    Deps(DepsArgs),

    /// List required package upgrades without applying them
    Plan(PlanArgs),

    /// Load projects and their dependencies
    Load(LoadArgs),

    /// Convert content between binary and text encodings
    Content(ContentArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli
        .log
        .unwrap_or_else(|| LogLevel::from_flags(cli.verbose, cli.quiet));
    setup_logs(level, cli.log_format)?;

    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to change directory to {}", dir.display()))?;
        debug!("Changed working directory to: {}", dir.display());
    }

    let cwd = std::env::current_dir()?;
    let config = LodestoneConfig::load(cli.config.as_deref(), &cwd)?;

    let result = match cli.command {
        Commands::Deps(args) => commands::deps_command(args, &config).await,
        Commands::Plan(args) => commands::plan_command(args, &config).await,
        Commands::Load(args) => commands::load_command(args, &config).await,
        Commands::Content(args) => commands::content_command(args, &config).await,
    };

    if let Err(err) = result {
        error!("{err:#}");
        if cli.verbose > 0 {
            error!(?err, "detailed error context");
        }
        std::process::exit(1);
    }
    Ok(())
}
