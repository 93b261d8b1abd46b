//! Edge CLI - Command line tool for edge fragment delivery.
//!
//! Commands:
//! - `edge encode` - Build a fragment path
//! - `edge decode` - Parse a fragment path
//! - `edge tag` - Render the inclusion markup for a fragment
//! - `edge seed` - Inspect or rotate the context seed
//! - `edge cookies` - Issue or revoke context cookies for a principal
//! - `edge config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use edge_observability::{init_logging, LogFormat, LogLevel};

use commands::{ConfigArgs, CookiesArgs, DecodeArgs, EncodeArgs, SeedArgs, TagArgs};

/// Edge CLI - Inspect and operate personalized edge fragments
#[derive(Parser)]
#[command(name = "edge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a fragment path
    Encode(EncodeArgs),

    /// Decode a fragment path
    Decode(DecodeArgs),

    /// Render the inclusion tag for a fragment
    Tag(TagArgs),

    /// Inspect or rotate the context seed
    Seed(SeedArgs),

    /// Issue or revoke context cookies
    Cookies(CookiesArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    init_logging(LogFormat::Human, level);

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;
    tracing::debug!(config = ?ctx.config_path, "cli context loaded");

    // Execute command
    let result = match cli.command {
        Commands::Encode(args) => commands::url::encode(args, &ctx),
        Commands::Decode(args) => commands::url::decode(args, &ctx),
        Commands::Tag(args) => commands::tag::run(args, &ctx),
        Commands::Seed(args) => commands::seed::run(args, &ctx),
        Commands::Cookies(args) => commands::cookies::run(args, &ctx),
        Commands::Config(args) => commands::config::run(args, &ctx),
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
