//! Kiln CLI - command-line client for the Kiln inference server
//!
//! Checks server status and sends single generation requests, reporting the
//! server's token accounting alongside client-side timing.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

mod client;
mod commands;
mod config;
mod utils;

use commands::{generate::GenerateCommand, status::StatusCommand, Command};

#[derive(Parser)]
#[command(
    name = "kiln",
    version = env!("CARGO_PKG_VERSION"),
    about = "Kiln inference server client",
    long_about = "Query a running kiln-server: check its status or send a prompt and report the generated text, token usage and timing."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Server configuration file to read host and port from
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    config: Option<PathBuf>,

    /// Server host, overrides the configuration file
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port, overrides the configuration file
    #[arg(long, global = true)]
    port: Option<u16>,

    /// JSON output format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the server's model and precision
    #[command(name = "status", alias = "s")]
    Status(StatusCommand),

    /// Generate text from a prompt
    #[command(name = "generate", alias = "g")]
    Generate(GenerateCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    debug!("Kiln CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(cli.config.as_deref())?
        .with_overrides(cli.host.clone(), cli.port);
    debug!("Configuration loaded: {:?}", config);

    let result = match cli.command {
        Commands::Status(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Generate(cmd) => cmd.execute(&config, cli.json).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
