//! Kiln Server - HTTP inference server
//!
//! Loads one compiled model at startup and serves single-shot generation
//! requests against it.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kiln_server::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    server::KilnServer,
};

/// Command line arguments
#[derive(Parser)]
#[command(
    name = "kiln-server",
    about = "Kiln LLM inference server",
    long_about = "Serves text generation from a compiled causal language model over HTTP: a status route at / and single-shot generation at /v1/generate."
)]
struct Args {
    /// Configuration file path (TOML or YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override server.host and server.port
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start,
    /// Generate a default configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "kiln-server.toml")]
        output: PathBuf,
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show server information
    Info,
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    let args = Args::parse();

    init_logging(&args)?;

    match args.command {
        Some(Commands::Config { ref output, force }) => generate_config(output, force),
        Some(Commands::Validate { ref config }) => validate_config(config),
        Some(Commands::Info) => {
            show_info();
            Ok(())
        }
        Some(Commands::Start) | None => start_server(args).await,
    }
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) -> ServerResult<()> {
    let log_level = args
        .log_level
        .parse::<Level>()
        .map_err(|_| ServerError::Config(format!("Invalid log level: {}", args.log_level)))?;

    let mut env_filter = EnvFilter::from_default_env();
    for target in ["kiln_server", "kiln_core", "tower_http"] {
        let directive = format!("{}={}", target, log_level)
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid log directive: {}", e)))?;
        env_filter = env_filter.add_directive(directive);
    }

    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(env_filter)
            .init();
    }

    Ok(())
}

/// Start the server
async fn start_server(args: Args) -> ServerResult<()> {
    info!("Starting Kiln Server v{}", kiln_server::VERSION);

    let mut config = if let Some(config_path) = args.config {
        info!("Loading configuration from: {:?}", config_path);
        ServerConfig::from_file(&config_path)
            .map_err(|e| ServerError::Config(format!("Failed to load config: {}", e)))?
    } else {
        info!("Using default configuration");
        ServerConfig::default()
    };

    if let Some(bind) = args.bind {
        config.server.host = bind.ip().to_string();
        config.server.port = bind.port();
    }

    let server = KilnServer::new(config)?;

    info!("Server configuration:");
    info!("  Model: {} ({})", server.config().model.name, server.config().model.precision);
    info!("  Model directory: {:?}", server.config().model_dir());
    info!("  Request timeout: {}s", server.config().limits.request_timeout_secs);

    server.start().await
}

/// Generate a default configuration file
fn generate_config(output: &Path, force: bool) -> ServerResult<()> {
    if output.exists() && !force {
        error!("Configuration file already exists: {:?}", output);
        error!("Use --force to overwrite");
        return Err(ServerError::Config(
            "Configuration file already exists".to_string(),
        ));
    }

    ServerConfig::default()
        .to_file(output)
        .map_err(|e| ServerError::Config(format!("Failed to write config: {}", e)))?;

    info!("Generated default configuration file: {:?}", output);
    Ok(())
}

/// Validate a configuration file
fn validate_config(config_path: &Path) -> ServerResult<()> {
    info!("Validating configuration file: {:?}", config_path);

    let config = ServerConfig::from_file(config_path).map_err(|e| {
        error!("Configuration validation failed: {}", e);
        ServerError::Config(format!("Invalid configuration: {}", e))
    })?;
    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    info!("Configuration is valid");
    info!("  Bind address: {}:{}", config.server.host, config.server.port);
    info!("  Model: {} ({})", config.model.name, config.model.precision);
    info!("  Model directory: {:?}", config.model_dir());
    if !config.model_dir().is_dir() {
        warn!("Model directory does not exist yet: {:?}", config.model_dir());
    }
    Ok(())
}

/// Show server information
fn show_info() {
    println!("Kiln Server v{}", kiln_server::VERSION);
    println!("HTTP inference server for compiled causal language models");
    println!();
    println!("Routes:");
    println!("  GET  /             model identity and precision");
    println!("  GET  /health       liveness");
    println!("  POST /v1/generate  single-shot text generation");
    println!();
    println!("Configuration:");
    println!("  Default bind address: 0.0.0.0:8000");
    println!("  Default models directory: ./models");
    println!("  Environment overrides: KILN_<SECTION>__<FIELD>");
    println!();
    println!("Usage:");
    println!("  kiln-server                          # Start with default config");
    println!("  kiln-server -c kiln-server.toml      # Start with custom config");
    println!("  kiln-server config                   # Generate default config");
    println!("  kiln-server validate kiln-server.toml");
}
