//! # mq-putget CLI
//!
//! Command-line interface for the MQ put/get client.
//!
//! This module provides CLI commands for:
//! - Running the endless put/get loop until interrupted
//! - Probing the queue manager with a single cycle
//! - Validating and showing the resolved configuration
//! - Generating shell completions
//!
//! Logs go to stderr; stdout carries only the status report.

use clap::{CommandFactory, Parser, Subcommand};
use putget_runtime::{
    AppConfig, ConfigurationError, ConnectionFactory, CycleController, LuckyNumber,
    StatusReporter,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// System-wide configuration file, without extension
pub const SYSTEM_CONFIG_FILE: &str = "/etc/mq-putget/config";

/// Deployment-local configuration file, without extension
pub const LOCAL_CONFIG_FILE: &str = "config/putget";

/// Prefix of configuration environment variables, e.g. `PUTGET__BROKER__HOST`
pub const ENV_PREFIX: &str = "PUTGET";

// ============================================================================
// CLI Structure
// ============================================================================

/// mq-putget - Put and get messages on an IBM MQ queue
#[derive(Parser)]
#[command(name = "mq-putget")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Put and get messages on an IBM MQ queue")]
#[command(
    long_about = "Repeatedly sends one message to a queue, receives one message back and reports SUCCESS or FAILURE for every cycle"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PUTGET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive; RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Warm up, then run put/get cycles until interrupted
    Run,

    /// Run a single cycle without warm-up or trailing delay
    Probe,

    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigurationError),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point.
///
/// Returns the process exit code derived from the last cycle status.
pub async fn run_cli() -> Result<i32, CliError> {
    let cli = Cli::parse();

    // Initialize logging
    initialize_logging(&cli)?;

    // Completions need no configuration
    if let Commands::Completions { shell } = cli.command {
        execute_completions_command(shell, &mut io::stdout())?;
        return Ok(0);
    }

    // Load configuration
    let config = load_configuration(cli.config.as_deref())?;

    // Execute command
    match cli.command {
        Commands::Run => execute_run_command(&config).await,
        Commands::Probe => execute_probe_command(&config, io::stdout()).await,
        Commands::Config { show } => {
            execute_config_command(&config, show, &mut io::stdout())?;
            Ok(0)
        }
        Commands::Completions { .. } => Ok(0),
    }
}

// ============================================================================
// Logging and Configuration
// ============================================================================

/// Build the log filter from a level or directive string
pub fn log_filter(level: &str) -> Result<EnvFilter, CliError> {
    EnvFilter::try_new(level).map_err(|e| CliError::InvalidArgument {
        arg: "--log-level".to_string(),
        message: e.to_string(),
    })
}

/// Initialize logging based on CLI arguments
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => log_filter(&cli.log_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("Failed to initialize logging: {}", e),
    })
}

/// Load configuration from files and environment, then validate it.
///
/// Sources (applied in order, later sources override earlier ones):
///  1. `/etc/mq-putget/config.{toml,yaml,json}`, optional
///  2. `./config/putget.{toml,yaml,json}`, optional
///  3. the explicit `--config` file, required when given
///  4. environment variables prefixed `PUTGET__` with `__` separators
pub fn load_configuration(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name(SYSTEM_CONFIG_FILE).required(false))
        .add_source(config::File::with_name(LOCAL_CONFIG_FILE).required(false));

    if let Some(path) = config_path {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: AppConfig = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

fn build_controller<W: Write>(
    config: &AppConfig,
    out: W,
    shutdown: CancellationToken,
) -> Result<CycleController<W>, CliError> {
    let credentials = config.credentials.load();
    if credentials.is_anonymous() {
        info!(
            user_env = %config.credentials.user_env,
            password_env = %config.credentials.password_env,
            "No credentials found; connecting without authentication"
        );
    }

    let factory =
        ConnectionFactory::from_config(config, credentials).map_err(ConfigError::from)?;

    Ok(CycleController::new(
        factory,
        config.queue.name.clone(),
        config.cycle.timings(),
        StatusReporter::new(out),
        shutdown,
    )
    .with_payloads(LuckyNumber::new(config.message.prefix.clone())))
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), stopping after the current cycle");
        },
        _ = terminate => {
            info!("Received SIGTERM, stopping after the current cycle");
        },
    }
}

/// Execute run command
async fn execute_run_command(config: &AppConfig) -> Result<i32, CliError> {
    let shutdown = CancellationToken::new();
    let mut controller = build_controller(config, io::stdout(), shutdown.clone())?;

    let signal_listener = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let result = controller.run().await;
    signal_listener.abort();

    let exit_status = result?;
    if exit_status.last().is_none() {
        warn!("Stopped before any cycle completed");
    }
    Ok(exit_status.exit_code())
}

/// Execute probe command, writing the status report to `out`
pub async fn execute_probe_command<W: Write>(config: &AppConfig, out: W) -> Result<i32, CliError> {
    let mut controller = build_controller(config, out, CancellationToken::new())?;

    let outcome = controller.probe().await?;
    info!(
        status = %outcome.status,
        failed_phase = ?outcome.failed_phase,
        "Probe finished"
    );

    Ok(outcome.status.exit_code())
}

/// Execute config command
pub fn execute_config_command<W: Write>(
    config: &AppConfig,
    show: bool,
    out: &mut W,
) -> Result<(), CliError> {
    if show {
        let rendered = toml::to_string_pretty(config).map_err(ConfigError::from)?;
        write!(out, "{}", rendered)?;
    } else {
        writeln!(
            out,
            "Configuration is valid: queue {} on {}:{} ({})",
            config.queue.name, config.broker.host, config.broker.port, config.transport
        )?;
    }
    Ok(())
}

/// Execute completions command
pub fn execute_completions_command<W: Write>(
    shell: clap_complete::Shell,
    out: &mut W,
) -> Result<(), CliError> {
    info!(shell = ?shell, "Generating shell completions");

    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "mq-putget", out);
    Ok(())
}
