//! aegisctl - operator tooling for the Aegis governance core
//!
//! - Verify the audit chain and its signed checkpoints
//! - Force checkpoints and tail recent entries
//! - Generate the ledger signing key
//! - Inspect the council constitution, effective configuration and tool policies

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use aegis_types::AegisConfig;
use commands::{council, ledger, policy};

/// Exit status when the ledger fails verification.
const EXIT_INTEGRITY_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(name = "aegisctl")]
#[command(about = "Aegis - governance and authorization core", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "AEGIS_CONFIG")]
    config: Option<PathBuf>,

    /// Ledger data directory (overrides the configuration file)
    #[arg(short, long, env = "AEGIS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "AEGIS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "AEGIS_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the hash chain and every checkpoint signature
    Verify,

    /// Write a signed checkpoint over the current chain
    Checkpoint,

    /// Print the most recent ledger entries
    Tail {
        /// Number of entries
        #[arg(short, default_value_t = 20)]
        n: usize,

        /// Print entries as JSON lines
        #[arg(long)]
        raw: bool,
    },

    /// Generate the ledger signing key
    Keygen {
        /// Replace an existing key. Existing checkpoints will no longer verify.
        #[arg(long)]
        force: bool,
    },

    /// Show council seats, pillars and veto domains
    Council,

    /// Inspect tool policies
    Policy {
        #[command(subcommand)]
        command: policy::PolicyCommands,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut config = AegisConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.ledger.data_dir = dir;
    }

    match cli.command {
        Commands::Verify => {
            if !ledger::verify(&config.ledger).await? {
                std::process::exit(EXIT_INTEGRITY_FAILURE);
            }
            Ok(())
        }
        Commands::Checkpoint => ledger::checkpoint(&config.ledger).await,
        Commands::Tail { n, raw } => ledger::tail(&config.ledger, n, raw).await,
        Commands::Keygen { force } => ledger::keygen(&config.ledger, force).await,
        Commands::Council => council::show(&config.council),
        Commands::Policy { command } => policy::execute(command, &config),
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
