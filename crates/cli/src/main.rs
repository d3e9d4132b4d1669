//! Switchboard CLI: the main entry point.
//!
//! Commands:
//! - `run`      Start every enabled channel and answer messages
//! - `chat`     Interactive terminal chat or single-message mode
//! - `contacts` Manage the contact whitelist
//! - `onboard`  Write a default config and contacts file
//! - `doctor`   Diagnose configuration

use clap::{Parser, Subcommand};
use switchboard_config::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard: a support agent answering chat channels with tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start all enabled channels
    Run,

    /// Chat with the agent from the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Manage whitelisted contacts
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },

    /// Initialize configuration
    Onboard,

    /// Diagnose configuration and files
    Doctor,
}

#[derive(Subcommand)]
pub enum ContactsAction {
    /// Authorize a contact
    Add { id: String },
    /// Revoke a contact
    Remove { id: String },
    /// Print every authorized contact
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it parses; commands
    // that need the config load it again and report errors properly.
    let logging = AppConfig::load().map(|c| c.logging).unwrap_or_default();
    init_tracing(&logging, cli.verbose);

    match cli.command {
        Commands::Run => commands::run::run().await,
        Commands::Chat { message } => commands::chat::run(message).await,
        Commands::Contacts { action } => commands::contacts::run(action),
        Commands::Onboard => commands::onboard::run(),
        Commands::Doctor => commands::doctor::run(),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
