mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, pending::PendingSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sitebot",
    about = "Chat-driven website content engine: apply edits, undo them, and manage the content repository",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file (default: read SITEBOT_* environment variables)
    #[arg(long, global = true, env = "SITEBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and chat webhook
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show row counts per content collection
    Status,

    /// Apply one content action given as JSON, e.g. '{"action":"update_stat",...}'
    Exec { action: String },

    /// Revert the most recent section edit
    Undo,

    /// List recent commits of the content repository
    Commits {
        /// Only commits touching this path
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Restore every file a commit changed to its parent's version
    Revert { sha: String },

    /// Manage pending confirmations
    Pending {
        #[command(subcommand)]
        subcommand: PendingSubcommand,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = cmd::load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Serve { port } => cmd::serve::run(config, port),
        Commands::Status => cmd::content::status(config, cli.json),
        Commands::Exec { action } => cmd::content::exec(config, &action, cli.json),
        Commands::Undo => cmd::content::undo(config, cli.json),
        Commands::Commits { path, limit } => cmd::commits::list(config, path, limit, cli.json),
        Commands::Revert { sha } => cmd::commits::revert(config, &sha, cli.json),
        Commands::Pending { subcommand } => cmd::pending::run(config, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
