//! webblock: command line companion to the webblock server.
//!
//! Watches the blocking decision live, reads the server aggregate, checks
//! whether a host would be blocked, and forwards agent hook events.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

/// webblock: block distracting sites unless an agent is working
#[derive(Parser)]
#[command(name = "webblock", version, about = "Block distracting sites unless a coding agent is working")]
struct Cli {
    /// Server port (overrides the config file)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the blocking decision live
    Watch,

    /// Print the server's current aggregate as JSON
    Status,

    /// Print whether a host is blocked right now
    Check {
        /// Host name or URL
        host: String,
    },

    /// Post a hook payload read from stdin
    Hook {
        /// Override the payload's hook_event_name
        #[arg(short, long)]
        event: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("webblock=debug,webblock_client=debug,webblock_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("webblock=warn,webblock_client=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.clone().unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".webblock").join("config.toml")
    });
    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("webblock: {e:#}");
            std::process::exit(1);
        }
    };
    let sync_config = cfg.sync_config(cli.port);

    let result = match cli.command {
        Command::Watch => commands::watch::run(sync_config).await,
        Command::Status => commands::status::run(&sync_config).await,
        Command::Check { host } => {
            commands::check::run(sync_config, &cfg.domain_list(), &host).await
        }
        Command::Hook { event } => commands::hook::run(&sync_config, event.as_deref()).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("webblock: {e:#}");
        std::process::exit(1);
    }
}
