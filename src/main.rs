//! MutantWhats CLI entry point.
//!
//! Provides `serve` to run the webhook server with the built-in echo logic,
//! and `config` to print the resolved configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use mutantwhats_bridge::bot::{Bot, ChannelAccount, EchoBot, TraceMiddleware};
use mutantwhats_bridge::config::Config;
use mutantwhats_bridge::mutantwhats::{AdapterOptions, MutantWhatsAdapter};

/// MutantWhats bridge: bot-framework channel adapter for the MutantWhats messaging API.
#[derive(Parser)]
#[command(name = "mutantwhats-bridge", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the webhook server.
    Serve {
        /// Listen address (overrides config).
        #[arg(long)]
        bind: Option<String>,
        /// Listen port (overrides config).
        #[arg(long, short)]
        port: Option<u16>,
    },
    /// Print the resolved configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `.env` is optional; real env vars take precedence over it.
    let dotenv = dotenvy::dotenv();
    let config = mutantwhats_bridge::logging::with_startup_logging("info", Config::load)
        .context("failed to load configuration")?;

    match cli.command {
        Command::Serve { bind, port } => handle_serve(config, bind, port, dotenv.ok()).await,
        Command::Config => handle_config(&config),
    }
}

/// Run the webhook server until Ctrl+C.
async fn handle_serve(
    mut config: Config,
    bind: Option<String>,
    port: Option<u16>,
    dotenv_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let _logging_guard = match config.logging.dir.as_deref() {
        Some(dir) => Some(mutantwhats_bridge::logging::init_production(
            &PathBuf::from(dir),
            &config.logging.level,
        )?),
        None => {
            mutantwhats_bridge::logging::init_cli(&config.logging.level)?;
            None
        }
    };
    if let Some(path) = dotenv_path {
        info!(path = %path.display(), "loaded environment file");
    }

    let bot_account = ChannelAccount::bot(config.bot.id.clone(), config.bot.name.clone());
    let adapter = MutantWhatsAdapter::new(bot_account, AdapterOptions::from(&config.adapter))
        .with_middleware(Arc::new(TraceMiddleware));
    let logic: Arc<dyn Bot> = Arc::new(EchoBot::new(config.bot.greeting.clone()));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        debug = config.adapter.debug,
        strict_delivery = config.adapter.strict_delivery,
        "starting mutantwhats"
    );
    mutantwhats_bridge::server::serve(&config.server, Arc::new(adapter), logic).await
}

/// Print the resolved configuration.
fn handle_config(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
