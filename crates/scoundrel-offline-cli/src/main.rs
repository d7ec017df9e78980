//! Scoundrel offline - drive the offline cache from the command line.
//!
//! Precaches the app shell for a deployed Scoundrel build, fetches through
//! the same cache policies the browser worker applies, and inspects or
//! clears the on-disk stores.

mod commands;
mod config;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{AppContext, FetchArgs};
use config::{Config, ORIGIN_ENV};

/// Log file prefix inside --log-dir
const LOG_FILE_PREFIX: &str = "scoundrel-offline.log";

#[derive(Parser)]
#[command(name = "scoundrel-offline")]
#[command(author, version, about = "Offline cache manager for the Scoundrel web game")]
struct Cli {
    /// Scope URL of the deployed app (overrides config and SCOUNDREL_ORIGIN)
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Directory holding the cache stores
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Also write daily-rotated logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the app origin to the config file
    Init {
        /// Scope URL, e.g. https://play.example/scoundrel/
        origin: String,
    },

    /// Precache the app shell and activate it, purging older stores
    Install,

    /// Fetch a path through the cache policies
    Fetch {
        /// Path relative to the scope, e.g. ./css/main.css
        path: String,

        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,

        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,

        /// Act as if the network were down
        #[arg(long)]
        offline: bool,

        /// Print the response body
        #[arg(long)]
        body: bool,
    },

    /// List stores and their entries
    Caches,

    /// Delete every store
    Clear,
}

/// Initialize the tracing subscriber. The returned guard flushes the file
/// writer and must live until exit.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // RUST_LOG controls the level, e.g. RUST_LOG=scoundrel_offline_core=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref());
    info!("Scoundrel offline starting");

    if let Commands::Init { origin } = cli.command {
        return commands::init(origin);
    }

    let config = Config::load()?
        .with_origin(std::env::var(ORIGIN_ENV).ok())
        .with_origin(cli.origin);
    let cache_dir = match cli.cache_dir {
        Some(dir) => dir,
        None => Config::cache_dir()?,
    };
    let ctx = AppContext { config, cache_dir };

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Install => commands::install(&ctx).await,
        Commands::Fetch {
            path,
            navigate,
            method,
            offline,
            body,
        } => {
            let args = FetchArgs {
                path,
                navigate,
                method,
                offline,
                print_body: body,
            };
            commands::fetch(&ctx, args).await
        }
        Commands::Caches => commands::caches(&ctx).await,
        Commands::Clear => commands::clear(&ctx).await,
    }
}
