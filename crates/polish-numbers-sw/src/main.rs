//! polish-numbers-sw - offline cache host for the polish-numbers page.
//!
//! Installs the page's assets into a local cache and answers requests from
//! it, falling back to the origin server for anything not cached.

mod config;
mod server;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use polish_numbers_core::{
    DiskStorage, HttpNetwork, OfflineCacheManager, Request, ServiceWorker, CACHE_NAME,
};

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "polish-numbers.log";

const USAGE: &str = "\
Usage: polish-numbers-sw [COMMAND]

Commands:
  serve         Install if needed, then proxy requests through the cache (default)
  install       Fetch and cache every page asset
  fetch <path>  Answer one GET request and report where it came from
  list          Show cached entries
  help          Show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Serve,
    Install,
    Fetch(String),
    List,
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        match args.first().map(String::as_str) {
            None | Some("serve") => Ok(Command::Serve),
            Some("install") => Ok(Command::Install),
            Some("fetch") => args
                .get(1)
                .map(|path| Command::Fetch(path.clone()))
                .ok_or_else(|| anyhow::anyhow!("fetch requires a path, e.g. /audio/1.mp3")),
            Some("list") => Ok(Command::List),
            Some("help") | Some("--help") | Some("-h") => Ok(Command::Help),
            Some(other) => Err(anyhow::anyhow!("Unknown command: {}\n\n{}", other, USAGE)),
        }
    }
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
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

fn build_worker(config: &Config) -> Result<ServiceWorker> {
    let cache_dir = config.cache_dir()?;
    let storage = DiskStorage::new(cache_dir.clone())
        .with_context(|| format!("Failed to open cache storage at {}", cache_dir.display()))?;
    let network = HttpNetwork::new(&config.origin)
        .with_context(|| format!("Invalid origin: {}", config.origin))?;

    let manager = OfflineCacheManager::new(Arc::new(storage), Arc::new(network));
    Ok(ServiceWorker::new(manager))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());
    info!(origin = %config.origin, command = ?command, "polish-numbers-sw starting");

    let worker = build_worker(&config)?;
    match command {
        Command::Install => install(&worker).await,
        Command::Fetch(path) => fetch(&worker, &path).await,
        Command::List => list(&worker).await,
        Command::Serve => serve(worker, &config).await,
        Command::Help => Ok(()),
    }
}

async fn install(worker: &ServiceWorker) -> Result<()> {
    worker.install().await.context("Could not cache page assets")?;
    println!(
        "Cached {} assets in {}",
        worker.manager().manifest().len(),
        CACHE_NAME
    );
    Ok(())
}

async fn fetch(worker: &ServiceWorker, path: &str) -> Result<()> {
    if !worker.restore().await? {
        warn!("Cache not installed, request is not controlled");
    }
    let served = worker
        .handle_fetch(Request::get(path))
        .await
        .with_context(|| format!("Failed to fetch {}", path))?;
    println!(
        "{} {} ({} bytes from {})",
        served.response.status,
        path,
        served.response.body.len(),
        served.source
    );
    Ok(())
}

async fn list(worker: &ServiceWorker) -> Result<()> {
    let Some(bucket) = worker.manager().storage().get(CACHE_NAME).await? else {
        println!("{} has not been created", CACHE_NAME);
        return Ok(());
    };
    let entries = bucket.entries().await?;
    for entry in &entries {
        println!(
            "{:<28} {} {:>9} bytes  {}",
            entry.key,
            entry.status,
            entry.size,
            entry.age_display()
        );
    }
    println!("{} entries in {}", entries.len(), CACHE_NAME);
    Ok(())
}

async fn serve(worker: ServiceWorker, config: &Config) -> Result<()> {
    if !worker.restore().await? {
        // The page still works uncontrolled; the install is retried on next start
        if let Err(e) = worker.install().await {
            warn!(error = %e, "Serving without offline cache");
        }
    }
    server::run_proxy(Arc::new(worker), &config.listen).await
}
