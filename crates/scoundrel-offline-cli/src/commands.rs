//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use tracing::info;

use scoundrel_offline_core::{
    CacheStorage, DiskStorage, FetchOutcome, HttpNetwork, Network, OfflineCacheManager,
    OfflineNetwork, Request, RequestMode, ServiceWorker, WorkerConfig, WorkerHost, WorkerState,
};

use crate::config::Config;

/// Settings shared by every subcommand.
pub struct AppContext {
    pub config: Config,
    pub cache_dir: PathBuf,
}

impl AppContext {
    fn storage(&self) -> Result<Arc<DiskStorage>> {
        let storage = DiskStorage::new(self.cache_dir.clone())
            .with_context(|| format!("Failed to open cache directory {}", self.cache_dir.display()))?;
        Ok(Arc::new(storage))
    }

    fn network(worker: &WorkerConfig) -> Result<Arc<HttpNetwork>> {
        let network = HttpNetwork::with_timeout(Duration::from_secs(worker.request_timeout_secs))?;
        Ok(Arc::new(network))
    }
}

pub fn init(origin: String) -> Result<()> {
    let config = Config::load()?.with_origin(Some(origin));
    // Validate before writing
    let worker = config.worker_config()?;
    let path = config.save()?;
    println!("Saved origin {} to {}", worker.scope, path.display());
    Ok(())
}

pub async fn install(ctx: &AppContext) -> Result<()> {
    let worker = ctx.config.worker_config()?;
    let storage = ctx.storage()?;
    let network = AppContext::network(&worker)?;
    let manager = OfflineCacheManager::new(&worker, storage.clone(), network.clone())?;
    let shell_count = manager.app_shell().len();

    let host = WorkerHost::new(network);
    let state = host
        .register(Arc::new(manager))
        .await
        .with_context(|| format!("Install of {} failed", worker.cache_name))?;

    info!(cache = %worker.cache_name, state = %state, "Install finished");
    match state {
        WorkerState::Activated => {
            println!("Installed {} ({} resources cached)", worker.cache_name, shell_count);
            println!("Stores: {}", storage.keys().await?.join(", "));
        }
        other => println!("{} is {}", worker.cache_name, other),
    }
    Ok(())
}

pub struct FetchArgs {
    pub path: String,
    pub navigate: bool,
    pub method: String,
    pub offline: bool,
    pub print_body: bool,
}

pub async fn fetch(ctx: &AppContext, args: FetchArgs) -> Result<()> {
    let worker = ctx.config.worker_config()?;
    let storage = ctx.storage()?;
    let network: Arc<dyn Network> = if args.offline {
        Arc::new(OfflineNetwork)
    } else {
        AppContext::network(&worker)?
    };
    let manager = OfflineCacheManager::new(&worker, storage, network.clone())?;

    let method = parse_method(&args.method)?;
    let url = worker.resolve(&args.path)?;
    let mut request = Request::new(method, url);
    if args.navigate {
        request = request.with_mode(RequestMode::Navigate);
    }

    let outcome = manager.fetch(request.clone()).await?;
    match outcome {
        FetchOutcome::Passthrough => {
            let response = network.fetch(&request).await?;
            println!("{} {} (passthrough, {} bytes)", response.status, request.url, response.body.len());
            if args.print_body {
                println!("{}", response.text());
            }
        }
        FetchOutcome::Respond { response, source } => {
            println!("{} {} ({}, {} bytes)", response.status, request.url, source, response.body.len());
            if args.print_body {
                println!("{}", response.text());
            }
        }
        FetchOutcome::Unavailable => {
            eprintln!("{} is not cached and the network is unavailable", request.url);
        }
    }
    // Cache writes run detached; let them land before the runtime stops
    manager.flush_writes().await;
    Ok(())
}

pub async fn caches(ctx: &AppContext) -> Result<()> {
    let storage = ctx.storage()?;
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No cache stores in {}", ctx.cache_dir.display());
        return Ok(());
    }

    for name in names {
        let Some(cache) = storage.open_existing(&name).await? else {
            continue;
        };
        let entries = cache.entries().await?;
        println!("{} ({} entries)", name, entries.len());
        for entry in entries {
            println!(
                "  {} {} {} ({})",
                entry.data.response.status,
                entry.data.method,
                entry.data.key,
                entry.age_display()
            );
        }
    }
    Ok(())
}

pub async fn clear(ctx: &AppContext) -> Result<()> {
    let storage = ctx.storage()?;
    let names = storage.keys().await?;
    for name in &names {
        storage.delete(name).await?;
        println!("Deleted {}", name);
    }
    if names.is_empty() {
        println!("Nothing to delete");
    }
    Ok(())
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))
}
