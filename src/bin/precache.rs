use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use precache::{AppConfig, CacheFirst, DiskStorage, HttpNetwork, ServiceWorker};
use tokio_util::sync::CancellationToken;

fn print_usage() {
    eprintln!("Usage: precache [OPTIONS]");
    eprintln!();
    eprintln!("Pre-caches the configured assets, then serves them cache-first");
    eprintln!("in front of the configured origin.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>  Config file (default: {})", AppConfig::default_path().display());
    eprintln!("  --install-only       Pre-cache assets and exit");
    eprintln!("  -h, --help           Show this help");
    eprintln!();
    eprintln!("Logging is controlled by RUST_LOG (default: info).");
}

struct Args {
    config: PathBuf,
    install_only: bool,
}

fn parse_args() -> Args {
    let mut config = AppConfig::default_path();
    let mut install_only = false;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                if i < args.len() {
                    config = PathBuf::from(&args[i]);
                } else {
                    eprintln!("Error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--install-only" => install_only = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Error: unknown argument {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Args {
        config,
        install_only,
    }
}

/// Resolves when SIGINT or (on Unix) SIGTERM is received.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                    _ = sigterm.recv() => log::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
                log::info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("Received SIGINT");
    }
}

#[tokio::main]
async fn main() -> precache::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    let config = AppConfig::load_or_create(&args.config)?;
    log::info!("Loaded config from {}", args.config.display());

    let storage = DiskStorage::new(config.storage.resolved_dir());
    log::info!("Cache storage: {}", storage.root().display());
    let network = HttpNetwork::new(config.network.origin.clone())?;
    log::info!("Origin: {}", network.origin());

    let cache_name = config.cache.cache_name.clone();
    let worker = Arc::new(CacheFirst::new(config.cache, storage, network));

    if let Err(e) = worker.on_install().await {
        log::error!("Install failed: {e}");
        std::process::exit(1);
    }

    if args.install_only {
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    precache::server::serve(worker, &cache_name, &config.server, shutdown).await
}
