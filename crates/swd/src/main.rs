//! swd - offline cache worker daemon
//!
//! Sits in front of a static site, answers every request through the active
//! cache worker and exposes the worker's message, push and update events as
//! `/__worker/*` endpoints.

mod host;
mod network;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swstore::CacheStorage;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use url::Url;

use crate::host::DaemonHost;
use crate::network::UpstreamNetwork;
use crate::server::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Upstream site that same-origin requests are fetched from
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    upstream: String,

    /// Cache storage directory
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// Worker config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    info!("Starting swd v{}", env!("CARGO_PKG_VERSION"));
    info!("Binding to {}", args.bind);
    info!("Upstream: {}", args.upstream);
    info!("Data directory: {}", args.data.display());

    std::fs::create_dir_all(&args.data)
        .with_context(|| format!("creating data directory {}", args.data.display()))?;
    let storage = Arc::new(
        CacheStorage::open(&args.data)
            .with_context(|| format!("opening cache storage in {}", args.data.display()))?,
    );
    info!(buckets = ?storage.keys(), "cache storage opened");

    let config = match &args.config {
        Some(path) => swcache::WorkerConfig::load(path)
            .with_context(|| format!("loading worker config {}", path.display()))?,
        None => swcache::WorkerConfig::default(),
    };
    let origin = config.origin_url().context("parsing worker origin")?;
    let upstream = Url::parse(&args.upstream).context("parsing --upstream")?;

    let network = Arc::new(UpstreamNetwork::new(
        origin.clone(),
        upstream,
        Duration::from_secs(args.timeout_secs),
    )?);
    let state = Arc::new(AppState::new(
        storage,
        network,
        Arc::new(DaemonHost::new()),
        args.config.clone(),
        origin.clone(),
    ));

    // Without a worker every request still passes through to the upstream
    match state.install_generation().await {
        Ok(worker) => info!(version = worker.version(), state = %worker.state(), "worker registered"),
        Err(e) => warn!(error = %e, "initial install failed, passing requests through"),
    }

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!("Server listening on {}", args.bind);

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║          swd Offline Cache Worker Ready!                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!("\n📡 SITE:");
    println!("   Origin:    {}", origin);
    println!("   Listening: http://{}", args.bind);
    println!("   Upstream:  {}", args.upstream);
    println!("\n🛠  CONTROL:");
    println!("   Stats:     curl http://{}/__worker/stats", args.bind);
    println!(
        "   Version:   curl -d '{{\"type\":\"GET_VERSION\"}}' -H 'content-type: application/json' http://{}/__worker/message",
        args.bind
    );
    println!("   Update:    curl -X POST http://{}/__worker/update", args.bind);
    println!("\n🛑 Press Ctrl+C to stop\n");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
