use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use repobridge::bridge::UploadPackBridge;
use repobridge::config::{self, Config};
use repobridge::deps::MemoryPackageIndex;
use repobridge::git::LocalGit;
use repobridge::metrics::MetricsRegistry;
use repobridge::sync::{self, Orchestrator};
use repobridge::upstream::{CommandRefresher, HttpDispatcher, HttpLister};
use repobridge::{directory, http, AppState};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "repobridge",
    about = "Repository sync orchestrator and Git smart-HTTP bridge"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/repobridge/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: Arc<AppState>, listen: &str) -> Result<()> {
    let app = http::handler::create_router(state);

    let listen_addr: std::net::SocketAddr =
        listen.parse().context("invalid http_listen address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Config reload
// ---------------------------------------------------------------------------

/// Re-read the config file on every SIGHUP.  Invalid files are logged and
/// the previous configuration stays live.
#[cfg(unix)]
async fn run_config_reloader(path: String, tx: watch::Sender<Arc<Config>>) -> Result<()> {
    let mut hangup = signal::unix::signal(signal::unix::SignalKind::hangup())
        .context("failed to install SIGHUP handler")?;

    while hangup.recv().await.is_some() {
        match config::load_config(&path) {
            Ok(config) => {
                tracing::info!(
                    config_path = %path,
                    hosts = config.hosts.len(),
                    "configuration reloaded"
                );
                tx.send_replace(Arc::new(config));
            }
            Err(e) => {
                tracing::error!(
                    config_path = %path,
                    error = %format!("{e:#}"),
                    "configuration reload failed; keeping previous"
                );
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn run_config_reloader(_path: String, tx: watch::Sender<Arc<Config>>) -> Result<()> {
    tx.closed().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = Arc::new(config::load_config(&cli.config)?);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting repobridge");

    // ---- Ensure the repository root exists ----
    tokio::fs::create_dir_all(&config.git.repos_root)
        .await
        .with_context(|| {
            format!(
                "failed to create repository root: {}",
                config.git.repos_root
            )
        })?;

    // ---- Collaborators ----
    let timeout = Duration::from_secs(config.sync.request_timeout_secs);
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("repobridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build reqwest client")?;

    let metrics = MetricsRegistry::new();
    let git = Arc::new(LocalGit::new(&config.git));
    let directory = directory::build_directory(&config.directory, http_client.clone(), timeout);
    tracing::info!(backend = ?config.directory, "repository directory initialised");

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(HttpLister::new(http_client.clone(), &config.gitserver.url, timeout)),
        Arc::clone(&directory),
        Arc::new(HttpDispatcher::new(http_client, &config.repo_updater.url, timeout)),
        git.clone(),
        Arc::new(CommandRefresher::new(timeout)),
        metrics.clone(),
    ));

    // ---- App state ----
    let (config_tx, config_rx) = watch::channel(Arc::clone(&config));
    let state = Arc::new(AppState {
        config: config_rx.clone(),
        repos_root: git.repos_root().to_path_buf(),
        directory: Arc::clone(&directory),
        bridge: UploadPackBridge::new(directory, git),
        orchestrator: Arc::clone(&orchestrator),
        packages: Arc::new(MemoryPackageIndex::new(&config.packages)),
        metrics,
    });

    // ---- Spawn services ----
    let http_handle = tokio::spawn({
        let s = Arc::clone(&state);
        let listen = config.server.http_listen.clone();
        async move {
            if let Err(e) = run_http_server(s, &listen).await {
                tracing::error!(error = %e, "HTTP server failed");
            }
        }
    });

    let scheduler_handle = tokio::spawn(sync::scheduler::run_scheduler(orchestrator, config_rx));

    let reload_handle = tokio::spawn({
        let path = cli.config.clone();
        async move {
            if let Err(e) = run_config_reloader(path, config_tx).await {
                tracing::error!(error = %e, "config reloader failed");
            }
        }
    });

    // ---- Await shutdown ----
    // The HTTP server returns once the shutdown signal fires; background
    // tasks are then stopped.
    let _ = http_handle.await;
    scheduler_handle.abort();
    reload_handle.abort();

    tracing::info!("repobridge shut down cleanly");
    Ok(())
}
