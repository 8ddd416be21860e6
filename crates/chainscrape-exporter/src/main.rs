//! chainscrape exporter binary.
//!
//! - Scrape endpoints under `/metrics/...`, one fan-out per request
//! - `/healthz`, `/readyz`, `/metrics` for operators
//! - Graceful shutdown on Ctrl-C / SIGTERM (readiness flips to draining)

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use chainscrape_core::error::{ExporterError, Result};
use chainscrape_exporter::{app_state::AppState, config, router};

#[derive(Debug, Parser)]
#[command(name = "chainscrape", version, about = "Per-scrape Prometheus exporter for Cosmos, EVM and Osmosis upstreams")]
struct Args {
    /// Path to the YAML config file.
    #[arg(long, env = "CHAINSCRAPE_CONFIG", default_value = "chainscrape.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "chainscrape exited with error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let path = args.config.to_string_lossy();
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.server.listen_addr()?;

    let state = AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path, "chainscrape starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| ExporterError::Internal(format!("bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .map_err(|e| ExporterError::Internal(format!("server: {e}")))?;

    tracing::info!("chainscrape stopped");
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    state.set_draining();
    tracing::info!("signal received, draining in-flight scrapes");
}
