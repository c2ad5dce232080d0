use anyhow::Context;
use clap::Parser;
use film_checkout::app::config::Config;
use film_checkout::{router, AppState};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "film-checkout", about = "Film storefront checkout and watch-progress service")]
struct Cli {
    /// TOML file layered over the environment
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides PORT / server_port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    info!(
        port = config.server_port,
        mode = ?config.payment_mode,
        backend = ?config.gateway_backend,
        "Starting film checkout server"
    );

    let port = config.server_port;
    let state = AppState::from_config(config)
        .await
        .context("building application state")?;
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
