//! ReleaseDesk server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, starts the license expiry sweep and serves `/api/v1` over HTTP.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use releasedesk_server::{ServerConfig, build_state, shutdown_signal, spawn_expiry_sweep};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "ReleaseDesk control plane server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config)?;

  let state = build_state(&cfg).await?;
  let sweep = cfg
    .expiry_sweep()
    .map(|every| spawn_expiry_sweep(state.plane.clone(), every));

  let app = releasedesk_api::router(state).layer(TraceLayer::new_for_http());
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  if let Some(sweep) = sweep {
    sweep.abort();
  }
  Ok(())
}
