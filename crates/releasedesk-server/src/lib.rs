//! Process shell for the ReleaseDesk control plane: configuration, store
//! wiring and background maintenance.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use chrono::Utc;
use releasedesk_api::{AppState, PackageStorage};
use releasedesk_core::{
  ControlPlane, ControlPlaneOptions, RequestContext, store::Store,
};
use releasedesk_store_sqlite::{SqliteAuditSink, SqliteStore};
use serde::Deserialize;
use tokio::task::JoinHandle;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `RELEASEDESK_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "defaults::host")]
  pub host:                 String,
  #[serde(default = "defaults::port")]
  pub port:                 u16,
  #[serde(default = "defaults::store_path")]
  pub store_path:           PathBuf,
  #[serde(default = "defaults::package_dir")]
  pub package_dir:          PathBuf,
  #[serde(default = "defaults::request_timeout_secs")]
  pub request_timeout_secs: u64,
  #[serde(default = "defaults::cache_ttl_secs")]
  pub cache_ttl_secs:       u64,
  /// Interval of the license expiry sweep; `0` disables it.
  #[serde(default = "defaults::expiry_sweep_secs")]
  pub expiry_sweep_secs:    u64,
  #[serde(default = "defaults::max_upload_bytes")]
  pub max_upload_bytes:     usize,
}

mod defaults {
  use std::path::PathBuf;

  pub fn host() -> String { "127.0.0.1".to_string() }
  pub fn port() -> u16 { 8080 }
  pub fn store_path() -> PathBuf { PathBuf::from("releasedesk.db") }
  pub fn package_dir() -> PathBuf { PathBuf::from("storage/packages") }
  pub fn request_timeout_secs() -> u64 { 30 }
  pub fn cache_ttl_secs() -> u64 { 300 }
  pub fn expiry_sweep_secs() -> u64 { 3600 }
  pub fn max_upload_bytes() -> usize { releasedesk_api::DEFAULT_MAX_UPLOAD_BYTES }
}

impl ServerConfig {
  /// Layer the optional TOML file at `path` under `RELEASEDESK_*` variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("RELEASEDESK"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn expiry_sweep(&self) -> Option<Duration> {
    (self.expiry_sweep_secs > 0).then(|| Duration::from_secs(self.expiry_sweep_secs))
  }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

/// Open the SQLite store named by `cfg` and assemble the application state.
pub async fn build_state(cfg: &ServerConfig) -> anyhow::Result<Arc<AppState<SqliteStore>>> {
  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let plane = ControlPlane::new(Arc::new(store.clone()), ControlPlaneOptions {
    audit:     Arc::new(SqliteAuditSink::new(store)),
    cache_ttl: Duration::from_secs(cfg.cache_ttl_secs),
  });
  let packages = PackageStorage::new(expand_tilde(&cfg.package_dir));

  let state = AppState::new(plane, packages)
    .with_request_timeout(Duration::from_secs(cfg.request_timeout_secs))
    .with_max_upload_bytes(cfg.max_upload_bytes);
  Ok(Arc::new(state))
}

/// Periodically move lapsed time-based licenses to `expired`.
pub fn spawn_expiry_sweep<S: Store>(
  plane: ControlPlane<S>,
  every: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    loop {
      ticker.tick().await;
      match plane
        .accountant
        .expire_overdue(&RequestContext::system(), Utc::now())
        .await
      {
        Ok(expired) if expired.is_empty() => {}
        Ok(expired) => tracing::info!(count = expired.len(), "expired overdue licenses"),
        Err(e) => tracing::warn!("license expiry sweep failed: {e}"),
      }
    }
  })
}

/// Resolve once the process receives Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::warn!("failed to listen for Ctrl-C: {e}");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
      Ok(mut sigterm) => {
        sigterm.recv().await;
      }
      Err(e) => {
        tracing::warn!("failed to listen for SIGTERM: {e}");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    () = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
    () = terminate => tracing::info!("received SIGTERM, shutting down"),
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
