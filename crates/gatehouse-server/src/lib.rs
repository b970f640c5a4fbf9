//! Gatehouse server assembly: configuration, the HTTP application, and the
//! background expiry sweeper. The binary in `main.rs` wires these together.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use axum::Router;
use chrono::Utc;
use gatehouse_core::{Error as CoreError, gatekeeper::Gatekeeper, store::GateStore};
use serde::Deserialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `GATEHOUSE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:              String,
  #[serde(default = "default_port")]
  pub port:              u16,
  #[serde(default = "default_store_path")]
  pub store_path:        PathBuf,
  /// Seconds between expiry sweeps; `0` disables the sweeper.
  #[serde(default = "default_expiry_sweep_secs")]
  pub expiry_sweep_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/gatehouse/gatehouse.db") }

fn default_expiry_sweep_secs() -> u64 { 60 }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn sweep_interval(&self) -> Option<Duration> {
    (self.expiry_sweep_secs > 0).then(|| Duration::from_secs(self.expiry_sweep_secs))
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

// ─── Application ──────────────────────────────────────────────────────────────

/// The full HTTP application: the JSON API under `/api`, with request
/// tracing.
pub fn app<S>(gatekeeper: Gatekeeper<S>) -> Router
where
  S: GateStore + 'static,
  S::Error: From<CoreError>,
{
  Router::new()
    .nest("/api", gatehouse_api::api_router(gatekeeper))
    .layer(TraceLayer::new_for_http())
}

// ─── Expiry sweeper ───────────────────────────────────────────────────────────

/// Periodically move passes whose validity window has closed to `expired`,
/// so they show as such without waiting for someone to scan them.
pub fn spawn_expiry_sweeper<S>(gatekeeper: Gatekeeper<S>, every: Duration) -> JoinHandle<()>
where
  S: GateStore + 'static,
  S::Error: From<CoreError>,
{
  tracing::info!(interval_secs = every.as_secs(), "expiry sweeper started");

  tokio::spawn(async move {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      interval.tick().await;
      match gatekeeper.sweep_expired(Utc::now()).await {
        // The gatekeeper reports expired passes itself.
        Ok(expired) => tracing::debug!(count = expired.len(), "expiry sweep finished"),
        Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
      }
    }
  })
}
