//! HTTP server wiring for Fork & Feast.
//!
//! Loads [`ServerConfig`], picks a storage backend and mounts the JSON API
//! under `/api`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{Router, routing::get};
use feast_core::store::{RecipeStore, StoreConfig};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Which [`RecipeStore`] implementation to serve from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  /// Everything is lost on exit.
  #[default]
  Memory,
  Sqlite,
}

/// Runtime server configuration, deserialised from `config.toml` and
/// `FEAST_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "ServerConfig::default_host")]
  pub host:               String,
  #[serde(default = "ServerConfig::default_port")]
  pub port:               u16,
  #[serde(default)]
  pub backend:            Backend,
  /// SQLite database file; only read for [`Backend::Sqlite`].
  #[serde(default = "ServerConfig::default_store_path")]
  pub store_path:         PathBuf,
  #[serde(default = "ServerConfig::default_max_ancestry_depth")]
  pub max_ancestry_depth: usize,
}

impl ServerConfig {
  fn default_host() -> String { "127.0.0.1".to_owned() }

  fn default_port() -> u16 { 8080 }

  fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/feast/feast.db") }

  fn default_max_ancestry_depth() -> usize {
    StoreConfig::default().max_ancestry_depth
  }

  /// Read `path` (if it exists) layered under `FEAST_*` environment
  /// variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("FEAST").try_parsing(true))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_config(&self) -> StoreConfig {
    StoreConfig { max_ancestry_depth: self.max_ancestry_depth }
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

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: the API under `/api`, plus `/health`.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: RecipeStore + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", feast_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
