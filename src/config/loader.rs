//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, applying environment overrides,
//! validating all parameters, and providing clear error messages for
//! misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, StoreKind};

/// Upper bound for `upstream.max_retries`.
const MAX_RETRIES: u32 = 5;

/// Load, override, and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config = parse_config(&content)?;
  apply_env_overrides(&mut config, |key| std::env::var(key).ok());
  validate_config(&config)?;

  info!(
    categories = config.store.categories.len(),
    tick_ms = config.broadcast.tick_interval_ms,
    store = ?config.store.kind,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse TOML content without overrides or validation.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  toml::from_str(content).context("Failed to parse config.toml")
}

/// Apply hosted-deployment overrides.
///
/// - `DATABASE_URL` replaces `store.database_url`
/// - `PORT` replaces the port of `gateway.bind_address`, keeping the host
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
  F: Fn(&str) -> Option<String>,
{
  if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
    config.store.database_url = Some(url);
  }

  if let Some(port) = lookup("PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
    let host = config
      .gateway
      .bind_address
      .rsplit_once(':')
      .map_or("0.0.0.0", |(host, _)| host);
    config.gateway.bind_address = format!("{host}:{port}");
  }
}

/// Validate all configuration parameters.
pub fn validate_config(config: &AppConfig) -> Result<()> {
  // Timing
  anyhow::ensure!(
    config.broadcast.tick_interval_ms > 0,
    "tick_interval_ms must be positive"
  );
  anyhow::ensure!(
    config.broadcast.credential_backoff_ms >= config.broadcast.tick_interval_ms,
    "credential_backoff_ms ({}) must be >= tick_interval_ms ({})",
    config.broadcast.credential_backoff_ms,
    config.broadcast.tick_interval_ms
  );

  // Upstream
  anyhow::ensure!(
    !config.upstream.base_url.is_empty(),
    "Upstream base_url must not be empty"
  );
  anyhow::ensure!(
    config.upstream.timeout_ms > 0,
    "Upstream timeout_ms must be positive"
  );
  anyhow::ensure!(
    config.upstream.max_retries <= MAX_RETRIES,
    "Upstream max_retries ({}) must be <= {}",
    config.upstream.max_retries,
    MAX_RETRIES
  );

  // Store
  anyhow::ensure!(
    !config.store.categories.is_empty(),
    "At least one category must be configured"
  );
  let mut seen = HashSet::new();
  for category in &config.store.categories {
    anyhow::ensure!(!category.trim().is_empty(), "Category names must not be empty");
    anyhow::ensure!(seen.insert(category), "Category {} listed twice", category);
  }
  match config.store.kind {
    StoreKind::Firebase => anyhow::ensure!(
      config.store.database_url.as_deref().is_some_and(|u| !u.is_empty()),
      "Firebase store requires database_url (or DATABASE_URL)"
    ),
    StoreKind::File => anyhow::ensure!(
      config.store.file_path.as_deref().is_some_and(|p| !p.is_empty()),
      "File store requires file_path"
    ),
  }

  // Gateway
  anyhow::ensure!(
    config.gateway.ws_path.starts_with('/'),
    "ws_path must start with '/', got {}",
    config.gateway.ws_path
  );
  anyhow::ensure!(
    config.gateway.outbound_queue > 0,
    "outbound_queue must be positive"
  );

  Ok(())
}
