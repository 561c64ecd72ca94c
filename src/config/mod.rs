//! Configuration Module - TOML-based Relay Configuration
//!
//! Loads and validates configuration from `config.toml` with a small
//! set of environment variable overrides for hosted deployments.
//! Endpoints, categories, and timings are externalized here - nothing
//! is hardcoded in the usecases layer.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

/// Top-level relay configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any task is spawned.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  #[serde(default)]
  pub service: ServiceConfig,
  /// Tick timing.
  #[serde(default)]
  pub broadcast: BroadcastConfig,
  /// Upstream quote API.
  #[serde(default)]
  pub upstream: UpstreamConfig,
  /// Credential and catalog store.
  pub store: StoreConfig,
  /// Subscriber WebSocket gateway.
  #[serde(default)]
  pub gateway: GatewayConfig,
  /// Health and metrics endpoints.
  #[serde(default)]
  pub ops: OpsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Emit JSON log lines instead of plain text.
  #[serde(default = "default_true")]
  pub json_logs: bool,
}

/// Broadcast loop timing.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
  /// Delay between the end of one tick and the start of the next.
  #[serde(default = "default_tick_interval")]
  pub tick_interval_ms: u64,
  /// Delay after a tick skipped for missing credentials.
  #[serde(default = "default_credential_backoff")]
  pub credential_backoff_ms: u64,
}

impl BroadcastConfig {
  pub const fn tick_interval(&self) -> Duration {
    Duration::from_millis(self.tick_interval_ms)
  }

  pub const fn credential_backoff(&self) -> Duration {
    Duration::from_millis(self.credential_backoff_ms)
  }
}

/// Upstream quote API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
  /// REST API base URL.
  #[serde(default = "default_upstream_url")]
  pub base_url: String,
  /// Path of the batched LTP endpoint.
  #[serde(default = "default_ltp_path")]
  pub ltp_path: String,
  /// Whole-request timeout in milliseconds.
  #[serde(default = "default_timeout")]
  pub timeout_ms: u64,
  /// Retries on transport errors, 429, and 5xx. Every attempt shares
  /// `timeout_ms`; zero keeps the tick to a single request.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  #[serde(default = "default_retry_delay")]
  pub retry_base_delay_ms: u64,
}

/// Which store adapter backs the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
  /// Firebase Realtime Database over REST.
  Firebase,
  /// Local JSON document, re-read every tick.
  File,
}

/// Credential and catalog store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// Store adapter.
  pub kind: StoreKind,
  /// Realtime Database URL (firebase kind).
  #[serde(default)]
  pub database_url: Option<String>,
  /// Local document path (file kind).
  #[serde(default)]
  pub file_path: Option<String>,
  /// Path of the catalog document.
  #[serde(default = "default_catalog_path")]
  pub catalog_path: String,
  /// Path of the bearer token document.
  #[serde(default = "default_token_path")]
  pub token_path: String,
  /// Env var holding the database secret, if any.
  #[serde(default = "default_auth_env")]
  pub auth_env: String,
  /// The fixed set of categories broadcast every tick.
  #[serde(default = "default_categories")]
  pub categories: Vec<String>,
}

/// Subscriber gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
  /// Gateway bind address.
  #[serde(default = "default_gateway_addr")]
  pub bind_address: String,
  /// WebSocket route.
  #[serde(default = "default_ws_path")]
  pub ws_path: String,
  /// Snapshots buffered per connection before it counts as stalled.
  #[serde(default = "default_outbound_queue")]
  pub outbound_queue: usize,
}

/// Health and metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OpsConfig {
  /// Bind address for /live, /ready, and /metrics.
  #[serde(default = "default_ops_addr")]
  pub bind_address: String,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
      json_logs: true,
    }
  }
}

impl Default for BroadcastConfig {
  fn default() -> Self {
    Self {
      tick_interval_ms: default_tick_interval(),
      credential_backoff_ms: default_credential_backoff(),
    }
  }
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      base_url: default_upstream_url(),
      ltp_path: default_ltp_path(),
      timeout_ms: default_timeout(),
      max_retries: default_max_retries(),
      retry_base_delay_ms: default_retry_delay(),
    }
  }
}

impl Default for GatewayConfig {
  fn default() -> Self {
    Self {
      bind_address: default_gateway_addr(),
      ws_path: default_ws_path(),
      outbound_queue: default_outbound_queue(),
    }
  }
}

impl Default for OpsConfig {
  fn default() -> Self {
    Self {
      bind_address: default_ops_addr(),
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "ltp-relay".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_true() -> bool {
  true
}

const fn default_tick_interval() -> u64 {
  5_000
}

const fn default_credential_backoff() -> u64 {
  30_000
}

fn default_upstream_url() -> String {
  "https://api.upstox.com".to_string()
}

fn default_ltp_path() -> String {
  "/v2/market-quote/ltp".to_string()
}

const fn default_timeout() -> u64 {
  10_000
}

const fn default_max_retries() -> u32 {
  0
}

const fn default_retry_delay() -> u64 {
  250
}

fn default_catalog_path() -> String {
  "stocks".to_string()
}

fn default_token_path() -> String {
  "config/upstox_access_token".to_string()
}

fn default_auth_env() -> String {
  "FIREBASE_AUTH_TOKEN".to_string()
}

fn default_categories() -> Vec<String> {
  vec!["nifty50".to_string()]
}

fn default_gateway_addr() -> String {
  "0.0.0.0:8000".to_string()
}

fn default_ws_path() -> String {
  "/ws".to_string()
}

const fn default_outbound_queue() -> usize {
  16
}

fn default_ops_addr() -> String {
  "0.0.0.0:9090".to_string()
}
