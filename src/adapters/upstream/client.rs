//! Upstox HTTP Client - Batched LTP Quote Lookups
//!
//! Wraps reqwest for the Upstox market-quote LTP endpoint. Every tick
//! issues one batched request covering all instruments. Optional retries
//! (off by default) share the single `timeout` budget of the call.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

use super::types::{ErrorEnvelope, LtpBody};
use crate::config::UpstreamConfig;
use crate::domain::catalog::InstrumentKey;
use crate::domain::errors::QuoteError;
use crate::ports::quote_source::QuoteSource;

/// Configuration for the Upstox HTTP client.
#[derive(Debug, Clone)]
pub struct UpstoxClientConfig {
  /// Base URL for the REST API.
  pub base_url: String,
  /// Path of the LTP endpoint.
  pub ltp_path: String,
  /// Budget for the whole call, retries included.
  pub timeout: Duration,
  /// Maximum retries on transient errors, within `timeout`.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
}

impl Default for UpstoxClientConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.upstox.com".to_string(),
      ltp_path: "/v2/market-quote/ltp".to_string(),
      timeout: Duration::from_secs(10),
      max_retries: 0,
      retry_base_delay: Duration::from_millis(250),
    }
  }
}

impl From<&UpstreamConfig> for UpstoxClientConfig {
  fn from(config: &UpstreamConfig) -> Self {
    Self {
      base_url: config.base_url.trim_end_matches('/').to_string(),
      ltp_path: config.ltp_path.clone(),
      timeout: Duration::from_millis(config.timeout_ms),
      max_retries: config.max_retries,
      retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
    }
  }
}

/// HTTP client for the Upstox LTP endpoint.
pub struct UpstoxClient {
  /// Underlying HTTP client.
  http: Client,
  /// Client configuration.
  config: UpstoxClientConfig,
}

impl UpstoxClient {
  /// Create a new client.
  pub fn new(config: UpstoxClientConfig) -> Result<Self, QuoteError> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(2)
      .build()?;

    Ok(Self { http, config })
  }

  /// Execute the LTP request, retrying transport errors, 429, and 5xx.
  async fn execute_with_retry(
    &self,
    bearer_token: &str,
    instrument_param: &str,
  ) -> Result<Response, QuoteError> {
    let url = format!("{}{}", self.config.base_url, self.config.ltp_path);
    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = backoff_delay(self.config.retry_base_delay, attempt);
        debug!(attempt, delay_ms = delay.as_millis(), "Retrying LTP request");
        sleep(delay).await;
      }

      let request = self
        .http
        .get(&url)
        .bearer_auth(bearer_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .query(&[("instrument_key", instrument_param)]);

      match request.send().await {
        Ok(response) => match response.status() {
          StatusCode::OK => return Ok(response),
          status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, attempt, "Transient LTP error");
            last_error = Some(QuoteError::Status {
              status: status.as_u16(),
              body,
            });
          }
          status => {
            let body = response.text().await.unwrap_or_default();
            return Err(QuoteError::Status {
              status: status.as_u16(),
              body,
            });
          }
        },
        Err(e) => {
          warn!(error = %e, attempt, "LTP request failed");
          last_error = Some(e.into());
        }
      }
    }

    Err(last_error.unwrap_or_else(|| QuoteError::Decode("no attempt made".to_string())))
  }
}

/// Exponential backoff before retry `attempt` (1-based), saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
  base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

#[async_trait]
impl QuoteSource for UpstoxClient {
  #[instrument(skip(self, bearer_token, instruments), fields(instruments = instruments.len()))]
  async fn last_prices(
    &self,
    bearer_token: &str,
    instruments: &[InstrumentKey],
  ) -> Result<HashMap<InstrumentKey, f64>, QuoteError> {
    if instruments.is_empty() {
      return Ok(HashMap::new());
    }

    let budget = self.config.timeout;
    let text = timeout(budget, async {
      let response = self
        .execute_with_retry(bearer_token, &instruments.join(","))
        .await?;
      Ok::<_, QuoteError>(response.text().await?)
    })
    .await
    .map_err(|_| QuoteError::Timeout {
      timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
    })??;

    let body = match serde_json::from_str::<LtpBody>(&text) {
      Ok(body) => body,
      Err(parse_err) => {
        return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
          Ok(envelope) => QuoteError::Rejected(envelope.describe()),
          Err(_) => QuoteError::Decode(parse_err.to_string()),
        });
      }
    };

    if body.is_error() {
      return Err(QuoteError::Rejected("status=error".to_string()));
    }

    let prices = body.into_prices();
    debug!(
      requested = instruments.len(),
      priced = prices.len(),
      "LTP batch fetched"
    );
    Ok(prices)
  }
}
