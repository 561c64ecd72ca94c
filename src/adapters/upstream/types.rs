//! Upstox LTP Response Types
//!
//! The LTP endpoint answers with an envelope keyed by display symbol
//! (`NSE_EQ:RELIANCE`) whose entries carry the instrument token. Some
//! proxies forward a bare map keyed by instrument key instead; both are
//! accepted.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::catalog::InstrumentKey;

/// One quote entry.
#[derive(Debug, Clone, Deserialize)]
pub struct LtpEntry {
  /// Last traded price.
  #[serde(default)]
  pub last_price: Option<f64>,
  /// Instrument key this entry belongs to.
  #[serde(default)]
  pub instrument_token: Option<String>,
}

/// Enveloped LTP response.
#[derive(Debug, Clone, Deserialize)]
pub struct LtpEnvelope {
  /// "success" or "error".
  #[serde(default)]
  pub status: Option<String>,
  /// Quote entries.
  pub data: HashMap<String, LtpEntry>,
}

/// Either response shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LtpBody {
  Envelope(LtpEnvelope),
  Bare(HashMap<String, LtpEntry>),
}

/// Upstox error envelope (`{"status":"error","errors":[...]}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
  pub status: String,
  #[serde(default)]
  pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
  #[serde(default, rename = "errorCode")]
  pub error_code: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

impl ErrorEnvelope {
  /// Joined error messages for logging.
  pub fn describe(&self) -> String {
    let parts: Vec<String> = self
      .errors
      .iter()
      .map(|e| {
        format!(
          "{}: {}",
          e.error_code.as_deref().unwrap_or("unknown"),
          e.message.as_deref().unwrap_or("")
        )
      })
      .collect();
    if parts.is_empty() {
      self.status.clone()
    } else {
      parts.join("; ")
    }
  }
}

impl LtpBody {
  /// Flatten into instrument key → price.
  ///
  /// Entries are attached to `instrument_token` when present, otherwise
  /// to their map key. Entries without a price are dropped.
  pub fn into_prices(self) -> HashMap<InstrumentKey, f64> {
    let entries = match self {
      Self::Envelope(envelope) => envelope.data,
      Self::Bare(map) => map,
    };

    entries
      .into_iter()
      .filter_map(|(key, entry)| {
        let price = entry.last_price?;
        Some((entry.instrument_token.unwrap_or(key), price))
      })
      .collect()
  }

  /// True when the body is an envelope explicitly marked as an error.
  pub fn is_error(&self) -> bool {
    matches!(self, Self::Envelope(e) if e.status.as_deref() == Some("error"))
  }
}
