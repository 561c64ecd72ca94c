//! Error taxonomy for store, upstream, delivery, and tick failures.
//!
//! None of these terminate the process: the broadcast loop maps each
//! one to a skipped tick, a degraded snapshot, or a pruned subscriber.

use thiserror::Error;
use uuid::Uuid;

/// Failures reading the configuration/credential store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport failure talking to a remote store.
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Reading a local store file failed.
    #[error("store file error: {0}")]
    Io(#[from] std::io::Error),

    /// The document was not valid JSON or had the wrong shape.
    #[error("store document malformed: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Failures of the batched upstream quote request.
#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("quote response malformed: {0}")]
    Decode(String),

    /// HTTP 200 carrying an error envelope.
    #[error("quote API rejected request: {0}")]
    Rejected(String),

    /// The whole call, retries included, outran its budget.
    #[error("quote request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Why a snapshot could not be handed to a subscriber.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection is gone.
    #[error("subscriber disconnected")]
    Disconnected,

    /// The subscriber's outbound queue is full.
    #[error("subscriber outbound queue full")]
    Backpressure,
}

impl DeliveryError {
    /// Metric label for this failure.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Backpressure => "backpressure",
        }
    }
}

/// Per-tick failure classes, logged at the loop boundary.
#[derive(Error, Debug)]
pub enum TickError {
    /// No bearer token: skip the tick and back off longer.
    #[error("credentials unavailable: {0}")]
    CredentialUnavailable(String),

    /// Catalog empty or unreadable: skip the tick.
    #[error("catalog unavailable: no symbols in {categories} categories")]
    CatalogUnavailable { categories: usize },

    /// Batched quote request failed: broadcast an all-null snapshot.
    #[error("upstream request for {instruments} instruments failed: {source}")]
    UpstreamRequestFailed {
        instruments: usize,
        #[source]
        source: QuoteError,
    },

    /// A send failed: prune that subscriber only.
    #[error("delivery to subscriber {subscriber} failed: {source}")]
    SubscriberDeliveryFailed {
        subscriber: Uuid,
        #[source]
        source: DeliveryError,
    },
}

impl TickError {
    /// Metric label for this failure class.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CredentialUnavailable(_) => "credential_unavailable",
            Self::CatalogUnavailable { .. } => "catalog_unavailable",
            Self::UpstreamRequestFailed { .. } => "upstream_request_failed",
            Self::SubscriberDeliveryFailed { .. } => "subscriber_delivery_failed",
        }
    }
}
