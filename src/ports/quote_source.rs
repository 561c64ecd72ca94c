//! Quote Source Port - Batched Last-Traded-Price Lookup
//!
//! Defines the trait for the upstream quote provider. One call covers
//! every instrument of a tick, so the number of upstream requests stays
//! constant regardless of catalog size.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::catalog::InstrumentKey;
use crate::domain::errors::QuoteError;

/// Trait for upstream last-traded-price providers.
#[async_trait]
pub trait QuoteSource: Send + Sync + 'static {
  /// Fetch last-traded prices for all `instruments` in a single request.
  ///
  /// The returned map is keyed by instrument key. Instruments the
  /// provider has no price for are simply absent.
  async fn last_prices(
    &self,
    bearer_token: &str,
    instruments: &[InstrumentKey],
  ) -> Result<HashMap<InstrumentKey, f64>, QuoteError>;
}
