//! Catalog Store Port - Credential and Symbol Catalog Source
//!
//! Defines the trait for the external document store that holds the
//! upstream bearer token and the category → symbol → instrument key
//! catalog. The store may be empty, stale, or unreachable; callers
//! decide how to degrade.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::StoreError;

/// Trait for configuration/credential store providers.
///
/// Implementors are created once at startup and shared by reference.
/// `Ok(None)` means the document does not exist; `Err` means the store
/// could not be read at all.
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
  /// Fetch the bearer token for the upstream quote API.
  async fn access_token(&self) -> Result<Option<String>, StoreError>;

  /// Fetch the raw catalog document (category → symbol → key).
  ///
  /// Returned unnormalized; the symbol resolver picks the configured
  /// categories and tolerates older entry shapes.
  async fn raw_catalog(&self) -> Result<Option<Value>, StoreError>;
}
