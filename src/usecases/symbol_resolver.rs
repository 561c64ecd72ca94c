//! Symbol Resolver - Store Catalog to Instrument List
//!
//! Reads the bearer token and the symbol catalog from the store for
//! each tick. Catalog resolution fails soft: any store problem yields
//! an empty catalog with every configured category present.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::domain::catalog::{Catalog, Category};
use crate::domain::errors::TickError;
use crate::ports::catalog_store::CatalogStore;

/// Resolves credentials and the catalog for the configured categories.
pub struct SymbolResolver<S: CatalogStore + ?Sized> {
    /// Store handle, created once at startup.
    store: Arc<S>,
    /// The fixed set of categories to broadcast.
    categories: Vec<Category>,
}

impl<S: CatalogStore + ?Sized> SymbolResolver<S> {
    pub fn new(store: Arc<S>, categories: Vec<Category>) -> Self {
        Self { store, categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Read the upstream bearer token.
    ///
    /// A missing or blank token and any store error all map to
    /// `CredentialUnavailable`.
    pub async fn resolve_token(&self) -> Result<String, TickError> {
        match self.store.access_token().await {
            Ok(Some(token)) if !token.trim().is_empty() => Ok(token),
            Ok(_) => Err(TickError::CredentialUnavailable(
                "no access token in store".to_string(),
            )),
            Err(e) => Err(TickError::CredentialUnavailable(e.to_string())),
        }
    }

    /// Read and normalize the catalog. Never fails.
    pub async fn resolve_catalog(&self) -> Catalog {
        let raw = match self.store.raw_catalog().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!("Store has no catalog document");
                return Catalog::empty(self.categories.iter().cloned());
            }
            Err(e) => {
                error!(error = %e, "Failed to read catalog from store");
                return Catalog::empty(self.categories.iter().cloned());
            }
        };

        let catalog = Catalog::from_raw(&self.categories, &raw);
        if catalog.is_empty() {
            warn!(
                categories = ?self.categories,
                "Catalog document has no symbols for configured categories"
            );
        } else {
            debug!(symbols = catalog.symbol_count(), "Catalog resolved");
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::StoreError;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    enum Fixed {
        Doc(Option<String>, Option<Value>),
        Broken,
    }

    #[async_trait]
    impl CatalogStore for Fixed {
        async fn access_token(&self) -> Result<Option<String>, StoreError> {
            match self {
                Self::Doc(token, _) => Ok(token.clone()),
                Self::Broken => Err(StoreError::Decode("broken".to_string())),
            }
        }

        async fn raw_catalog(&self) -> Result<Option<Value>, StoreError> {
            match self {
                Self::Doc(_, raw) => Ok(raw.clone()),
                Self::Broken => Err(StoreError::Decode("broken".to_string())),
            }
        }
    }

    fn resolver(store: Fixed) -> SymbolResolver<Fixed> {
        SymbolResolver::new(Arc::new(store), vec!["nifty50".to_string(), "banknifty".to_string()])
    }

    #[tokio::test]
    async fn test_store_error_yields_empty_catalog() {
        let catalog = resolver(Fixed::Broken).resolve_catalog().await;
        assert!(catalog.is_empty());
        assert_eq!(catalog.category_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_document_yields_empty_catalog() {
        let catalog = resolver(Fixed::Doc(None, None)).resolve_catalog().await;
        assert!(catalog.is_empty());
        assert!(catalog.category("banknifty").is_some());
    }

    #[tokio::test]
    async fn test_catalog_normalized() {
        let raw = json!({ "nifty50": { "RELIANCE": "NSE_EQ|INE002A01018" } });
        let catalog = resolver(Fixed::Doc(None, Some(raw))).resolve_catalog().await;
        assert_eq!(catalog.symbol_count(), 1);
        assert_eq!(catalog.category_count(), 2);
    }

    #[tokio::test]
    async fn test_blank_token_is_unavailable() {
        let result = resolver(Fixed::Doc(Some("  ".to_string()), None))
            .resolve_token()
            .await;
        assert!(matches!(result, Err(TickError::CredentialUnavailable(_))));

        let result = resolver(Fixed::Broken).resolve_token().await;
        assert!(matches!(result, Err(TickError::CredentialUnavailable(_))));
    }
}
