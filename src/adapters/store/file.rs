//! Local JSON File Store
//!
//! Serves the token and catalog from a JSON document on disk, laid out
//! like a Realtime Database export. The file is re-read on every call,
//! so edits take effect on the next tick without a restart.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use super::{path_segments, token_from_value};
use crate::domain::errors::StoreError;
use crate::ports::catalog_store::CatalogStore;

/// File-backed catalog store.
pub struct FileStore {
    path: PathBuf,
    catalog_path: String,
    token_path: String,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>, catalog_path: &str, token_path: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            catalog_path: catalog_path.to_string(),
            token_path: token_path.to_string(),
        }
    }

    async fn document(&self) -> Result<Value, StoreError> {
        let content = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
        path_segments(path)
            .try_fold(document, |node, segment| node.get(segment))
            .filter(|v| !v.is_null())
    }
}

#[async_trait]
impl CatalogStore for FileStore {
    async fn access_token(&self) -> Result<Option<String>, StoreError> {
        let document = self.document().await?;
        Ok(Self::lookup(&document, &self.token_path).and_then(token_from_value))
    }

    async fn raw_catalog(&self) -> Result<Option<Value>, StoreError> {
        let document = self.document().await?;
        Ok(Self::lookup(&document, &self.catalog_path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn write_doc(name: &str, doc: &Value) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ltp-relay-{name}-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, doc.to_string()).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_token_and_catalog() {
        let path = write_doc(
            "store",
            &json!({
                "config": { "upstox_access_token": "bearer-abc" },
                "stocks": { "nifty50": { "RELIANCE": "NSE_EQ|INE002A01018" } }
            }),
        )
        .await;
        let store = FileStore::new(&path, "stocks", "config/upstox_access_token");

        assert_eq!(store.access_token().await.unwrap().as_deref(), Some("bearer-abc"));
        let raw = store.raw_catalog().await.unwrap().unwrap();
        assert_eq!(raw["nifty50"]["RELIANCE"], "NSE_EQ|INE002A01018");

        let _ = fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_missing_paths_are_none() {
        let path = write_doc("empty", &json!({ "stocks": null })).await;
        let store = FileStore::new(&path, "stocks", "config/upstox_access_token");

        assert!(store.access_token().await.unwrap().is_none());
        assert!(store.raw_catalog().await.unwrap().is_none());

        let _ = fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let store = FileStore::new("/nonexistent/ltp-relay.json", "stocks", "token");
        assert!(matches!(store.access_token().await, Err(StoreError::Io(_))));
    }
}
