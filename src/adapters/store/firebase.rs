//! Firebase Realtime Database Store
//!
//! Reads the bearer token and the symbol catalog through the Realtime
//! Database REST interface (`GET {url}/{path}.json`). The client is
//! built once at startup and shared; every call is a fresh read so the
//! catalog can be edited live.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{path_segments, token_from_value};
use crate::config::StoreConfig;
use crate::domain::errors::StoreError;
use crate::ports::catalog_store::CatalogStore;

/// Firebase Realtime Database REST client.
pub struct FirebaseStore {
    http: Client,
    database_url: String,
    catalog_path: String,
    token_path: String,
    /// Database secret or ID token passed as `?auth=`.
    auth: Option<String>,
}

impl FirebaseStore {
    /// Build the store client.
    ///
    /// `auth` is usually read from the env var named in `store.auth_env`.
    pub fn new(
        database_url: &str,
        catalog_path: &str,
        token_path: &str,
        auth: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            database_url: database_url.trim_end_matches('/').to_string(),
            catalog_path: catalog_path.to_string(),
            token_path: token_path.to_string(),
            auth: auth.filter(|a| !a.is_empty()),
        })
    }

    /// Build from the `[store]` section, reading the secret from env.
    pub fn from_config(config: &StoreConfig, timeout: Duration) -> Result<Self, StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Decode("database_url not configured".to_string()))?;
        let auth = std::env::var(&config.auth_env).ok();

        Self::new(url, &config.catalog_path, &config.token_path, auth, timeout)
    }

    fn document_url(&self, path: &str) -> String {
        let joined: Vec<&str> = path_segments(path).collect();
        format!("{}/{}.json", self.database_url, joined.join("/"))
    }

    /// Read one document; `Ok(None)` for 404 or a JSON `null`.
    #[instrument(skip(self))]
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let mut request = self.http.get(self.document_url(path));
        if let Some(auth) = &self.auth {
            request = request.query(&[("auth", auth.as_str())]);
        }

        let response = request.send().await.map_err(redact)?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
        }

        let value: Value = response.json().await.map_err(redact)?;
        debug!(path, null = value.is_null(), "Store document read");
        Ok((!value.is_null()).then_some(value))
    }
}

/// Drop the request URL, which carries the `auth` secret.
fn redact(err: reqwest::Error) -> StoreError {
    StoreError::Http(err.without_url())
}

#[async_trait]
impl CatalogStore for FirebaseStore {
    async fn access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .read(&self.token_path)
            .await?
            .as_ref()
            .and_then(token_from_value))
    }

    async fn raw_catalog(&self) -> Result<Option<Value>, StoreError> {
        self.read(&self.catalog_path).await
    }
}
