//! Hosted storage collaborator speaking the Supabase REST and Storage APIs.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use super::domain::LeadId;
use super::gateway::{BlobStore, BlobUpload, LeadRow, LeadStore, StoreError};
use crate::config::{ConfigError, StorageConfig, StorageCredentials};

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    leads_table: String,
}

impl SupabaseClient {
    pub fn new(
        credentials: StorageCredentials,
        leads_table: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&credentials.access_key)
                .map_err(|_| ConfigError::InvalidStorageCredentials)?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credentials.access_key))
                .map_err(|_| ConfigError::InvalidStorageCredentials)?,
        );

        // No request timeout: a stalled call stalls the submission.
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|_| ConfigError::InvalidStorageCredentials)?;

        Ok(Self {
            client,
            base_url: credentials.base_url,
            leads_table: leads_table.into(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, ConfigError> {
        Self::new(config.credentials()?, config.leads_table.clone())
    }

    /// Both collaborator roles backed by one shared client.
    pub fn connect(
        credentials: StorageCredentials,
        leads_table: &str,
    ) -> Result<(Arc<dyn BlobStore>, Arc<dyn LeadStore>), ConfigError> {
        let client = Arc::new(Self::new(credentials, leads_table)?);
        Ok((client.clone(), client))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Public download address for an object, encoded the same way as the
    /// upload request so names with spaces still resolve.
    pub fn public_url(&self, bucket: &str, path: &str) -> Result<Url, StoreError> {
        self.endpoint(
            ["storage", "v1", "object", "public", bucket]
                .into_iter()
                .chain(path.split('/')),
        )
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, StoreError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|err| StoreError::Transport(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn rejection(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Rejected { status, body }
}

#[async_trait]
impl BlobStore for SupabaseClient {
    async fn store(&self, upload: BlobUpload) -> Result<String, StoreError> {
        let mut segments = vec!["storage", "v1", "object", upload.bucket.as_str()];
        segments.extend(upload.path.split('/'));
        let url = self.endpoint(segments)?;

        debug!(%url, size = upload.bytes.len(), "uploading policy document");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, upload.content_type.as_str())
            .header(
                CACHE_CONTROL,
                format!("max-age={}", upload.cache_control_seconds),
            )
            .header("x-upsert", if upload.overwrite { "true" } else { "false" })
            .body(upload.bytes)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        self.public_url(&upload.bucket, &upload.path)
            .map(String::from)
    }
}

#[async_trait]
impl LeadStore for SupabaseClient {
    async fn insert(&self, row: LeadRow) -> Result<LeadId, StoreError> {
        let url = self.endpoint(["rest", "v1", self.leads_table.as_str()])?;

        let response = self
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|err| StoreError::Malformed(err.to_string()))?;

        let id = rows
            .first()
            .and_then(|row| row.get("id"))
            .and_then(|id| match id {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .ok_or_else(|| StoreError::Malformed("inserted row carried no id".to_string()))?;

        Ok(LeadId(id))
    }
}
