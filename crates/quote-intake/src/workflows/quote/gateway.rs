use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::classifier::classify;
use super::domain::{CoverageDetails, LeadId, LeadRecord, PolicyDocument};
use crate::config::{ConfigError, StorageConfig, DEFAULT_POLICY_DOCS_BUCKET};

/// Upload cache lifetime requested from the blob store, in seconds.
pub const DOCUMENT_CACHE_SECONDS: u32 = 3600;

/// Object handed to the blob store.
#[derive(Debug, Clone)]
pub struct BlobUpload {
    pub bucket: String,
    /// Object path inside the bucket, e.g. `policy-docs/1727136000000-dec.pdf`.
    pub path: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub cache_control_seconds: u32,
    pub overwrite: bool,
}

/// Row written to the leads collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRow {
    pub insurance_type: String,
    pub effective_date: String,
    pub is_hot_lead: bool,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub property_address: Option<String>,
    pub vehicle_count: Option<String>,
    pub policy_document_url: Option<String>,
    pub submitted_at: String,
    pub days_until_effective: i64,
}

/// Failure reported by a storage collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage transport failed: {0}")]
    Transport(String),
    #[error("storage rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected storage response: {0}")]
    Malformed(String),
}

/// Best-effort home for uploaded declarations pages.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Store the object and return its public URL.
    async fn store(&self, upload: BlobUpload) -> Result<String, StoreError>;
}

/// Must-succeed home for lead rows.
#[async_trait]
pub trait LeadStore: Send + Sync + Debug {
    async fn insert(&self, row: LeadRow) -> Result<LeadId, StoreError>;
}

/// Source of "now" for classification and timestamps.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Submission failure, already phrased for the prospect.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Missing required fields")]
    MissingRequiredFields,
    #[error("{0}")]
    Configuration(String),
    #[error("Failed to save lead to database")]
    Database(#[source] StoreError),
    #[error("{0}")]
    Unexpected(String),
}

impl SubmissionError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::Unexpected("An unexpected error occurred".to_string())
        } else {
            Self::Unexpected(message)
        }
    }
}

impl From<ConfigError> for SubmissionError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

#[derive(Debug)]
enum Backend {
    Ready {
        blobs: Arc<dyn BlobStore>,
        leads: Arc<dyn LeadStore>,
    },
    Unconfigured(String),
}

/// Turns a finished lead record into one optional upload and one insert.
#[derive(Debug)]
pub struct SubmissionGateway {
    backend: Backend,
    bucket: String,
    clock: Arc<dyn Clock>,
}

impl SubmissionGateway {
    pub fn new(blobs: Arc<dyn BlobStore>, leads: Arc<dyn LeadStore>) -> Self {
        Self {
            backend: Backend::Ready { blobs, leads },
            bucket: DEFAULT_POLICY_DOCS_BUCKET.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Gateway that fails every submission with the given configuration error.
    pub fn unconfigured(error: ConfigError) -> Self {
        Self {
            backend: Backend::Unconfigured(error.to_string()),
            bucket: DEFAULT_POLICY_DOCS_BUCKET.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Build from storage settings, falling back to an unconfigured gateway.
    pub fn from_storage_config<F>(config: &StorageConfig, connect: F) -> Self
    where
        F: FnOnce(
            crate::config::StorageCredentials,
        ) -> Result<(Arc<dyn BlobStore>, Arc<dyn LeadStore>), ConfigError>,
    {
        let gateway = match config.credentials().and_then(connect) {
            Ok((blobs, leads)) => Self::new(blobs, leads),
            Err(err) => {
                warn!(error = %err, "lead storage is not configured; submissions will fail");
                Self::unconfigured(err)
            }
        };
        gateway.with_bucket(config.documents_bucket.clone())
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.backend, Backend::Ready { .. })
    }

    pub async fn submit(&self, record: LeadRecord) -> Result<LeadId, SubmissionError> {
        let (blobs, leads) = match &self.backend {
            Backend::Ready { blobs, leads } => (blobs, leads),
            Backend::Unconfigured(message) => {
                error!(%message, "lead submission attempted without storage configuration");
                return Err(SubmissionError::Configuration(message.clone()));
            }
        };

        let LeadRecord {
            coverage,
            start_date,
            full_name,
            email,
            phone,
            document,
        } = record;

        let (Some(coverage), Some(start_date)) = (coverage, start_date) else {
            return Err(SubmissionError::MissingRequiredFields);
        };
        if full_name.is_empty() || email.is_empty() || phone.is_empty() {
            return Err(SubmissionError::MissingRequiredFields);
        }

        let now = self.clock.now();
        let classification = classify(start_date, now.date_naive());

        let policy_document_url = match document {
            Some(document) => self.upload_document(blobs.as_ref(), document, now).await,
            None => None,
        };

        let row = LeadRow {
            insurance_type: coverage.insurance_type().as_str().to_string(),
            effective_date: start_date.format("%Y-%m-%d").to_string(),
            is_hot_lead: classification.is_hot_lead,
            full_name,
            email,
            phone,
            property_address: coverage.property_address().map(str::to_string),
            vehicle_count: conditional_vehicle_count(&coverage),
            policy_document_url,
            submitted_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            days_until_effective: classification.days_until_effective,
        };

        match leads.insert(row).await {
            Ok(lead_id) => {
                info!(
                    lead_id = %lead_id,
                    hot = classification.is_hot_lead,
                    days_until_effective = classification.days_until_effective,
                    "lead submitted"
                );
                Ok(lead_id)
            }
            Err(err) => {
                error!(error = %err, "lead insert failed");
                Err(SubmissionError::Database(err))
            }
        }
    }

    /// Upload failures are logged and swallowed; the lead still goes through.
    async fn upload_document(
        &self,
        blobs: &dyn BlobStore,
        document: PolicyDocument,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let path = document_path(&self.bucket, now, &document.file_name);
        let upload = BlobUpload {
            bucket: self.bucket.clone(),
            path: path.clone(),
            content_type: document.content_type,
            bytes: document.bytes,
            cache_control_seconds: DOCUMENT_CACHE_SECONDS,
            overwrite: false,
        };

        match blobs.store(upload).await {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(error = %err, %path, "policy document upload failed; continuing without it");
                None
            }
        }
    }
}

/// `<bucket>/<unix-ms>-<original-name>`.
pub fn document_path(bucket: &str, now: DateTime<Utc>, file_name: &str) -> String {
    format!("{bucket}/{}-{file_name}", now.timestamp_millis())
}

fn conditional_vehicle_count(coverage: &CoverageDetails) -> Option<String> {
    coverage
        .vehicle_count()
        .map(|count| count.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn document_path_prefixes_unix_millis() {
        let now = Utc
            .with_ymd_and_hms(2025, 9, 24, 12, 0, 0)
            .single()
            .expect("valid instant");
        assert_eq!(
            document_path("policy-docs", now, "dec page.pdf"),
            "policy-docs/1758715200000-dec page.pdf"
        );
    }

    #[test]
    fn database_error_hides_store_detail() {
        let err = SubmissionError::Database(StoreError::Rejected {
            status: 500,
            body: "relation \"leads\" does not exist".to_string(),
        });
        assert_eq!(err.to_string(), "Failed to save lead to database");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn unexpected_error_falls_back_to_generic_message() {
        assert_eq!(
            SubmissionError::unexpected("  ").to_string(),
            "An unexpected error occurred"
        );
        assert_eq!(SubmissionError::unexpected("boom").to_string(), "boom");
    }
}
