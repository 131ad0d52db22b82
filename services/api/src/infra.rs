use async_trait::async_trait;
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use quote_intake::config::StorageConfig;
use quote_intake::workflows::quote::{
    BlobStore, BlobUpload, InsuranceType, LeadId, LeadRow, LeadStore, StoreError,
    SubmissionGateway, SupabaseClient,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) storage_configured: bool,
}

/// Gateway backed by the hosted store, or an unconfigured one that fails
/// submissions when credentials are missing.
pub(crate) fn storage_gateway(storage: &StorageConfig) -> SubmissionGateway {
    SubmissionGateway::from_storage_config(storage, |credentials| {
        SupabaseClient::connect(credentials, &storage.leads_table)
    })
}

#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryBlobStore {
    objects: Arc<Mutex<Vec<BlobUpload>>>,
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, upload: BlobUpload) -> Result<String, StoreError> {
        let url = format!("memory://{}/{}", upload.bucket, upload.path);
        let mut guard = self.objects.lock().expect("blob mutex poisoned");
        guard.push(upload);
        Ok(url)
    }
}

impl InMemoryBlobStore {
    pub(crate) fn objects(&self) -> Vec<BlobUpload> {
        self.objects.lock().expect("blob mutex poisoned").clone()
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryLeadStore {
    rows: Arc<Mutex<Vec<LeadRow>>>,
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn insert(&self, row: LeadRow) -> Result<LeadId, StoreError> {
        let mut guard = self.rows.lock().expect("lead mutex poisoned");
        guard.push(row);
        Ok(LeadId(format!("lead-{:04}", guard.len())))
    }
}

impl InMemoryLeadStore {
    pub(crate) fn rows(&self) -> Vec<LeadRow> {
        self.rows.lock().expect("lead mutex poisoned").clone()
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_insurance_type(raw: &str) -> Result<InsuranceType, String> {
    InsuranceType::parse(raw).ok_or_else(|| {
        format!("unknown insurance type '{raw}' (expected auto, home, or commercial)")
    })
}
