use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::quote::domain::{
    InsuranceType, LeadId, LeadPatch, LeadRecord, PolicyDocument, VehicleCount,
};
use crate::workflows::quote::gateway::{
    BlobStore, BlobUpload, FixedClock, LeadRow, LeadStore, StoreError, SubmissionGateway,
};
use crate::workflows::quote::service::QuoteIntakeService;
use crate::workflows::quote::wizard::WizardSession;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 24, 12, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 24).expect("valid date")
}

pub(super) fn days_from_today(days: i64) -> NaiveDate {
    today() + Duration::days(days)
}

pub(super) fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(now()))
}

pub(super) fn pdf(size: usize) -> PolicyDocument {
    PolicyDocument::new("dec.pdf", "application/pdf", vec![b'%'; size])
}

/// Auto lead starting five days out with a two vehicle household.
pub(super) fn auto_patches() -> Vec<LeadPatch> {
    vec![
        LeadPatch::insurance_type(InsuranceType::Auto),
        LeadPatch::start_date(days_from_today(5)),
        LeadPatch::contact("Jane Doe", "jane@x.com", "(555) 123-4567"),
        LeadPatch::vehicle_count(VehicleCount::Two),
        LeadPatch::attach_document(pdf(2 * 1024 * 1024)),
    ]
}

pub(super) fn auto_record() -> LeadRecord {
    let mut record = LeadRecord::default();
    for patch in auto_patches() {
        record.apply(patch);
    }
    record
}

/// Session sitting on the documents step with every gate satisfied.
pub(super) fn session_on_final_step() -> WizardSession {
    let mut session = WizardSession::new();
    for patch in auto_patches() {
        session.update_field(patch);
    }
    for _ in 0..3 {
        session.advance().expect("step validates");
    }
    session
}

pub(super) fn gateway(
    blobs: Arc<dyn BlobStore>,
    leads: Arc<dyn LeadStore>,
) -> SubmissionGateway {
    SubmissionGateway::new(blobs, leads).with_clock(clock())
}

pub(super) fn memory_gateway() -> (SubmissionGateway, Arc<MemoryBlobStore>, Arc<MemoryLeadStore>) {
    let blobs = Arc::new(MemoryBlobStore::default());
    let leads = Arc::new(MemoryLeadStore::default());
    (gateway(blobs.clone(), leads.clone()), blobs, leads)
}

pub(super) fn memory_service() -> (Arc<QuoteIntakeService>, Arc<MemoryBlobStore>, Arc<MemoryLeadStore>) {
    let (gateway, blobs, leads) = memory_gateway();
    let service = QuoteIntakeService::new(Arc::new(gateway)).with_clock(clock());
    (Arc::new(service), blobs, leads)
}

#[derive(Debug, Default)]
pub(super) struct MemoryBlobStore {
    uploads: Mutex<Vec<BlobUpload>>,
}

impl MemoryBlobStore {
    pub(super) fn uploads(&self) -> Vec<BlobUpload> {
        self.uploads.lock().expect("upload mutex poisoned").clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, upload: BlobUpload) -> Result<String, StoreError> {
        let url = format!(
            "https://storage.test/object/public/{}/{}",
            upload.bucket, upload.path
        );
        self.uploads
            .lock()
            .expect("upload mutex poisoned")
            .push(upload);
        Ok(url)
    }
}

#[derive(Debug, Default)]
pub(super) struct FailingBlobStore {
    pub(super) attempts: AtomicUsize,
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn store(&self, _upload: BlobUpload) -> Result<String, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Rejected {
            status: 409,
            body: "The resource already exists".to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub(super) struct MemoryLeadStore {
    rows: Mutex<Vec<LeadRow>>,
}

impl MemoryLeadStore {
    pub(super) fn rows(&self) -> Vec<LeadRow> {
        self.rows.lock().expect("lead mutex poisoned").clone()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn insert(&self, row: LeadRow) -> Result<LeadId, StoreError> {
        let mut rows = self.rows.lock().expect("lead mutex poisoned");
        rows.push(row);
        Ok(LeadId(format!("lead-{}", rows.len())))
    }
}

#[derive(Debug, Default)]
pub(super) struct FailingLeadStore {
    pub(super) attempts: AtomicUsize,
}

#[async_trait]
impl LeadStore for FailingLeadStore {
    async fn insert(&self, _row: LeadRow) -> Result<LeadId, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Transport("connection reset by peer".to_string()))
    }
}

/// Lead store whose insert panics, standing in for a buggy collaborator.
#[derive(Debug, Default)]
pub(super) struct PanickingLeadStore;

#[async_trait]
impl LeadStore for PanickingLeadStore {
    async fn insert(&self, _row: LeadRow) -> Result<LeadId, StoreError> {
        panic!("lead store exploded");
    }
}

/// Lead store that holds every insert until the test releases it.
#[derive(Debug, Default)]
pub(super) struct GatedLeadStore {
    pub(super) release: Notify,
    pub(super) entered: Notify,
    pub(super) inner: MemoryLeadStore,
}

#[async_trait]
impl LeadStore for GatedLeadStore {
    async fn insert(&self, row: LeadRow) -> Result<LeadId, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.insert(row).await
    }
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json")
}

pub(super) fn json_request(method: &str, uri: &str, body: Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

pub(super) fn empty_request(method: &str, uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

pub(super) const BOUNDARY: &str = "quote-intake-boundary";

/// Hand-built `multipart/form-data` request. File parts carry a file name and
/// content type; text parts carry only a value.
pub(super) fn multipart_request(
    method: &str,
    uri: &str,
    text_parts: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> axum::http::Request<Body> {
    let mut body = Vec::new();
    for (name, value) in text_parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}
