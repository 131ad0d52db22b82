use std::sync::Arc;

use axum::{
    extract::{multipart::Field as MultipartField, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use super::domain::{
    CoverageDetails, InsuranceType, LeadId, LeadPatch, LeadRecord, PolicyDocument, VehicleCount,
};
use super::gateway::SubmissionError;
use super::service::{QuoteIntakeService, SessionError, SessionId};
use super::validation::{validate_document, MAX_DOCUMENT_BYTES};
use super::wizard::WizardError;

/// Request bodies may carry a full declarations page plus form fields. The cap
/// sits above the document limit so oversize files reach the picker check.
pub const MAX_REQUEST_BYTES: usize = 2 * MAX_DOCUMENT_BYTES as usize;

/// Router builder exposing the quote wizard and the one-shot lead endpoint.
pub fn quote_router(service: Arc<QuoteIntakeService>) -> Router {
    Router::new()
        .route("/api/v1/quote/sessions", post(open_handler))
        .route(
            "/api/v1/quote/sessions/:session_id",
            axum::routing::get(view_handler)
                .patch(update_handler)
                .delete(close_handler),
        )
        .route(
            "/api/v1/quote/sessions/:session_id/document",
            put(attach_document_handler).delete(remove_document_handler),
        )
        .route(
            "/api/v1/quote/sessions/:session_id/advance",
            post(advance_handler),
        )
        .route(
            "/api/v1/quote/sessions/:session_id/retreat",
            post(retreat_handler),
        )
        .route(
            "/api/v1/quote/sessions/:session_id/submit",
            post(submit_handler),
        )
        .route("/api/v1/leads", post(submit_lead_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .with_state(service)
}

pub(crate) async fn open_handler(State(service): State<Arc<QuoteIntakeService>>) -> Response {
    let (id, view) = service.open();
    let payload = json!({
        "session_id": id,
        "session": view,
        "start_date_window": service.start_date_window(),
        "quick_selections": service.start_date_window().quick_selections(),
    });
    (StatusCode::CREATED, Json(payload)).into_response()
}

pub(crate) async fn view_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    Path(session_id): Path<String>,
) -> Response {
    session_response(service.view(&SessionId(session_id)))
}

pub(crate) async fn update_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    Path(session_id): Path<String>,
    Json(patch): Json<LeadPatch>,
) -> Response {
    session_response(service.update(&SessionId(session_id), patch))
}

pub(crate) async fn attach_document_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let mut document = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                match read_document(field).await {
                    Ok(parsed) => document = parsed,
                    Err(response) => return response,
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(err) => return bad_request(err.body_text()),
        }
    }

    let Some(document) = document else {
        return bad_request("multipart field `file` is required".to_string());
    };
    session_response(service.attach_document(&SessionId(session_id), document))
}

pub(crate) async fn remove_document_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    Path(session_id): Path<String>,
) -> Response {
    session_response(service.remove_document(&SessionId(session_id)))
}

pub(crate) async fn advance_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    Path(session_id): Path<String>,
) -> Response {
    session_response(service.advance(&SessionId(session_id)))
}

pub(crate) async fn retreat_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    Path(session_id): Path<String>,
) -> Response {
    session_response(service.retreat(&SessionId(session_id)))
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    Path(session_id): Path<String>,
) -> Response {
    session_response(service.submit(&SessionId(session_id)).await)
}

pub(crate) async fn close_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    Path(session_id): Path<String>,
) -> Response {
    match service.close(&SessionId(session_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => session_error(err),
    }
}

/// Outcome of the one-shot endpoint, shaped like the form action's result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitLeadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<LeadId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitLeadResponse {
    fn failure(status: StatusCode, message: impl Into<String>) -> Response {
        let body = Self {
            success: false,
            lead_id: None,
            error: Some(message.into()),
        };
        (status, Json(body)).into_response()
    }
}

pub(crate) async fn submit_lead_handler(
    State(service): State<Arc<QuoteIntakeService>>,
    multipart: Multipart,
) -> Response {
    let record = match read_lead_form(multipart).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    match service.submit_lead(record).await {
        Ok(lead_id) => {
            let body = SubmitLeadResponse {
                success: true,
                lead_id: Some(lead_id),
                error: None,
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(err) => SubmitLeadResponse::failure(submission_status(&err), err.to_string()),
    }
}

/// Collect the flat form the one-shot endpoint accepts into a lead record.
/// Conditional fields that do not match the chosen coverage are dropped.
async fn read_lead_form(mut multipart: Multipart) -> Result<LeadRecord, Response> {
    let mut form = LeadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return Err(SubmitLeadResponse::failure(
                    StatusCode::BAD_REQUEST,
                    err.body_text(),
                ))
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            form.document = read_document(field).await?;
            continue;
        }

        let value = field.text().await.map_err(|err| {
            SubmitLeadResponse::failure(StatusCode::BAD_REQUEST, err.body_text())
        })?;
        match name.as_str() {
            "insuranceType" => form.insurance_type = value,
            "startDate" => form.start_date = value,
            "fullName" => form.full_name = value,
            "email" => form.email = value,
            "phone" => form.phone = value,
            "propertyAddress" => form.property_address = value,
            "vehicleCount" => form.vehicle_count = value,
            _ => {}
        }
    }

    form.into_record()
}

#[derive(Debug, Default)]
struct LeadForm {
    insurance_type: String,
    start_date: String,
    full_name: String,
    email: String,
    phone: String,
    property_address: String,
    vehicle_count: String,
    document: Option<PolicyDocument>,
}

impl LeadForm {
    fn into_record(self) -> Result<LeadRecord, Response> {
        let unprocessable =
            |message: String| SubmitLeadResponse::failure(StatusCode::UNPROCESSABLE_ENTITY, message);

        let coverage = match self.insurance_type.trim() {
            "" => None,
            raw => {
                let insurance_type = InsuranceType::parse(raw)
                    .ok_or_else(|| unprocessable(format!("Unsupported insurance type: {raw}")))?;
                Some(match insurance_type {
                    InsuranceType::Auto => CoverageDetails::Auto {
                        vehicle_count: VehicleCount::parse(self.vehicle_count.trim()),
                    },
                    InsuranceType::Home => CoverageDetails::Home {
                        property_address: self.property_address.trim().to_string(),
                    },
                    InsuranceType::Commercial => CoverageDetails::Commercial,
                })
            }
        };

        let start_date = match self.start_date.trim() {
            "" => None,
            raw => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| unprocessable(format!("Invalid start date: {raw}")))?,
            ),
        };

        if let Some(document) = &self.document {
            validate_document(document).map_err(|err| unprocessable(err.to_string()))?;
        }

        Ok(LeadRecord {
            coverage,
            start_date,
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            document: self.document,
        })
    }
}

/// Read an uploaded file part. An empty part without a file name means no
/// file was picked.
async fn read_document(field: MultipartField<'_>) -> Result<Option<PolicyDocument>, Response> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|err| bad_request(err.body_text()))?;

    if file_name.is_empty() && bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(PolicyDocument::new(
        file_name,
        content_type,
        bytes.to_vec(),
    )))
}

fn session_response(result: Result<super::wizard::WizardView, SessionError>) -> Response {
    match result {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => session_error(err),
    }
}

fn session_error(err: SessionError) -> Response {
    match err {
        SessionError::NotFound(id) => {
            let payload = json!({
                "error": "quote session not found",
                "session_id": id,
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        SessionError::StartDateOutsideWindow { requested, window } => {
            let payload = json!({
                "error": format!("start date {requested} must fall between {window}"),
                "start_date_window": window,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        SessionError::Document(rejection) => {
            let payload = json!({
                "error": rejection.to_string(),
                "field": "file",
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        SessionError::Rejected { reason, view } => {
            let status = match &reason {
                WizardError::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
                WizardError::SubmissionInFlight
                | WizardError::NotOnFinalStep
                | WizardError::AlreadySubmitted => StatusCode::CONFLICT,
                WizardError::Submission(err) => submission_status(err),
            };
            let payload = json!({
                "error": reason.to_string(),
                "session": view,
            });
            (status, Json(payload)).into_response()
        }
        SessionError::Interrupted(id) => {
            let payload = json!({
                "error": SubmissionError::unexpected(String::new()).to_string(),
                "session_id": id,
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn submission_status(err: &SubmissionError) -> StatusCode {
    match err {
        SubmissionError::MissingRequiredFields => StatusCode::UNPROCESSABLE_ENTITY,
        SubmissionError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        SubmissionError::Database(_) | SubmissionError::Unexpected(_) => StatusCode::BAD_GATEWAY,
    }
}

fn bad_request(message: String) -> Response {
    warn!(%message, "malformed quote request");
    let payload = json!({ "error": message });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}
