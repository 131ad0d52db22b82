//! Four-step quote wizard.
//!
//! A session owns one [`LeadRecord`] and moves through the steps only when the
//! current step validates. Any edit clears every stored error. Submission is
//! split into [`WizardSession::begin_submission`] and
//! [`WizardSession::complete_submission`] so a host holding sessions behind a
//! lock can release it while the gateway call is in flight.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::domain::{
    CoverageDetails, DocumentMetadata, InsuranceType, LeadId, LeadPatch, LeadRecord, VehicleCount,
    WizardStep, TOTAL_STEPS,
};
use super::gateway::{SubmissionError, SubmissionGateway};
use super::validation::{validate_step, Field, FieldErrors};

/// Grace period between a successful submission and the close notification.
pub const CLOSE_DELAY: Duration = Duration::from_millis(2000);

/// Callback fired when the wizard asks its host to close.
pub type CloseNotifier = Arc<dyn Fn() + Send + Sync>;

/// Rejections from wizard transitions. Field problems live in the session's error map.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("the current step has validation errors")]
    Invalid,
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("submission is only available on the final step")]
    NotOnFinalStep,
    #[error("this quote request was already submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

/// Single-shot delayed notification that can be called off.
#[derive(Default)]
pub struct CloseTimer {
    handle: Option<JoinHandle<()>>,
}

impl CloseTimer {
    /// Arm the timer, replacing any pending one. Without a Tokio runtime the
    /// notification fires immediately.
    pub fn schedule(&mut self, delay: Duration, notify: CloseNotifier) {
        self.cancel();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                self.handle = Some(runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    notify();
                }));
            }
            Err(_) => {
                warn!("no async runtime available; closing wizard without delay");
                notify();
            }
        }
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for CloseTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for CloseTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseTimer")
            .field("pending", &self.is_pending())
            .finish()
    }
}

pub struct WizardSession {
    record: LeadRecord,
    step: WizardStep,
    errors: FieldErrors,
    submitting: bool,
    succeeded: bool,
    lead_id: Option<LeadId>,
    close_delay: Duration,
    on_close: Option<CloseNotifier>,
    close_timer: CloseTimer,
}

impl Default for WizardSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WizardSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardSession")
            .field("step", &self.step)
            .field("errors", &self.errors)
            .field("submitting", &self.submitting)
            .field("succeeded", &self.succeeded)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl WizardSession {
    pub fn new() -> Self {
        Self {
            record: LeadRecord::default(),
            step: WizardStep::InsuranceType,
            errors: FieldErrors::new(),
            submitting: false,
            succeeded: false,
            lead_id: None,
            close_delay: CLOSE_DELAY,
            on_close: None,
            close_timer: CloseTimer::default(),
        }
    }

    pub fn with_close_notifier(mut self, notify: CloseNotifier) -> Self {
        self.on_close = Some(notify);
        self
    }

    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn record(&self) -> &LeadRecord {
        &self.record
    }

    pub fn current_step(&self) -> WizardStep {
        self.step
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn has_succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn lead_id(&self) -> Option<&LeadId> {
        self.lead_id.as_ref()
    }

    pub fn close_pending(&self) -> bool {
        self.close_timer.is_pending()
    }

    /// Merge the patch and drop every stored error, not just the edited field's.
    pub fn update_field(&mut self, patch: LeadPatch) {
        self.record.apply(patch);
        self.errors.clear();
    }

    /// Validate the current step only and move forward when it is clean.
    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        if self.submitting {
            return Err(WizardError::SubmissionInFlight);
        }

        let errors = validate_step(self.step, &self.record);
        if errors.is_empty() {
            self.errors.clear();
            self.step = self.step.next();
            debug!(step = self.step.number(), "wizard advanced");
            Ok(self.step)
        } else {
            self.errors = errors;
            Err(WizardError::Invalid)
        }
    }

    /// Step back without validating; errors are always cleared.
    pub fn retreat(&mut self) -> Result<WizardStep, WizardError> {
        if self.submitting {
            return Err(WizardError::SubmissionInFlight);
        }

        self.step = self.step.previous();
        self.errors.clear();
        Ok(self.step)
    }

    /// Validate the final step, mark the session in flight, and hand back a
    /// snapshot of the record for the gateway.
    pub fn begin_submission(&mut self) -> Result<LeadRecord, WizardError> {
        if self.succeeded {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.submitting {
            return Err(WizardError::SubmissionInFlight);
        }
        if !self.step.is_final() {
            return Err(WizardError::NotOnFinalStep);
        }

        let errors = validate_step(self.step, &self.record);
        if !errors.is_empty() {
            self.errors = errors;
            return Err(WizardError::Invalid);
        }

        self.errors.clear();
        self.submitting = true;
        Ok(self.record.clone())
    }

    /// Apply the gateway's answer. Success schedules the close notification;
    /// failure stores one `submit` error and keeps the wizard on the final step.
    pub fn complete_submission(
        &mut self,
        result: Result<LeadId, SubmissionError>,
    ) -> Result<LeadId, WizardError> {
        if !self.submitting {
            debug!("submission finished after the session was reset; result discarded");
            return result.map_err(WizardError::Submission);
        }
        self.submitting = false;

        match result {
            Ok(lead_id) => {
                self.succeeded = true;
                self.lead_id = Some(lead_id.clone());
                if let Some(notify) = self.on_close.clone() {
                    self.close_timer.schedule(self.close_delay, notify);
                }
                Ok(lead_id)
            }
            Err(err) => {
                self.errors.clear();
                self.errors.insert(Field::Submit, err.to_string());
                Err(WizardError::Submission(err))
            }
        }
    }

    pub async fn submit(&mut self, gateway: &SubmissionGateway) -> Result<LeadId, WizardError> {
        let snapshot = self.begin_submission()?;
        let result = gateway.submit(snapshot).await;
        self.complete_submission(result)
    }

    /// Host-initiated reset: discard everything and call off a pending close.
    pub fn reset(&mut self) {
        self.close_timer.cancel();
        self.record = LeadRecord::default();
        self.step = WizardStep::InsuranceType;
        self.errors.clear();
        self.submitting = false;
        self.succeeded = false;
        self.lead_id = None;
    }

    pub fn view(&self) -> WizardView {
        WizardView {
            current_step: self.step.number(),
            total_steps: TOTAL_STEPS,
            step_label: self.step.label(),
            progress_percent: self.step.progress_percent(),
            steps: WizardStep::ALL
                .iter()
                .map(|step| StepIndicator {
                    number: step.number(),
                    label: step.label(),
                    completed: *step < self.step,
                    current: *step == self.step,
                })
                .collect(),
            errors: self.errors.clone(),
            submitting: self.submitting,
            succeeded: self.succeeded,
            lead_id: self.lead_id.clone(),
            record: RecordView::from(&self.record),
        }
    }
}

/// Serializable snapshot of a session for step views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardView {
    pub current_step: u8,
    pub total_steps: u8,
    pub step_label: &'static str,
    pub progress_percent: u8,
    pub steps: Vec<StepIndicator>,
    pub errors: FieldErrors,
    pub submitting: bool,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<LeadId>,
    pub record: RecordView,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepIndicator {
    pub number: u8,
    pub label: &'static str,
    pub completed: bool,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub insurance_type: Option<InsuranceType>,
    pub start_date: Option<chrono::NaiveDate>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_count: Option<VehicleCount>,
    pub document: Option<DocumentMetadata>,
}

impl From<&LeadRecord> for RecordView {
    fn from(record: &LeadRecord) -> Self {
        let property_address = match &record.coverage {
            Some(CoverageDetails::Home { property_address }) => Some(property_address.clone()),
            _ => None,
        };

        Self {
            insurance_type: record.insurance_type(),
            start_date: record.start_date,
            full_name: record.full_name.clone(),
            email: record.email.clone(),
            phone: record.phone.clone(),
            property_address,
            vehicle_count: record
                .coverage
                .as_ref()
                .and_then(CoverageDetails::vehicle_count),
            document: record.document.as_ref().map(|document| document.metadata()),
        }
    }
}
