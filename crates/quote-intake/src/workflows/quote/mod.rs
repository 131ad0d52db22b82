//! Insurance quote intake: the four-step wizard, its validators, lead
//! classification, and the gateway that persists finished leads.

pub mod classifier;
pub mod domain;
pub mod gateway;
pub mod router;
pub mod service;
pub mod supabase;
pub mod validation;
pub mod wizard;

#[cfg(test)]
mod tests;

pub use classifier::{classify, LeadClassification, HOT_LEAD_WINDOW_DAYS};
pub use domain::{
    CoverageDetails, DocumentMetadata, InsuranceType, LeadId, LeadPatch, LeadRecord,
    PolicyDocument, VehicleCount, WizardStep, TOTAL_STEPS,
};
pub use gateway::{
    BlobStore, BlobUpload, Clock, FixedClock, LeadRow, LeadStore, StoreError, SubmissionError,
    SubmissionGateway, SystemClock,
};
pub use router::quote_router;
pub use service::{QuoteIntakeService, SessionError, SessionId, DEFAULT_SESSION_IDLE_TTL};
pub use supabase::SupabaseClient;
pub use validation::{
    format_file_size, format_phone_as_typed, is_valid_email, is_valid_phone, validate_document,
    validate_step, DocumentRejection, Field, FieldErrors, QuickSelection, StartDateWindow,
};
pub use wizard::{CloseNotifier, CloseTimer, WizardError, WizardSession, WizardView, CLOSE_DELAY};
