use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::quote::{SessionError, SubmissionError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Session(SessionError),
    Submission(SubmissionError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Session(err) => write!(f, "quote session error: {}", err),
            AppError::Submission(err) => write!(f, "lead submission failed: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Session(err) => Some(err),
            AppError::Submission(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Session(SessionError::Interrupted(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Session(_) | AppError::Submission(SubmissionError::MissingRequiredFields) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Submission(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<SubmissionError> for AppError {
    fn from(value: SubmissionError) -> Self {
        Self::Submission(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::quote::SessionId;

    #[test]
    fn missing_session_maps_to_not_found() {
        let response =
            AppError::from(SessionError::NotFound(SessionId("quote-000009".into()))).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn failed_insert_maps_to_bad_gateway() {
        let err = SubmissionError::Database(crate::workflows::quote::StoreError::Transport(
            "connection refused".into(),
        ));
        assert_eq!(err.to_string(), "Failed to save lead to database");
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn interrupted_submission_maps_to_internal_error() {
        let response =
            AppError::from(SessionError::Interrupted(SessionId("quote-000010".into())))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::from(SubmissionError::unexpected("")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
