use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

use super::proof::ProofKind;

/// A malformed proof, rejected before correlation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{kind} proof has no payload")]
    MissingPayload { kind: ProofKind },
    #[error("proof has no submission timestamp")]
    MissingTimestamp,
    #[error("{kind} proof carries a {payload} payload")]
    KindMismatch { kind: ProofKind, payload: ProofKind },
    #[error("selfie has no pictures")]
    NoPictures,
    #[error("selfie picture has an empty file id")]
    EmptyFileId,
    #[error("coordinates ({latitude}, {longitude}) are out of range")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

impl ValidationError {
    pub fn usage_hint(&self) -> &'static str {
        match self {
            ValidationError::MissingPayload { kind: ProofKind::Selfie }
            | ValidationError::NoPictures
            | ValidationError::EmptyFileId => {
                "Please send a photo of yourself (selfie) to mark your attendance"
            }
            ValidationError::MissingPayload { kind: ProofKind::Location }
            | ValidationError::InvalidCoordinates { .. } => {
                "Please share your current location (latitude and longitude) to mark your attendance"
            }
            ValidationError::MissingTimestamp | ValidationError::KindMismatch { .. } => {
                "Please send a selfie or share your location to mark your attendance"
            }
        }
    }
}

/// Failure of the attendance store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("user {0} does not exist")]
    UnknownUser(u64),
    #[error("window {0} was modified concurrently")]
    Conflict(u64),
    #[error("window {id} is corrupt: {reason}")]
    Corrupt { id: u64, reason: String },
}

/// Everything that can terminate a single proof submission. None of these
/// leave a partially written window behind.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid proof: {0}")]
    Validation(#[from] ValidationError),
    #[error("attendance store failure: {0}")]
    Storage(StoreError),
    #[error("concurrent update on window {0}; retry the submission")]
    ConcurrencyConflict(u64),
}

impl From<StoreError> for SubmitError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(id) => SubmitError::ConcurrencyConflict(id),
            other => SubmitError::Storage(other),
        }
    }
}

impl SubmitError {
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmitError::Validation(v) => v.usage_hint(),
            SubmitError::Storage(_) | SubmitError::ConcurrencyConflict(_) => {
                "Error saving attendance. Please try again."
            }
        }
    }
}

impl ResponseError for SubmitError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubmitError::Validation(_) => StatusCode::BAD_REQUEST,
            SubmitError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            SubmitError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({ "error": self.user_message() });
        if let SubmitError::Validation(v) = self {
            body["details"] = json!(v.to_string());
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}
