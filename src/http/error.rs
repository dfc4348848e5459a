//! JSON error responses for the API surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::submit::SubmitError;

/// An error the API returns as `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Map a submission failure to the status a client can act on.
    pub fn from_submit(error: &SubmitError) -> Self {
        let status = match error {
            // The transaction is wrong, not the service
            SubmitError::Build(_) => StatusCode::BAD_REQUEST,
            SubmitError::Reverted(_) => StatusCode::UNPROCESSABLE_ENTITY,
            // Upstream node trouble
            SubmitError::Ledger(_) | SubmitError::Broadcast(_) => StatusCode::BAD_GATEWAY,
            // Transient contention; retrying later can succeed
            SubmitError::SequenceConflict(_)
            | SubmitError::RetriesExhausted { .. }
            | SubmitError::Nonce(crate::nonce::NonceError::LockTimeout { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SubmitError::Nonce(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}
