use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::engine::EngineError;
use crate::model::to_datetime;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(e) => match e {
                EngineError::Validation(_) | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound { .. } | EngineError::NoBookings(_) => StatusCode::NOT_FOUND,
                EngineError::Conflict { .. }
                | EngineError::InsufficientSlots { .. }
                | EngineError::RoomUnavailable(_)
                | EngineError::AlreadyCancelled(_)
                | EngineError::CompletedStay(_) => StatusCode::CONFLICT,
                EngineError::WalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Engine(EngineError::WalError(detail)) | ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json!({ "message": "Internal server error" })
            }
            ApiError::Engine(EngineError::Conflict { booking_id, stay }) => json!({
                "message": self.to_string(),
                "conflicting_booking": {
                    "id": booking_id,
                    "check_in": to_datetime(stay.start),
                    "check_out": to_datetime(stay.end),
                },
            }),
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
