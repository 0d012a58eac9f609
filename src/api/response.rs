use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

// ============================================================================
// Success envelope
// ============================================================================

/// `{"success": true, ...data}`: the payload's fields sit next to `success`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Json<Envelope<T>> {
        Json(Envelope {
            success: true,
            data,
        })
    }
}

/// Payload for responses that carry nothing but `success`.
#[derive(Debug, Serialize)]
pub struct Empty {}

// ============================================================================
// Failure envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn response(status_code: StatusCode, message: impl Into<String>) -> Response {
        (
            status_code,
            Json(ErrorBody {
                success: false,
                error: message.into(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Unified error type for handlers
// ============================================================================

/// A handler failure: a client error (4xx) or a server error (5xx).
/// Both render as `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Fail(StatusCode, String),
    Error(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Fail(code, msg) => ErrorBody::response(code, msg),
            ApiError::Error(code, msg) => {
                tracing::error!(status = code.as_u16(), error = %msg, "Request failed");
                ErrorBody::response(code, msg)
            }
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::PAYLOAD_TOO_LARGE, message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::REQUEST_TIMEOUT, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }
}
