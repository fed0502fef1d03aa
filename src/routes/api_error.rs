use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use gwfetch::GwError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<GwError> for ApiError {
    fn from(err: GwError) -> Self {
        match err {
            GwError::InvalidSegment(_)
            | GwError::InvalidChannel(_)
            | GwError::InvalidFrameName(_)
            | GwError::InvalidManifest { .. } => ApiError::bad_request(err.to_string()),
            GwError::ManifestNotFound(_) => ApiError::not_found(err.to_string()),
            _ => {
                error!("Request failed: {}", err);
                ApiError::internal(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// A request value that must name a single directory entry.
pub fn single_component(value: &str, what: &str) -> ApiResult<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(ApiError::bad_request(format!("invalid {}: {:?}", what, value)));
    }
    Ok(())
}
