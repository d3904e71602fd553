use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use crate::error::SelectionError;

/// JSON envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
            data: None,
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiResponse {
            status: false,
            message: message.into(),
            data: None,
        }),
    )
}

pub fn status_for(err: &SelectionError) -> StatusCode {
    match err {
        SelectionError::NotFound(_) => StatusCode::NOT_FOUND,
        SelectionError::Validation { .. } => StatusCode::BAD_REQUEST,
        SelectionError::Conflict(_) => StatusCode::CONFLICT,
        SelectionError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SelectionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Translate a domain error into its HTTP status and error envelope.
pub fn error_response(err: SelectionError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        log::error!("Request failed: {:?}", err);
    }
    api_error(status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&SelectionError::not_found("lot", "L1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&SelectionError::validation("areas[0].name", "name is required")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&SelectionError::Conflict("race".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&SelectionError::Unavailable("timeout".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&SelectionError::Store(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_envelope_shape() {
        let (status, Json(body)) = error_response(SelectionError::not_found("version", "v1"));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.status);
        assert_eq!(body.message, "version 'v1' not found");
        assert!(body.data.is_none());
    }
}
