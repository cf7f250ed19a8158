//! Error response formatting
//!
//! Every failed request gets the same JSON body: error code, message,
//! request id, timestamp and the retry hint.

use crate::error::{AppError, ErrorCode};
use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// RFC 3339 timestamp of the error
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details: None,
            retryable: Some(error.is_retryable()),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Body rejected before it reached the payment core
    pub fn invalid_body(request_id: Option<String>, reason: &str) -> Self {
        Self {
            error: ErrorCode::ValidationError,
            message: "Request body is invalid".to_string(),
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            details: Some(serde_json::json!({ "reason": reason })),
            retryable: Some(false),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error_code = ?self.error_code(),
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let mut error_response = ErrorResponse::from_app_error(&self);
        if let Some(context) = &self.context {
            error_response = error_response.with_details(serde_json::json!({ "context": context }));
        }
        (status_code, Json(error_response)).into_response()
    }
}

/// Turn an axum JSON extraction failure (unknown field, missing field,
/// wrong type, bad content type) into the standard 400 body.
pub fn json_rejection_response(rejection: JsonRejection, headers: &HeaderMap) -> Response {
    let request_id = get_request_id_from_headers(headers);
    tracing::info!(
        request_id = ?request_id,
        reason = %rejection.body_text(),
        "Rejected malformed request body"
    );
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::invalid_body(request_id, &rejection.body_text())),
    )
        .into_response()
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppErrorKind, DomainError, ValidationError};

    #[test]
    fn test_error_response_from_app_error() {
        let app_error = AppError::new(AppErrorKind::Domain(DomainError::MerchantNotConfigured {
            merchant_id: "m-1".to_string(),
        }))
        .with_request_id("req_123");

        let error_response = ErrorResponse::from_app_error(&app_error);

        assert_eq!(error_response.error, ErrorCode::MerchantNotConfigured);
        assert_eq!(error_response.request_id, Some("req_123".to_string()));
        assert_eq!(error_response.retryable, Some(false));
    }

    #[test]
    fn test_app_error_into_response() {
        let app_error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: "domainEntityId".to_string(),
            reason: "must be 1 to 128 characters".to_string(),
        }));

        let response = app_error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_request_id_is_read_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(get_request_id_from_headers(&headers), None);
        headers.insert(REQUEST_ID_HEADER, "req-9".parse().unwrap());
        assert_eq!(get_request_id_from_headers(&headers), Some("req-9".to_string()));
    }
}
