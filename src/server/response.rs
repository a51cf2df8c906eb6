//! JSON error responses

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ValidationError};

/// Error body returned by every endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,

    /// Detail, only for failures that reveal nothing sensitive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// RFC 3339 time the error was produced
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.error = Some(detail.into());
        self
    }
}

/// HTTP error: a status plus an [`ErrorResponse`] body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse::new(message),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.body = self.body.with_detail(detail);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorResponse {
        &self.body
    }

    /// Malformed request body or field violation
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid request").with_detail(detail)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Conflict => Self::new(StatusCode::CONFLICT, error.to_string()),
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::MalformedHeader
            | AuthError::MissingSubject
            | AuthError::InvalidSubject => Self::unauthorized(error.to_string()),
            AuthError::RateLimited => Self::new(StatusCode::TOO_MANY_REQUESTS, error.to_string()),
            AuthError::Hashing(_) | AuthError::TokenGeneration(_) | AuthError::Storage(_) => {
                tracing::error!(error = %error, "Request failed");
                Self::internal()
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::bad_request(error.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Status mapping for auth errors
    #[test]
    fn test_auth_error_status_mapping() {
        assert_eq!(
            ApiError::from(AuthError::Conflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::MalformedHeader).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::RateLimited).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(AuthError::Storage("db".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    // Test 2: Security-sensitive errors carry no detail
    #[test]
    fn test_auth_errors_have_no_detail() {
        let err = ApiError::from(AuthError::InvalidCredentials);
        assert_eq!(err.body().message, "invalid credentials");
        assert_eq!(err.body().error, None);

        let err = ApiError::from(AuthError::Storage("secret table name".to_string()));
        assert_eq!(err.body().error, None);
        assert!(!err.body().message.contains("secret"));
    }

    // Test 3: Validation errors carry detail
    #[test]
    fn test_validation_error_has_detail() {
        let err = ApiError::from(ValidationError::PasswordTooShort(6));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.body().error.as_deref(),
            Some("password must be at least 6 characters")
        );
    }

    // Test 4: Body serialization omits empty detail
    #[test]
    fn test_error_response_serialization() {
        let json = serde_json::to_value(ErrorResponse::new("invalid credentials")).unwrap();
        assert_eq!(json["message"], "invalid credentials");
        assert!(json.get("error").is_none());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));

        let json = serde_json::to_value(ErrorResponse::new("x").with_detail("y")).unwrap();
        assert_eq!(json["error"], "y");
    }
}
