//! Error taxonomy for the HTTP API

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Field name to human readable messages
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Every failure a handler can surface to a client
#[derive(Error, Debug)]
pub enum ApiError {
    /// No valid session (401)
    #[error("Authentication required")]
    Unauthenticated,

    /// Login rejected (401); never says which half was wrong
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Authenticated but not allowed (403)
    #[error("{0}")]
    Forbidden(String),

    /// Missing or mismatched anti-forgery token (403)
    #[error("Invalid CSRF token")]
    InvalidCsrf,

    /// Unknown resource (404)
    #[error("{0}")]
    NotFound(String),

    /// Input rejected by a schema (400)
    #[error("Validation failed")]
    ValidationFailed(FieldErrors),

    /// Well-formed input the operation refuses (400)
    #[error("{0}")]
    BadRequest(String),

    /// Uniqueness or state conflict (400)
    #[error("{0}")]
    Conflict(String),

    /// Rate limit exceeded (429)
    #[error("Too many requests, retry in {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Anything unexpected (500); the source is logged, never returned
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    /// Single-field validation failure
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        ApiError::ValidationFailed(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::InvalidCsrf => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationFailed(_) | ApiError::BadRequest(_) | ApiError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        collect_field_errors(None, &errors, &mut fields);
        ApiError::ValidationFailed(fields)
    }
}

fn collect_field_errors(prefix: Option<&str>, errors: &ValidationErrors, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, field),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                let messages = out.entry(path).or_default();
                for error in list {
                    messages.push(
                        error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("failed {} validation", error.code)),
                    );
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_field_errors(Some(&path), nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_errors(Some(&format!("{}[{}]", path, index)), nested, out);
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            ApiError::Internal(source) => {
                error!("Request failed: {:#}", source);
                json!({ "success": false, "message": self.to_string() })
            }
            ApiError::ValidationFailed(errors) => json!({
                "success": false,
                "message": self.to_string(),
                "errors": errors,
            }),
            _ => json!({ "success": false, "message": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
