//! Boundary error type: decides status codes and response bodies.
use axum::{
    http::{
        header::{RETRY_AFTER, WWW_AUTHENTICATE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::{auth::AuthError, security::events::SECURITY};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Could not validate credentials")]
    InvalidToken,

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::NotAuthenticated => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InvalidCredentials | AppError::InvalidToken => "AUTHENTICATION_FAILED",
            AppError::NotAuthenticated => "NOT_AUTHENTICATED",
            AppError::Conflict(_) => "RESOURCE_CONFLICT",
            AppError::NotFound(_) => "RESOURCE_NOT_FOUND",
            AppError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the client. Internal details never leave the process.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) => "An unexpected error occurred. Please try again later.".into(),
            other => other.to_string(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidUsernameFormat(e) => AppError::validation("username", e.to_string()),
            AuthError::InvalidEmailFormat => AppError::validation("email", "Invalid email format"),
            AuthError::WeakPassword(e) => AppError::validation("password", e.to_string()),
            AuthError::DuplicateUsername => AppError::Conflict("Username already registered"),
            AuthError::DuplicateEmail => AppError::Conflict("Email already registered"),
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::MissingToken => AppError::NotAuthenticated,
            AuthError::InvalidToken => AppError::InvalidToken,
            AuthError::Internal(e) => AppError::Internal(e),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.client_message();

        match &self {
            AppError::Internal(e) => error!(error = ?e, code, "request failed"),
            AppError::InvalidCredentials | AppError::InvalidToken | AppError::NotAuthenticated => {
                warn!(target: SECURITY, event = code, status = status.as_u16(), "access denied")
            }
            _ => warn!(code, status = status.as_u16(), %message, "client error"),
        }

        let mut error = json!({ "code": code, "message": message });
        match &self {
            AppError::Validation { field, .. } => {
                error["details"] = json!({ "field": field });
            }
            AppError::RateLimited { retry_after_secs } => {
                error["details"] = json!({ "retry_after": retry_after_secs });
            }
            _ => {}
        }
        let body = json!({ "detail": message, "error": error });

        let mut response = (status, Json(body)).into_response();
        match &self {
            AppError::InvalidToken => {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            AppError::RateLimited { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            _ => {}
        }
        response
    }
}
