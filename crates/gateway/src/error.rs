//! Error types for the gateway layer

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use modnet_auth::AuthError;
use modnet_chats::ChatError;
use modnet_privacy::PrivacyError;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

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

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Log `detail` and answer with a generic 500.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        let status = match error {
            AuthError::InvalidEmail
            | AuthError::InvalidDisplayName
            | AuthError::ConsentVersionMismatch { .. } => StatusCode::BAD_REQUEST,
            AuthError::InvalidCode
            | AuthError::CodeExpired
            | AuthError::SessionNotFound
            | AuthError::SessionExpired
            | AuthError::InvalidSession => StatusCode::UNAUTHORIZED,
            AuthError::DomainNotAllowed
            | AuthError::AccountSuspended
            | AuthError::ConsentRequired
            | AuthError::AdminRequired => StatusCode::FORBIDDEN,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::RateLimited { .. } | AuthError::TooManyAttempts => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AuthError::Mail(ref mail) => {
                warn!(error = %mail, "login code delivery failed");
                return Self::new(StatusCode::BAD_GATEWAY, "could not deliver the login code");
            }
            AuthError::Database(_) | AuthError::Storage(_) | AuthError::CodeHash(_) => {
                return Self::internal(error);
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        let status = match error {
            ChatError::NotFound { .. } => StatusCode::NOT_FOUND,
            ChatError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ChatError::Validation { .. } => StatusCode::BAD_REQUEST,
            ChatError::Conflict { .. } | ChatError::EditWindowClosed => StatusCode::CONFLICT,
            ChatError::MessageDeleted => StatusCode::GONE,
            ChatError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ChatError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ChatError::Database(_) | ChatError::Stored(_) | ChatError::Storage(_) => {
                return Self::internal(error);
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<PrivacyError> for ApiError {
    fn from(error: PrivacyError) -> Self {
        match error {
            PrivacyError::UserNotFound => Self::not_found(error.to_string()),
            PrivacyError::ConfirmationMismatch => Self::bad_request(error.to_string()),
            PrivacyError::Database(_) => Self::internal(error),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        Self::internal(error)
    }
}
