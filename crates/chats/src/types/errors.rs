//! Error types for rooms, messages and moderation.

use modnet_database::DatabaseError;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored data is invalid: {0}")]
    Stored(#[from] DatabaseError),

    #[error("attachment storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("{kind} not found")]
    NotFound { kind: &'static str },

    #[error("access denied: {reason}")]
    Forbidden { reason: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("the edit window for this message has closed")]
    EditWindowClosed,

    #[error("message has been deleted")]
    MessageDeleted,

    #[error("attachment exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("content type {content_type} is not allowed")]
    UnsupportedMediaType { content_type: String },
}

impl ChatError {
    pub fn not_found(kind: &'static str) -> Self {
        Self::NotFound { kind }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// Map unique constraint violations to [`ChatError::Conflict`].
pub(crate) fn conflict_on_unique(error: sqlx::Error, message: &str) -> ChatError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => ChatError::conflict(message),
        _ => ChatError::Database(error),
    }
}
