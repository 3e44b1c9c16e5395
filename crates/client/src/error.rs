use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {message}")]
    Api { status: u16, message: String },

    #[error("realtime connection failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid server url {0}")]
    InvalidUrl(String),

    #[error("no session token, sign in first")]
    MissingToken,

    #[error("access to room {room_id} was revoked")]
    AccessRevoked { room_id: String },
}

impl ClientError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Errors that will not go away by retrying: bad credentials, missing
    /// membership or a room that no longer exists.
    pub fn is_permanent(&self) -> bool {
        matches!(self.status(), Some(401 | 403 | 404 | 410))
            || matches!(self, Self::AccessRevoked { .. } | Self::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_recognised() {
        let forbidden = ClientError::Api {
            status: 403,
            message: "not a member".into(),
        };
        assert!(forbidden.is_permanent());

        let unavailable = ClientError::Api {
            status: 503,
            message: "degraded".into(),
        };
        assert!(!unavailable.is_permanent());
        assert!(ClientError::MissingToken.is_permanent());
    }
}
