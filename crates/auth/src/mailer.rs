//! Delivery of one-time login codes.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use modnet_config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCodeMessage {
    pub to: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail relay rejected the message with status {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_login_code(&self, message: &LoginCodeMessage) -> Result<(), MailError>;
}

/// Pick the mailer described by the configuration.
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.endpoint.as_deref() {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            Ok(Arc::new(HttpMailer::new(config, endpoint)?))
        }
        _ => Ok(Arc::new(LogMailer)),
    }
}

/// Writes codes to the log. Used when no mail relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_login_code(&self, message: &LoginCodeMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            code = %message.code,
            expires_at = %message.expires_at,
            "login code issued (mail delivery disabled)"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Posts codes as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &MailConfig, endpoint: &str) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .user_agent("modnet-backend")
            .timeout(StdDuration::from_secs(config.request_timeout_seconds.max(1)))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.to_owned(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_login_code(&self, message: &LoginCodeMessage) -> Result<(), MailError> {
        let payload = RelayPayload {
            from: &self.from,
            to: &message.to,
            subject: "Your ModNet login code",
            text: format!(
                "Your ModNet login code is {}.\nIt expires at {} UTC.",
                message.code,
                message.expires_at.format("%H:%M")
            ),
        };

        let mut request = self.http.post(&self.endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(to = %message.to, "login code handed to mail relay");
        Ok(())
    }
}

/// Keeps every message in memory. Handy for tests and local development.
#[derive(Debug, Default, Clone)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<LoginCodeMessage>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<LoginCodeMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Most recent code sent to `email`.
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.messages()
            .into_iter()
            .rev()
            .find(|message| message.to == email)
            .map(|message| message.code)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_login_code(&self, message: &LoginCodeMessage) -> Result<(), MailError> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(())
    }
}
