//! Request bodies accepted by the chat services.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A new message for a room.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NewMessage {
    #[serde(default)]
    pub content: String,
    /// Public id of the message being replied to
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Pending uploads to attach, see `POST /api/rooms/{room_id}/attachments`
    #[serde(default)]
    pub attachment_ids: Vec<String>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EditMessage {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewChannel {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReport {
    pub reason: String,
}
