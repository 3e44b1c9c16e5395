//! Realtime wire protocol spoken over `/ws`.
//!
//! Every frame is a JSON text frame tagged with `type`, e.g.
//! `{"type":"subscribe","room_id":"..."}`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::views::{MessageView, RoomPresence};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Subscribe { room_id: String },
    Unsubscribe { room_id: String },
    Typing { room_id: String, is_typing: bool },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Hello {
        user_id: String,
        display_name: String,
    },
    Subscribed {
        room_id: String,
        presence: RoomPresence,
    },
    Unsubscribed {
        room_id: String,
    },
    MessageCreated {
        message: MessageView,
    },
    MessageUpdated {
        message: MessageView,
    },
    /// Carries the tombstone so clients can reconcile by `seq`.
    MessageDeleted {
        message: MessageView,
    },
    Presence {
        presence: RoomPresence,
    },
    Typing {
        room_id: String,
        user_id: String,
        display_name: String,
        is_typing: bool,
    },
    Pong,
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>, room_id: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            room_id: room_id.map(str::to_owned),
        }
    }

    /// Room the event belongs to, if any.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::Subscribed { room_id, .. }
            | Self::Unsubscribed { room_id }
            | Self::Typing { room_id, .. } => Some(room_id),
            Self::MessageCreated { message }
            | Self::MessageUpdated { message }
            | Self::MessageDeleted { message } => Some(&message.room_id),
            Self::Presence { presence } => Some(&presence.room_id),
            Self::Error { room_id, .. } => room_id.as_deref(),
            Self::Hello { .. } | Self::Pong => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_snake_case_tags() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"typing","room_id":"r1","is_typing":true}"#)
                .expect("typing event should parse");
        assert_eq!(
            event,
            ClientEvent::Typing {
                room_id: "r1".into(),
                is_typing: true
            }
        );

        let ping: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).expect("ping parses");
        assert_eq!(ping, ClientEvent::Ping);
    }

    #[test]
    fn error_events_omit_missing_room() {
        let json = serde_json::to_value(ServerEvent::error("nope", None)).expect("serialises");
        assert_eq!(json["type"], "error");
        assert!(json.get("room_id").is_none());

        let presence = ServerEvent::Presence {
            presence: RoomPresence {
                room_id: "r9".into(),
                online_count: 0,
                user_ids: Vec::new(),
            },
        };
        assert_eq!(presence.room_id(), Some("r9"));
    }
}
