use std::collections::HashMap;

use modnet_chats::{RoomPresence, ServerEvent};

/// Latest known presence per room.
#[derive(Debug, Clone, Default)]
pub struct PresenceView {
    rooms: HashMap<String, RoomPresence>,
}

impl PresenceView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot. Returns true if it differs from the previous one.
    pub fn apply(&mut self, presence: RoomPresence) -> bool {
        if self.rooms.get(&presence.room_id) == Some(&presence) {
            return false;
        }
        self.rooms.insert(presence.room_id.clone(), presence);
        true
    }

    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::Subscribed { presence, .. } | ServerEvent::Presence { presence } => {
                self.apply(presence.clone())
            }
            _ => false,
        }
    }

    pub fn get(&self, room_id: &str) -> Option<&RoomPresence> {
        self.rooms.get(room_id)
    }

    pub fn online_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map_or(0, |presence| presence.online_count)
    }

    pub fn is_online(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|presence| presence.user_ids.iter().any(|id| id == user_id))
    }

    pub fn forget(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
    }
}
