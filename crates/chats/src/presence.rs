//! Who is currently looking at which room.
//!
//! A user may hold several realtime connections (browser tabs, the terminal
//! client). Presence counts users, not connections: a user is online in a
//! room while at least one of their connections is subscribed to it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::types::RoomPresence;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub presence: RoomPresence,
    /// True when the user went from offline to online or back.
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    rooms: Arc<Mutex<HashMap<String, BTreeMap<String, usize>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, room_id: &str, user_id: &str) -> PresenceChange {
        let mut rooms = self.rooms.lock().await;
        let members = rooms.entry(room_id.to_owned()).or_default();
        let connections = members.entry(user_id.to_owned()).or_insert(0);
        *connections += 1;
        let changed = *connections == 1;

        PresenceChange {
            presence: snapshot_of(room_id, Some(&*members)),
            changed,
        }
    }

    pub async fn leave(&self, room_id: &str, user_id: &str) -> PresenceChange {
        let mut rooms = self.rooms.lock().await;
        let changed = release(&mut rooms, room_id, user_id);

        PresenceChange {
            presence: snapshot_of(room_id, rooms.get(room_id)),
            changed,
        }
    }

    /// Release one connection's hold on every room it was subscribed to.
    pub async fn disconnect<I, S>(&self, user_id: &str, room_ids: I) -> Vec<PresenceChange>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rooms = self.rooms.lock().await;
        room_ids
            .into_iter()
            .map(|room_id| {
                let room_id = room_id.as_ref();
                let changed = release(&mut rooms, room_id, user_id);
                PresenceChange {
                    presence: snapshot_of(room_id, rooms.get(room_id)),
                    changed,
                }
            })
            .collect()
    }

    pub async fn snapshot(&self, room_id: &str) -> RoomPresence {
        let rooms = self.rooms.lock().await;
        snapshot_of(room_id, rooms.get(room_id))
    }

    /// Forget a user everywhere, e.g. after their account was erased.
    pub async fn evict_user(&self, user_id: &str) -> Vec<RoomPresence> {
        let mut rooms = self.rooms.lock().await;
        let mut affected = Vec::new();
        for (room_id, members) in rooms.iter_mut() {
            if members.remove(user_id).is_some() {
                affected.push(snapshot_of(room_id, Some(&*members)));
            }
        }
        rooms.retain(|_, members| !members.is_empty());
        affected
    }
}

fn release(
    rooms: &mut HashMap<String, BTreeMap<String, usize>>,
    room_id: &str,
    user_id: &str,
) -> bool {
    let Some(members) = rooms.get_mut(room_id) else {
        return false;
    };
    let Some(connections) = members.get_mut(user_id) else {
        return false;
    };

    *connections = connections.saturating_sub(1);
    let went_offline = *connections == 0;
    if went_offline {
        members.remove(user_id);
    }
    if members.is_empty() {
        rooms.remove(room_id);
    }
    went_offline
}

fn snapshot_of(room_id: &str, members: Option<&BTreeMap<String, usize>>) -> RoomPresence {
    let user_ids: Vec<String> = members
        .map(|members| members.keys().cloned().collect())
        .unwrap_or_default();

    RoomPresence {
        room_id: room_id.to_owned(),
        online_count: user_ids.len(),
        user_ids,
    }
}
