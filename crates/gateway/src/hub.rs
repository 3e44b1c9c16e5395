//! Fan-out of realtime events to every connection subscribed to a room.

use std::collections::HashMap;
use std::sync::Arc;

use modnet_chats::ServerEvent;
use tokio::sync::{broadcast, Mutex};

const ROOM_CHANNEL_CAPACITY: usize = 256;

/// What travels through a room channel.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Forwarded verbatim to subscribed clients.
    Broadcast(ServerEvent),
    /// The user lost access; their connections must drop the subscription.
    Revoke { user_id: String },
}

#[derive(Debug, Clone, Default)]
pub struct RoomHub {
    rooms: Arc<Mutex<HashMap<String, broadcast::Sender<HubEvent>>>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, room_id: &str) -> broadcast::Receiver<HubEvent> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id.to_owned())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send `event` to the room's subscribers and return how many received it.
    pub async fn publish(&self, room_id: &str, event: ServerEvent) -> usize {
        self.send(room_id, HubEvent::Broadcast(event)).await
    }

    pub async fn revoke(&self, room_id: &str, user_id: &str) {
        self.send(
            room_id,
            HubEvent::Revoke {
                user_id: user_id.to_owned(),
            },
        )
        .await;
    }

    pub async fn revoke_everywhere(&self, user_id: &str) {
        let rooms = self.rooms.lock().await;
        for sender in rooms.values() {
            let _ = sender.send(HubEvent::Revoke {
                user_id: user_id.to_owned(),
            });
        }
    }

    pub async fn subscriber_count(&self, room_id: &str) -> usize {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room_id)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    async fn send(&self, room_id: &str, event: HubEvent) -> usize {
        let mut rooms = self.rooms.lock().await;
        let Some(sender) = rooms.get(room_id) else {
            return 0;
        };
        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                rooms.remove(room_id);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_current_subscribers_only() {
        let hub = RoomHub::new();
        assert_eq!(hub.publish("r1", ServerEvent::Pong).await, 0);

        let mut first = hub.subscribe("r1").await;
        let mut second = hub.subscribe("r1").await;
        assert_eq!(hub.subscriber_count("r1").await, 2);
        assert_eq!(hub.publish("r1", ServerEvent::Pong).await, 2);

        assert!(matches!(first.recv().await, Ok(HubEvent::Broadcast(ServerEvent::Pong))));
        assert!(matches!(second.recv().await, Ok(HubEvent::Broadcast(ServerEvent::Pong))));
    }

    #[tokio::test]
    async fn abandoned_rooms_are_dropped_on_publish() {
        let hub = RoomHub::new();
        let receiver = hub.subscribe("r1").await;
        drop(receiver);

        assert_eq!(hub.publish("r1", ServerEvent::Pong).await, 0);
        assert!(hub.rooms.lock().await.is_empty());
    }

    #[tokio::test]
    async fn revoke_everywhere_signals_each_room() {
        let hub = RoomHub::new();
        let mut a = hub.subscribe("a").await;
        let mut b = hub.subscribe("b").await;

        hub.revoke_everywhere("u1").await;

        for receiver in [&mut a, &mut b] {
            match receiver.recv().await {
                Ok(HubEvent::Revoke { user_id }) => assert_eq!(user_id, "u1"),
                other => panic!("unexpected hub event: {other:?}"),
            }
        }
    }
}
