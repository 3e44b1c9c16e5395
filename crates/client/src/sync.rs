//! Keeps one room's timeline and presence current.
//!
//! The realtime socket is the primary feed. Whenever it is unavailable the
//! room is polled with `since` and a reconnect is attempted on every tick.
//! After each (re)connect a `since` poll closes the gap left while the socket
//! was down, and the timeline's deduplication absorbs the overlap.

use std::sync::Arc;
use std::time::Duration;

use modnet_chats::{RoomPresence, ServerEvent};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::{ClientError, ClientResult};
use crate::presence::PresenceView;
use crate::realtime::RealtimeConnection;
use crate::timeline::Timeline;

const UPDATE_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Connecting,
    Realtime,
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    Timeline { changed: usize },
    Presence(RoomPresence),
    Mode(SyncMode),
    Typing {
        user_id: String,
        display_name: String,
        is_typing: bool,
    },
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: u32,
    pub poll_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub struct SyncState {
    pub timeline: Timeline,
    pub presence: PresenceView,
    pub mode: SyncMode,
}

enum Flow {
    Continue,
    Stop,
}

pub struct RoomSync {
    api: ApiClient,
    room_id: String,
    options: SyncOptions,
    state: Arc<RwLock<SyncState>>,
    updates: mpsc::Sender<SyncUpdate>,
}

impl RoomSync {
    pub fn new(
        api: ApiClient,
        room_id: impl Into<String>,
        options: SyncOptions,
    ) -> (Self, mpsc::Receiver<SyncUpdate>) {
        let room_id = room_id.into();
        let (updates, receiver) = mpsc::channel(UPDATE_BUFFER);
        let state = SyncState {
            timeline: Timeline::new(room_id.clone()),
            presence: PresenceView::new(),
            mode: SyncMode::Connecting,
        };

        let sync = Self {
            api,
            room_id,
            options,
            state: Arc::new(RwLock::new(state)),
            updates,
        };
        (sync, receiver)
    }

    /// Shared view of the reconciled state.
    pub fn state(&self) -> Arc<RwLock<SyncState>> {
        Arc::clone(&self.state)
    }

    pub fn spawn(self) -> JoinHandle<ClientResult<()>> {
        tokio::spawn(self.run())
    }

    /// Run until the update receiver is dropped or access to the room ends.
    pub async fn run(self) -> ClientResult<()> {
        if let Flow::Stop = self.load_history().await? {
            return Ok(());
        }

        while !self.updates.is_closed() {
            match self.connect().await {
                Ok(connection) => {
                    if let Flow::Stop = self.set_mode(SyncMode::Realtime).await {
                        return Ok(());
                    }
                    match self.stream(connection).await {
                        Ok(Flow::Stop) => return Ok(()),
                        Ok(Flow::Continue) => info!(room_id = %self.room_id, "realtime feed closed"),
                        Err(error) if error.is_permanent() => return Err(error),
                        Err(error) => warn!(room_id = %self.room_id, %error, "realtime feed failed"),
                    }
                }
                Err(error) if error.is_permanent() => return Err(error),
                Err(error) => debug!(room_id = %self.room_id, %error, "realtime connect failed"),
            }

            if let Flow::Stop = self.set_mode(SyncMode::Polling).await {
                return Ok(());
            }
            match self.poll().await {
                Ok(Flow::Stop) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(error) if error.is_permanent() => return Err(error),
                Err(error) => warn!(room_id = %self.room_id, %error, "poll failed"),
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
        Ok(())
    }

    async fn load_history(&self) -> ClientResult<Flow> {
        let page = self
            .api
            .messages(&self.room_id, None, Some(self.options.page_size))
            .await?;
        let changed = self.state.write().await.timeline.apply_changes(page.messages);
        debug!(room_id = %self.room_id, changed, "history loaded");
        Ok(self.emit(SyncUpdate::Timeline { changed }).await)
    }

    async fn connect(&self) -> ClientResult<RealtimeConnection> {
        let mut connection = RealtimeConnection::connect(&self.api).await?;
        connection.subscribe(&self.room_id).await?;
        Ok(connection)
    }

    async fn stream(&self, mut connection: RealtimeConnection) -> ClientResult<Flow> {
        let mut subscribed = false;

        loop {
            let next = tokio::select! {
                event = connection.next_event() => Some(event),
                _ = self.updates.closed() => None,
            };
            let Some(event) = next else {
                let _ = connection.close().await;
                return Ok(Flow::Stop);
            };
            let Some(event) = event? else {
                break;
            };

            if event.room_id().is_some_and(|room_id| room_id != self.room_id) {
                continue;
            }

            let flow = match &event {
                ServerEvent::Subscribed { presence, .. } => {
                    subscribed = true;
                    // Messages sent before the subscription took effect.
                    if let Flow::Stop = self.catch_up().await? {
                        return Ok(Flow::Stop);
                    }
                    self.apply_presence(presence.clone()).await
                }
                ServerEvent::Presence { presence } => self.apply_presence(presence.clone()).await,
                ServerEvent::MessageCreated { .. }
                | ServerEvent::MessageUpdated { .. }
                | ServerEvent::MessageDeleted { .. } => {
                    let changed = self.state.write().await.timeline.apply_event(&event);
                    if changed {
                        self.emit(SyncUpdate::Timeline { changed: 1 }).await
                    } else {
                        Flow::Continue
                    }
                }
                ServerEvent::Typing {
                    user_id,
                    display_name,
                    is_typing,
                    ..
                } => {
                    self.emit(SyncUpdate::Typing {
                        user_id: user_id.clone(),
                        display_name: display_name.clone(),
                        is_typing: *is_typing,
                    })
                    .await
                }
                ServerEvent::Unsubscribed { .. } => {
                    return Err(ClientError::AccessRevoked {
                        room_id: self.room_id.clone(),
                    });
                }
                ServerEvent::Error {
                    message,
                    room_id: Some(_),
                } => {
                    if !subscribed {
                        warn!(room_id = %self.room_id, %message, "subscription refused");
                        return Err(ClientError::AccessRevoked {
                            room_id: self.room_id.clone(),
                        });
                    }
                    warn!(room_id = %self.room_id, %message, "resynchronising room");
                    self.catch_up().await?
                }
                ServerEvent::Error { message, .. } => {
                    warn!(%message, "server reported an error");
                    Flow::Continue
                }
                ServerEvent::Hello { .. } | ServerEvent::Pong => Flow::Continue,
            };

            if let Flow::Stop = flow {
                let _ = connection.close().await;
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }

    /// One polling tick: changed messages and a fresh presence snapshot.
    async fn poll(&self) -> ClientResult<Flow> {
        if let Flow::Stop = self.catch_up().await? {
            return Ok(Flow::Stop);
        }

        match self.api.room_presence(&self.room_id).await {
            Ok(presence) => Ok(self.apply_presence(presence).await),
            Err(error) => {
                debug!(room_id = %self.room_id, %error, "presence refresh failed");
                Ok(Flow::Continue)
            }
        }
    }

    /// Fetch everything that changed after the timeline cursor.
    async fn catch_up(&self) -> ClientResult<Flow> {
        loop {
            let cursor = self.state.read().await.timeline.cursor();
            let page = match cursor {
                Some(since) => self.api.messages_since(&self.room_id, since).await?,
                None => {
                    self.api
                        .messages(&self.room_id, None, Some(self.options.page_size))
                        .await?
                }
            };

            let has_more = page.has_more && cursor.is_some();
            let changed = self.state.write().await.timeline.apply_changes(page.messages);
            if changed > 0 {
                if let Flow::Stop = self.emit(SyncUpdate::Timeline { changed }).await {
                    return Ok(Flow::Stop);
                }
            }

            let advanced = self.state.read().await.timeline.cursor() != cursor;
            if !has_more || !advanced {
                return Ok(Flow::Continue);
            }
        }
    }

    async fn apply_presence(&self, presence: RoomPresence) -> Flow {
        let changed = self.state.write().await.presence.apply(presence.clone());
        if changed {
            self.emit(SyncUpdate::Presence(presence)).await
        } else {
            Flow::Continue
        }
    }

    async fn set_mode(&self, mode: SyncMode) -> Flow {
        {
            let mut state = self.state.write().await;
            if state.mode == mode {
                return Flow::Continue;
            }
            state.mode = mode;
        }
        debug!(room_id = %self.room_id, ?mode, "sync mode changed");
        self.emit(SyncUpdate::Mode(mode)).await
    }

    async fn emit(&self, update: SyncUpdate) -> Flow {
        match self.updates.send(update).await {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Stop,
        }
    }
}
