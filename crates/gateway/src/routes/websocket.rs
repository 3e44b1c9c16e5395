//! Realtime connection handling.
//!
//! Each socket gets a writer task fed by an mpsc queue and one forwarder task
//! per subscribed room that relays the room's hub channel into that queue.
//! Forwarders report revoked access back to the connection loop, which then
//! drops the subscription and releases presence.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use modnet_auth::User;
use modnet_chats::{ClientEvent, ServerEvent};
use serde::Deserialize;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use utoipa::IntoParams;

use crate::{hub::HubEvent, util::require_bearer, ApiError, AppState};

const OUTBOUND_BUFFER: usize = 128;
const REVOCATION_BUFFER: usize = 16;

#[derive(Debug, Deserialize, IntoParams)]
pub struct WebSocketQuery {
    /// Session token; an `Authorization: Bearer` header works as well.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "WebSocket",
    params(WebSocketQuery),
    responses(
        (status = 101, description = "Switching to the realtime protocol"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Consent required", body = crate::error::ErrorResponse),
        (status = 426, description = "Not a websocket upgrade request", body = crate::error::ErrorResponse)
    )
)]
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(query): Query<WebSocketQuery>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let token = match query.token.filter(|token| !token.is_empty()) {
        Some(token) => token,
        None => require_bearer(&headers)?,
    };
    let (user, _) = state.authenticate(&token).await?;
    state.authenticator().require_consent(&user)?;

    let ws = ws.ok_or_else(|| {
        ApiError::new(StatusCode::UPGRADE_REQUIRED, "websocket upgrade required")
    })?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);
    let (revoked, mut revoked_rx) = mpsc::channel::<String>(REVOCATION_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(error) => {
                    warn!(%error, "failed to encode realtime event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    info!(user = %user.public_id, "realtime connection opened");
    let mut connection = Connection {
        state,
        user,
        outbound,
        revoked,
        subscriptions: HashMap::new(),
    };
    connection
        .send(ServerEvent::Hello {
            user_id: connection.user.public_id.clone(),
            display_name: connection.user.display_name.clone(),
        })
        .await;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => connection.handle_text(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(user = %connection.user.public_id, %error, "realtime socket error");
                    break;
                }
            },
            Some(room_id) = revoked_rx.recv() => {
                if connection.drop_subscription(&room_id).await {
                    connection.send(ServerEvent::Unsubscribed { room_id }).await;
                }
            }
        }
    }

    connection.close().await;
    let _ = writer.await;
}

struct Connection {
    state: AppState,
    user: User,
    outbound: mpsc::Sender<ServerEvent>,
    revoked: mpsc::Sender<String>,
    subscriptions: HashMap<String, JoinHandle<()>>,
}

impl Connection {
    async fn send(&self, event: ServerEvent) {
        let _ = self.outbound.send(event).await;
    }

    async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(error) => {
                debug!(user = %self.user.public_id, %error, "unparseable client event");
                self.send(ServerEvent::error("invalid event format", None)).await;
            }
        }
    }

    async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Subscribe { room_id } => self.subscribe(room_id).await,
            ClientEvent::Unsubscribe { room_id } => {
                self.drop_subscription(&room_id).await;
                self.send(ServerEvent::Unsubscribed { room_id }).await;
            }
            ClientEvent::Typing { room_id, is_typing } => {
                if !self.subscriptions.contains_key(&room_id) {
                    self.send(ServerEvent::error("not subscribed to room", Some(&room_id)))
                        .await;
                    return;
                }
                self.state
                    .broadcast(ServerEvent::Typing {
                        room_id,
                        user_id: self.user.public_id.clone(),
                        display_name: self.user.display_name.clone(),
                        is_typing,
                    })
                    .await;
            }
            ClientEvent::Ping => self.send(ServerEvent::Pong).await,
        }
    }

    /// Membership and consent are checked against fresh data, since either
    /// may have changed after the socket was opened.
    async fn authorize(&self, room_id: &str) -> Result<(), ApiError> {
        let user = self.state.authenticator().user_profile(self.user.id).await?;
        if user.is_suspended() {
            return Err(ApiError::forbidden("account is suspended"));
        }
        self.state.authenticator().require_consent(&user)?;
        self.state.messaging().require_membership(room_id, &user).await?;
        Ok(())
    }

    async fn subscribe(&mut self, room_id: String) {
        if self.subscriptions.contains_key(&room_id) {
            let presence = self.state.presence().snapshot(&room_id).await;
            self.send(ServerEvent::Subscribed { room_id, presence }).await;
            return;
        }

        // The receiver exists before access is checked, so a revocation
        // published while the check runs is queued for the forwarder.
        let receiver = self.state.hub().subscribe(&room_id).await;
        if let Err(error) = self.authorize(&room_id).await {
            self.send(ServerEvent::error(error.message, Some(&room_id))).await;
            return;
        }

        let forwarder = spawn_forwarder(
            receiver,
            room_id.clone(),
            self.user.public_id.clone(),
            self.outbound.clone(),
            self.revoked.clone(),
        );
        self.subscriptions.insert(room_id.clone(), forwarder);

        let change = self.state.presence().join(&room_id, &self.user.public_id).await;
        debug!(user = %self.user.public_id, room_id = %room_id, "subscribed");
        self.send(ServerEvent::Subscribed {
            room_id,
            presence: change.presence.clone(),
        })
        .await;
        if change.changed {
            self.state
                .broadcast(ServerEvent::Presence {
                    presence: change.presence,
                })
                .await;
        }
    }

    /// Returns false when the room was not subscribed.
    async fn drop_subscription(&mut self, room_id: &str) -> bool {
        let Some(forwarder) = self.subscriptions.remove(room_id) else {
            return false;
        };
        forwarder.abort();

        let change = self.state.presence().leave(room_id, &self.user.public_id).await;
        if change.changed {
            self.state
                .broadcast(ServerEvent::Presence {
                    presence: change.presence,
                })
                .await;
        }
        true
    }

    async fn close(mut self) {
        let rooms: Vec<String> = self
            .subscriptions
            .drain()
            .map(|(room_id, forwarder)| {
                forwarder.abort();
                room_id
            })
            .collect();

        let changes = self
            .state
            .presence()
            .disconnect(&self.user.public_id, &rooms)
            .await;
        for change in changes.into_iter().filter(|change| change.changed) {
            self.state
                .broadcast(ServerEvent::Presence {
                    presence: change.presence,
                })
                .await;
        }

        info!(user = %self.user.public_id, rooms = rooms.len(), "realtime connection closed");
    }
}

fn spawn_forwarder(
    mut receiver: broadcast::Receiver<HubEvent>,
    room_id: String,
    user_id: String,
    outbound: mpsc::Sender<ServerEvent>,
    revoked: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(HubEvent::Broadcast(event)) => {
                    if outbound.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(HubEvent::Revoke { user_id: target }) => {
                    if target == user_id {
                        let _ = revoked.send(room_id).await;
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(room_id = %room_id, user = %user_id, skipped, "realtime subscriber lagged");
                    let notice = ServerEvent::error(
                        format!("missed {skipped} events, resynchronise the room"),
                        Some(&room_id),
                    );
                    if outbound.send(notice).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
