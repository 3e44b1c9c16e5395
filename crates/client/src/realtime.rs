use futures_util::{SinkExt, StreamExt};
use modnet_chats::{ClientEvent, ServerEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::ClientResult;

/// One realtime socket to the gateway.
pub struct RealtimeConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RealtimeConnection {
    pub async fn connect(api: &ApiClient) -> ClientResult<Self> {
        let url = api.websocket_url()?;
        let (socket, response) = connect_async(url.as_str()).await?;
        debug!(status = response.status().as_u16(), "realtime connection established");
        Ok(Self { socket })
    }

    pub async fn send(&mut self, event: &ClientEvent) -> ClientResult<()> {
        let text = serde_json::to_string(event)?;
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }

    pub async fn subscribe(&mut self, room_id: &str) -> ClientResult<()> {
        self.send(&ClientEvent::Subscribe {
            room_id: room_id.to_owned(),
        })
        .await
    }

    pub async fn unsubscribe(&mut self, room_id: &str) -> ClientResult<()> {
        self.send(&ClientEvent::Unsubscribe {
            room_id: room_id.to_owned(),
        })
        .await
    }

    pub async fn typing(&mut self, room_id: &str, is_typing: bool) -> ClientResult<()> {
        self.send(&ClientEvent::Typing {
            room_id: room_id.to_owned(),
            is_typing,
        })
        .await
    }

    pub async fn ping(&mut self) -> ClientResult<()> {
        self.send(&ClientEvent::Ping).await
    }

    /// Next server event, or `None` once the server closed the socket.
    /// Frames that do not decode are logged and skipped.
    pub async fn next_event(&mut self) -> ClientResult<Option<ServerEvent>> {
        while let Some(frame) = self.socket.next().await {
            match frame? {
                Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(error) => warn!(%error, "skipping undecodable realtime event"),
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> ClientResult<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}
