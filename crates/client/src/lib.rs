//! # ModNet Client Crate
//!
//! Client side of ModNet: a typed REST client, the realtime socket and the
//! reconciliation that merges pushed events with polled history.
//!
//! ```rust,ignore
//! use modnet_client::{ApiClient, RoomSync, SyncOptions};
//!
//! let api = ApiClient::new("http://127.0.0.1:7070")?.with_token(token);
//! let (sync, mut updates) = RoomSync::new(api, room_id, SyncOptions::default());
//! let state = sync.state();
//! let task = sync.spawn();
//! while let Some(update) = updates.recv().await {
//!     println!("{} messages", state.read().await.timeline.len());
//! }
//! ```

pub mod api;
pub mod error;
pub mod presence;
pub mod realtime;
pub mod sync;
pub mod timeline;

pub use api::{ApiClient, LoginCode, Profile, Session};
pub use error::{ClientError, ClientResult};
pub use presence::PresenceView;
pub use realtime::RealtimeConnection;
pub use sync::{RoomSync, SyncMode, SyncOptions, SyncState, SyncUpdate};
pub use timeline::Timeline;

pub use modnet_chats::{
    AttachmentView, AuthorView, ClientEvent, Course, Enrollment, MessagePage, MessageView, Module,
    NewChannel, NewMessage, ReplyPreview, RoomKind, RoomPresence, RoomSummary, ServerEvent,
};
