//! # ModNet Chats Crate
//!
//! Core chat logic for ModNet: the course and module catalog, module
//! selection, module rooms and channels, messages with replies and
//! attachments, message reports and the in-memory presence registry.
//!
//! ## Architecture
//!
//! - **Services**: async functions over a SQLite pool, grouped into
//!   [`ModuleService`], [`MessagingService`] and [`AdminService`]
//! - **Storage**: attachment bytes on the local filesystem
//! - **Presence**: who is online in which room
//! - **Types**: API-facing views, request bodies and errors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modnet_chats::{MessagingService, NewMessage};
//!
//! let message = messaging.send_message(&user, &room_id, &NewMessage::text("hi")).await?;
//! ```

pub mod presence;
pub mod services;
pub mod storage;
pub mod types;
pub mod utils;

pub use presence::{PresenceChange, PresenceRegistry};
pub use services::{
    AdminService, AttachmentDownload, Deletion, MessagingService, ModuleService, NewUpload,
    RoomRef,
};
pub use storage::AttachmentStore;
pub use types::*;
