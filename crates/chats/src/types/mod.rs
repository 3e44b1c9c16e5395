//! Shared types for the chat services.

pub mod errors;
pub mod events;
pub mod requests;
pub mod views;

pub(crate) use errors::conflict_on_unique;
pub use errors::{ChatError, ChatResult};
pub use events::{ClientEvent, ServerEvent};
pub use requests::*;
pub use views::*;
