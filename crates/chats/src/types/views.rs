//! Shapes returned to API consumers. Identifiers are public ids throughout.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RoomKind {
    Module,
    Channel,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub semesters: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Module {
    pub id: String,
    pub course_id: String,
    pub code: String,
    pub name: String,
    pub semester: i64,
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Enrollment {
    pub course: Option<Course>,
    pub semester: Option<i64>,
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomSummary {
    pub id: String,
    pub kind: RoomKind,
    pub name: String,
    pub description: Option<String>,
    pub module_id: Option<String>,
    pub member_count: i64,
    pub joined: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthorView {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReplyPreview {
    pub id: String,
    pub author: Option<AuthorView>,
    /// Leading part of the parent message. `None` once the parent is deleted.
    pub excerpt: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttachmentView {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub url: String,
}

/// A message as seen by room members.
///
/// Deleted messages are delivered as tombstones: `deleted_at` is set and the
/// content and attachments are withheld, so clients can drop them from their
/// timelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageView {
    pub id: String,
    pub room_id: String,
    pub author: AuthorView,
    pub content: Option<String>,
    pub reply_to: Option<ReplyPreview>,
    pub attachments: Vec<AttachmentView>,
    pub created_at: String,
    pub updated_at: String,
    pub edited_at: Option<String>,
    pub deleted_at: Option<String>,
    /// Position in the change feed. Grows with every send, edit and delete,
    /// in commit order; `since` polls resume from the highest value seen.
    pub seq: i64,
}

impl MessageView {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReportStatus {
    Open,
    Dismissed,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    Dismiss,
    RemoveMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportView {
    pub id: String,
    pub room_id: String,
    pub message_id: String,
    pub message_author: AuthorView,
    pub message_excerpt: Option<String>,
    pub message_deleted: bool,
    pub reporter: AuthorView,
    pub reason: String,
    pub status: ReportStatus,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ModerationStats {
    pub users: i64,
    pub suspended_users: i64,
    pub rooms: i64,
    pub messages: i64,
    pub deleted_messages: i64,
    pub open_reports: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoomPresence {
    pub room_id: String,
    pub online_count: usize,
    pub user_ids: Vec<String>,
}
