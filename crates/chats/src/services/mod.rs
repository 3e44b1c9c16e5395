//! Business logic for modules, rooms, messages and moderation.
//!
//! Each submodule exposes plain async functions over a [`SqlitePool`]. The
//! service structs below bundle a pool with its settings so the gateway can
//! hold one handle per concern.

pub mod attachments;
pub mod catalog;
pub mod enrollment;
pub mod messages;
pub mod reports;
pub mod rooms;

#[cfg(test)]
pub mod test_utils;

use bytes::Bytes;
use modnet_auth::User;
use modnet_config::{MessagingConfig, StorageConfig};
use sqlx::SqlitePool;

pub use attachments::{AttachmentDownload, NewUpload};
pub use messages::Deletion;
pub use rooms::RoomRef;

use crate::storage::AttachmentStore;
use crate::types::{
    AttachmentView, ChatResult, Course, Enrollment, MessagePage, MessageView, ModerationStats,
    Module, NewMessage, ReportAction, ReportStatus, ReportView, RoomSummary,
};

/// Course catalog and per-student module selection.
#[derive(Debug, Clone)]
pub struct ModuleService {
    pool: SqlitePool,
}

impl ModuleService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_courses(&self) -> ChatResult<Vec<Course>> {
        catalog::list_courses(&self.pool).await
    }

    pub async fn list_modules(&self, course_id: &str, semester: Option<i64>) -> ChatResult<Vec<Module>> {
        catalog::list_modules(&self.pool, course_id, semester).await
    }

    pub async fn create_course(&self, code: &str, name: &str, semesters: i64) -> ChatResult<Course> {
        catalog::create_course(&self.pool, code, name, semesters).await
    }

    pub async fn create_module(
        &self,
        course_id: &str,
        code: &str,
        name: &str,
        semester: i64,
    ) -> ChatResult<Module> {
        catalog::create_module(&self.pool, course_id, code, name, semester).await
    }

    pub async fn my_modules(&self, user: &User) -> ChatResult<Enrollment> {
        enrollment::enrollment(&self.pool, user.id).await
    }

    pub async fn select_course(&self, user: &User, course_id: &str, semester: i64) -> ChatResult<Enrollment> {
        enrollment::select_course(&self.pool, user.id, course_id, semester).await
    }

    pub async fn select_modules(&self, user: &User, module_ids: &[String]) -> ChatResult<Enrollment> {
        enrollment::select_modules(&self.pool, user.id, module_ids).await
    }
}

/// Rooms, channels, messages and attachments.
#[derive(Debug, Clone)]
pub struct MessagingService {
    pool: SqlitePool,
    store: AttachmentStore,
    messaging: MessagingConfig,
    storage: StorageConfig,
}

impl MessagingService {
    pub fn new(
        pool: SqlitePool,
        store: AttachmentStore,
        messaging: MessagingConfig,
        storage: StorageConfig,
    ) -> Self {
        Self {
            pool,
            store,
            messaging,
            storage,
        }
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    pub async fn require_membership(&self, room_id: &str, user: &User) -> ChatResult<RoomRef> {
        rooms::require_membership(&self.pool, room_id, user.id).await
    }

    pub async fn list_my_rooms(&self, user: &User) -> ChatResult<Vec<RoomSummary>> {
        rooms::list_my_rooms(&self.pool, user.id).await
    }

    pub async fn discover_channels(&self, user: &User) -> ChatResult<Vec<RoomSummary>> {
        rooms::discover_channels(&self.pool, user.id).await
    }

    pub async fn create_channel(
        &self,
        user: &User,
        name: &str,
        description: Option<&str>,
    ) -> ChatResult<RoomSummary> {
        rooms::create_channel(&self.pool, user.id, name, description).await
    }

    pub async fn join_channel(&self, user: &User, room_id: &str) -> ChatResult<RoomSummary> {
        rooms::join_channel(&self.pool, user.id, room_id).await
    }

    pub async fn leave_channel(&self, user: &User, room_id: &str) -> ChatResult<RoomSummary> {
        rooms::leave_channel(&self.pool, user.id, room_id).await
    }

    pub async fn send_message(&self, user: &User, room_id: &str, message: &NewMessage) -> ChatResult<MessageView> {
        messages::send_message(&self.pool, &self.messaging, room_id, user.id, message).await
    }

    pub async fn list_messages(
        &self,
        user: &User,
        room_id: &str,
        before: Option<&str>,
        limit: Option<u32>,
    ) -> ChatResult<MessagePage> {
        messages::list_messages(&self.pool, &self.messaging, room_id, user.id, before, limit).await
    }

    pub async fn messages_since(&self, user: &User, room_id: &str, since: i64) -> ChatResult<MessagePage> {
        messages::messages_since(&self.pool, &self.messaging, room_id, user.id, since).await
    }

    pub async fn edit_message(
        &self,
        user: &User,
        room_id: &str,
        message_id: &str,
        content: &str,
    ) -> ChatResult<MessageView> {
        messages::edit_message(&self.pool, &self.messaging, room_id, message_id, user.id, content).await
    }

    pub async fn delete_message(&self, user: &User, room_id: &str, message_id: &str) -> ChatResult<Deletion> {
        messages::delete_message(&self.pool, room_id, message_id, user).await
    }

    pub async fn upload_attachment(
        &self,
        user: &User,
        room_id: &str,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> ChatResult<AttachmentView> {
        let upload = NewUpload::new(file_name, content_type, data);
        attachments::upload_attachment(&self.pool, &self.store, &self.storage, room_id, user.id, upload).await
    }

    pub async fn download_attachment(&self, user: &User, attachment_id: &str) -> ChatResult<AttachmentDownload> {
        attachments::download_attachment(&self.pool, &self.store, attachment_id, user.id).await
    }

    pub async fn report_message(
        &self,
        user: &User,
        room_id: &str,
        message_id: &str,
        reason: &str,
    ) -> ChatResult<ReportView> {
        reports::report_message(&self.pool, room_id, message_id, user.id, reason).await
    }
}

/// Moderation queue and platform counters.
#[derive(Debug, Clone)]
pub struct AdminService {
    pool: SqlitePool,
}

impl AdminService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_reports(&self, status: Option<ReportStatus>) -> ChatResult<Vec<ReportView>> {
        reports::list_reports(&self.pool, status).await
    }

    pub async fn resolve_report(
        &self,
        admin: &User,
        report_id: &str,
        action: ReportAction,
    ) -> ChatResult<(ReportView, Option<MessageView>)> {
        reports::resolve_report(&self.pool, report_id, admin.id, action).await
    }

    pub async fn stats(&self) -> ChatResult<ModerationStats> {
        reports::stats(&self.pool).await
    }
}
