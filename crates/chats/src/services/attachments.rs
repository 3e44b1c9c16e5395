//! Uploading and serving message attachments.
//!
//! Uploads start out pending (no message). Sending a message that lists the
//! upload links the two; pending uploads that never get linked are purged by
//! housekeeping.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use modnet_config::StorageConfig;
use modnet_database::{new_public_id, time};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use super::messages::attachment_url;
use super::rooms::{is_member, require_membership};
use crate::storage::AttachmentStore;
use crate::types::{AttachmentView, ChatError, ChatResult};
use crate::utils::validation;

/// A file received from a client, not yet validated.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl NewUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// Attachment bytes ready to be served.
#[derive(Debug, Clone)]
pub struct AttachmentDownload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Strip parameters and normalise case, e.g. `Text/Plain; charset=utf-8`.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub async fn upload_attachment(
    pool: &SqlitePool,
    store: &AttachmentStore,
    settings: &StorageConfig,
    room_id: &str,
    user_id: i64,
    upload: NewUpload,
) -> ChatResult<AttachmentView> {
    let room = require_membership(pool, room_id, user_id).await?;
    let NewUpload {
        file_name,
        content_type,
        data,
    } = upload;

    if data.len() as u64 > settings.max_attachment_bytes {
        return Err(ChatError::PayloadTooLarge {
            limit: settings.max_attachment_bytes,
        });
    }
    if data.is_empty() {
        return Err(ChatError::validation("attachment is empty"));
    }

    let content_type = essence(&content_type);
    if !settings
        .allowed_content_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&content_type))
    {
        return Err(ChatError::UnsupportedMediaType { content_type });
    }

    let file_name = validation::file_name(&file_name);
    let public_id = new_public_id();
    let storage_key = AttachmentStore::new_key();
    let size_bytes = data.len() as i64;

    store.put(&storage_key, &data).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO attachments (public_id, room_id, uploader_id, message_id, file_name, content_type, size_bytes, storage_key, created_at)
        VALUES (?, ?, ?, NULL, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(room.id)
    .bind(user_id)
    .bind(&file_name)
    .bind(&content_type)
    .bind(size_bytes)
    .bind(&storage_key)
    .bind(time::now())
    .execute(pool)
    .await;

    if let Err(error) = inserted {
        if let Err(cleanup) = store.remove(&storage_key).await {
            warn!(key = %storage_key, error = %cleanup, "failed to remove orphaned upload");
        }
        return Err(error.into());
    }

    info!(room = %room.public_id, attachment = %public_id, size_bytes, "attachment uploaded");
    Ok(AttachmentView {
        url: attachment_url(&public_id),
        id: public_id,
        file_name,
        content_type,
        size_bytes,
    })
}

/// Load an attachment for a room member.
///
/// Attachments of deleted messages are gone for everyone. Pending uploads are
/// only visible to the uploader.
pub async fn download_attachment(
    pool: &SqlitePool,
    store: &AttachmentStore,
    attachment_id: &str,
    user_id: i64,
) -> ChatResult<AttachmentDownload> {
    let row = sqlx::query(
        r#"
        SELECT a.room_id, a.uploader_id, a.message_id, a.file_name, a.content_type, a.storage_key,
               m.deleted_at AS message_deleted_at
        FROM attachments a
        LEFT JOIN messages m ON m.id = a.message_id
        WHERE a.public_id = ?
        "#,
    )
    .bind(attachment_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ChatError::not_found("attachment"))?;

    let room_db_id: i64 = row.try_get("room_id")?;
    if !is_member(pool, room_db_id, user_id).await? {
        return Err(ChatError::forbidden("not a member of this room"));
    }

    let message_id: Option<i64> = row.try_get("message_id")?;
    let uploader: i64 = row.try_get("uploader_id")?;
    if message_id.is_none() && uploader != user_id {
        return Err(ChatError::not_found("attachment"));
    }
    if row.try_get::<Option<String>, _>("message_deleted_at")?.is_some() {
        return Err(ChatError::not_found("attachment"));
    }

    let storage_key: String = row.try_get("storage_key")?;
    let data = store.read(&storage_key).await?;

    Ok(AttachmentDownload {
        file_name: row.try_get("file_name")?,
        content_type: row.try_get("content_type")?,
        data,
    })
}

/// Remove pending uploads created before `older_than`. Returns how many went.
pub async fn purge_orphaned_uploads(
    pool: &SqlitePool,
    store: &AttachmentStore,
    older_than: DateTime<Utc>,
) -> ChatResult<u64> {
    let rows = sqlx::query(
        "SELECT id, storage_key FROM attachments WHERE message_id IS NULL AND created_at < ?",
    )
    .bind(time::encode(older_than))
    .fetch_all(pool)
    .await?;

    let mut purged = 0;
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let storage_key: String = row.try_get("storage_key")?;

        if let Err(error) = store.remove(&storage_key).await {
            warn!(key = %storage_key, error = %error, "failed to remove orphaned upload");
            continue;
        }
        purged += sqlx::query("DELETE FROM attachments WHERE id = ? AND message_id IS NULL")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
    }

    if purged > 0 {
        info!(purged, "purged orphaned uploads");
    }
    Ok(purged)
}
