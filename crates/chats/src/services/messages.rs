//! Sending, paging, editing and soft-deleting room messages.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use modnet_auth::User;
use modnet_config::MessagingConfig;
use modnet_database::{new_public_id, time};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::rooms::{find_room, require_membership, RoomRef};
use crate::types::{
    AttachmentView, AuthorView, ChatError, ChatResult, MessagePage, MessageView, NewMessage,
    ReplyPreview,
};
use crate::utils::validation;

const MESSAGE_SELECT: &str = r#"
    SELECT m.id AS message_db_id, m.public_id, r.public_id AS room_public_id,
           a.public_id AS author_public_id, a.display_name AS author_name,
           m.content, m.created_at, m.updated_at, m.edited_at, m.deleted_at, m.seq,
           p.public_id AS parent_public_id, p.content AS parent_content,
           p.deleted_at AS parent_deleted_at,
           pa.public_id AS parent_author_public_id, pa.display_name AS parent_author_name
    FROM messages m
    JOIN rooms r ON r.id = m.room_id
    JOIN users a ON a.id = m.author_id
    LEFT JOIN messages p ON p.id = m.reply_to_id
    LEFT JOIN users pa ON pa.id = p.author_id
"#;

/// Next change feed position. Evaluated inside the writing statement, so
/// SQLite's single writer lock makes sequence order equal commit order.
pub(crate) const NEXT_SEQ: &str = "(SELECT COALESCE(MAX(seq), 0) + 1 FROM messages)";

/// Row-level facts about a message, used for permission checks.
#[derive(Debug, Clone)]
pub(crate) struct MessageRef {
    pub id: i64,
    pub author_id: i64,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

/// Outcome of a delete request.
#[derive(Debug, Clone)]
pub struct Deletion {
    pub message: MessageView,
    /// False when the message was already a tombstone.
    pub newly_deleted: bool,
}

fn view_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<(i64, MessageView), sqlx::Error> {
    let deleted_at: Option<String> = row.try_get("deleted_at")?;
    let content: String = row.try_get("content")?;

    let parent_id: Option<String> = row.try_get("parent_public_id")?;
    let reply_to = match parent_id {
        Some(id) => {
            let parent_deleted = row.try_get::<Option<String>, _>("parent_deleted_at")?.is_some();
            let parent_content: Option<String> = row.try_get("parent_content")?;
            let author = match row.try_get::<Option<String>, _>("parent_author_public_id")? {
                Some(author_id) => Some(AuthorView {
                    id: author_id,
                    display_name: row.try_get("parent_author_name")?,
                }),
                None => None,
            };
            Some(ReplyPreview {
                id,
                author,
                excerpt: if parent_deleted {
                    None
                } else {
                    parent_content.as_deref().map(validation::excerpt)
                },
                deleted: parent_deleted,
            })
        }
        None => None,
    };

    let view = MessageView {
        id: row.try_get("public_id")?,
        room_id: row.try_get("room_public_id")?,
        author: AuthorView {
            id: row.try_get("author_public_id")?,
            display_name: row.try_get("author_name")?,
        },
        content: if deleted_at.is_some() { None } else { Some(content) },
        reply_to,
        attachments: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        edited_at: row.try_get("edited_at")?,
        deleted_at,
        seq: row.try_get("seq")?,
    };

    Ok((row.try_get("message_db_id")?, view))
}

pub(crate) fn attachment_url(public_id: &str) -> String {
    format!("/api/attachments/{public_id}")
}

/// Turn rows into views and load attachments of live messages in one query.
async fn hydrate(
    pool: &SqlitePool,
    rows: &[sqlx::sqlite::SqliteRow],
) -> ChatResult<Vec<MessageView>> {
    let mut messages = rows
        .iter()
        .map(view_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let live: Vec<i64> = messages
        .iter()
        .filter(|(_, view)| !view.is_deleted())
        .map(|(id, _)| *id)
        .collect();

    if !live.is_empty() {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT message_id, public_id, file_name, content_type, size_bytes FROM attachments WHERE message_id IN (",
        );
        let mut ids = builder.separated(", ");
        for id in &live {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY id ASC");

        let mut by_message: HashMap<i64, Vec<AttachmentView>> = HashMap::new();
        for row in builder.build().fetch_all(pool).await? {
            let public_id: String = row.try_get("public_id")?;
            by_message
                .entry(row.try_get("message_id")?)
                .or_default()
                .push(AttachmentView {
                    url: attachment_url(&public_id),
                    id: public_id,
                    file_name: row.try_get("file_name")?,
                    content_type: row.try_get("content_type")?,
                    size_bytes: row.try_get("size_bytes")?,
                });
        }

        for (id, view) in &mut messages {
            if let Some(attachments) = by_message.remove(id) {
                view.attachments = attachments;
            }
        }
    }

    Ok(messages.into_iter().map(|(_, view)| view).collect())
}

pub(crate) async fn fetch_message(pool: &SqlitePool, message_db_id: i64) -> ChatResult<MessageView> {
    let row = sqlx::query(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
        .bind(message_db_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::not_found("message"))?;

    hydrate(pool, std::slice::from_ref(&row))
        .await?
        .pop()
        .ok_or_else(|| ChatError::not_found("message"))
}

/// Resolve a message by public id, scoped to a room.
pub(crate) async fn find_message(
    pool: &SqlitePool,
    room: &RoomRef,
    message_id: &str,
) -> ChatResult<MessageRef> {
    let row = sqlx::query(
        "SELECT id, author_id, created_at, deleted_at FROM messages WHERE public_id = ? AND room_id = ?",
    )
    .bind(message_id)
    .bind(room.id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ChatError::not_found("message"))?;

    Ok(MessageRef {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Mark a message deleted. Returns false if it already was.
pub(crate) async fn soft_delete(pool: &SqlitePool, message_db_id: i64) -> ChatResult<bool> {
    let now = time::now();
    let result = sqlx::query(&format!(
        "UPDATE messages SET deleted_at = ?, updated_at = ?, seq = {NEXT_SEQ} WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(&now)
    .bind(&now)
    .bind(message_db_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn send_message(
    pool: &SqlitePool,
    settings: &MessagingConfig,
    room_id: &str,
    author_id: i64,
    message: &NewMessage,
) -> ChatResult<MessageView> {
    let room = require_membership(pool, room_id, author_id).await?;

    let mut seen = HashSet::new();
    let attachment_ids: Vec<&str> = message
        .attachment_ids
        .iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect();
    if attachment_ids.len() > validation::MAX_ATTACHMENTS_PER_MESSAGE {
        return Err(ChatError::validation(format!(
            "a message can carry at most {} attachments",
            validation::MAX_ATTACHMENTS_PER_MESSAGE
        )));
    }

    let content = validation::message_content(
        &message.content,
        settings.max_message_length,
        !attachment_ids.is_empty(),
    )?;

    let reply_to_db_id = match message.reply_to.as_deref() {
        Some(parent_id) => {
            let parent = sqlx::query("SELECT id, room_id, deleted_at FROM messages WHERE public_id = ?")
                .bind(parent_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| ChatError::not_found("message"))?;

            let parent_room: i64 = parent.try_get("room_id")?;
            if parent_room != room.id {
                return Err(ChatError::validation("replies must stay in the same room"));
            }
            if parent.try_get::<Option<String>, _>("deleted_at")?.is_some() {
                return Err(ChatError::MessageDeleted);
            }
            Some(parent.try_get::<i64, _>("id")?)
        }
        None => None,
    };

    let mut pending = Vec::with_capacity(attachment_ids.len());
    for attachment_id in &attachment_ids {
        let row = sqlx::query(
            "SELECT id, room_id, uploader_id, message_id FROM attachments WHERE public_id = ?",
        )
        .bind(attachment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::not_found("attachment"))?;

        let uploader: i64 = row.try_get("uploader_id")?;
        let attachment_room: i64 = row.try_get("room_id")?;
        if uploader != author_id || attachment_room != room.id {
            return Err(ChatError::forbidden(
                "attachments must be your own uploads to this room",
            ));
        }
        if row.try_get::<Option<i64>, _>("message_id")?.is_some() {
            return Err(ChatError::conflict("attachment is already part of a message"));
        }
        pending.push(row.try_get::<i64, _>("id")?);
    }

    let public_id = new_public_id();
    let now = time::now();

    let mut tx = pool.begin().await?;

    let message_db_id = sqlx::query(&format!(
        r#"
        INSERT INTO messages (public_id, room_id, author_id, content, reply_to_id, created_at, updated_at, seq)
        VALUES (?, ?, ?, ?, ?, ?, ?, {NEXT_SEQ})
        "#
    ))
    .bind(&public_id)
    .bind(room.id)
    .bind(author_id)
    .bind(&content)
    .bind(reply_to_db_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for attachment_db_id in &pending {
        let linked = sqlx::query(
            "UPDATE attachments SET message_id = ? WHERE id = ? AND message_id IS NULL",
        )
        .bind(message_db_id)
        .bind(attachment_db_id)
        .execute(&mut *tx)
        .await?;
        if linked.rows_affected() != 1 {
            return Err(ChatError::conflict("attachment is already part of a message"));
        }
    }

    tx.commit().await?;

    debug!(room = %room.public_id, message = %public_id, attachments = pending.len(), "message stored");
    fetch_message(pool, message_db_id).await
}

/// The newest page of a room, or the page just before `before`.
///
/// Messages come back oldest first.
pub async fn list_messages(
    pool: &SqlitePool,
    settings: &MessagingConfig,
    room_id: &str,
    user_id: i64,
    before: Option<&str>,
    limit: Option<u32>,
) -> ChatResult<MessagePage> {
    let room = require_membership(pool, room_id, user_id).await?;
    let limit = settings.page_size(limit);

    let rows = match before {
        Some(cursor_id) => {
            let cursor = find_message(pool, &room, cursor_id).await?;
            sqlx::query(&format!(
                "{MESSAGE_SELECT} WHERE m.room_id = ? AND (m.created_at < ? OR (m.created_at = ? AND m.id < ?)) ORDER BY m.created_at DESC, m.id DESC LIMIT ?"
            ))
            .bind(room.id)
            .bind(&cursor.created_at)
            .bind(&cursor.created_at)
            .bind(cursor.id)
            .bind(i64::from(limit) + 1)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "{MESSAGE_SELECT} WHERE m.room_id = ? ORDER BY m.created_at DESC, m.id DESC LIMIT ?"
            ))
            .bind(room.id)
            .bind(i64::from(limit) + 1)
            .fetch_all(pool)
            .await?
        }
    };

    let has_more = rows.len() > limit as usize;
    let mut messages = hydrate(pool, &rows[..rows.len().min(limit as usize)]).await?;
    messages.reverse();

    Ok(MessagePage { messages, has_more })
}

/// Every message created or changed after feed position `since`, in change
/// order.
///
/// Tombstones are included so pollers learn about deletions. A full page sets
/// `has_more`; polling again from the last `seq` returns the rest.
pub async fn messages_since(
    pool: &SqlitePool,
    settings: &MessagingConfig,
    room_id: &str,
    user_id: i64,
    since: i64,
) -> ChatResult<MessagePage> {
    let room = require_membership(pool, room_id, user_id).await?;
    if since < 0 {
        return Err(ChatError::validation("since must not be negative"));
    }
    let limit = settings.max_page_size;

    let rows = sqlx::query(&format!(
        "{MESSAGE_SELECT} WHERE m.room_id = ? AND m.seq > ? ORDER BY m.seq ASC LIMIT ?"
    ))
    .bind(room.id)
    .bind(since)
    .bind(i64::from(limit) + 1)
    .fetch_all(pool)
    .await?;

    let has_more = rows.len() > limit as usize;
    let messages = hydrate(pool, &rows[..rows.len().min(limit as usize)]).await?;

    Ok(MessagePage { messages, has_more })
}

pub async fn edit_message(
    pool: &SqlitePool,
    settings: &MessagingConfig,
    room_id: &str,
    message_id: &str,
    user_id: i64,
    content: &str,
) -> ChatResult<MessageView> {
    let room = require_membership(pool, room_id, user_id).await?;
    let message = find_message(pool, &room, message_id).await?;

    if message.author_id != user_id {
        return Err(ChatError::forbidden("only the author can edit a message"));
    }
    if message.deleted_at.is_some() {
        return Err(ChatError::MessageDeleted);
    }

    let created_at = time::decode(&message.created_at)?;
    let window = Duration::seconds(settings.edit_window_seconds as i64);
    if Utc::now() - created_at > window {
        return Err(ChatError::EditWindowClosed);
    }

    let attachment_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attachments WHERE message_id = ?")
            .bind(message.id)
            .fetch_one(pool)
            .await?;
    let content = validation::message_content(
        content,
        settings.max_message_length,
        attachment_count > 0,
    )?;

    let now = time::now();
    sqlx::query(&format!(
        "UPDATE messages SET content = ?, edited_at = ?, updated_at = ?, seq = {NEXT_SEQ} WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(&content)
    .bind(&now)
    .bind(&now)
    .bind(message.id)
    .execute(pool)
    .await?;

    fetch_message(pool, message.id).await
}

/// Soft-delete a message. Authors may delete their own, admins any.
pub async fn delete_message(
    pool: &SqlitePool,
    room_id: &str,
    message_id: &str,
    actor: &User,
) -> ChatResult<Deletion> {
    let room = if actor.is_admin() {
        find_room(pool, room_id).await?
    } else {
        require_membership(pool, room_id, actor.id).await?
    };
    let message = find_message(pool, &room, message_id).await?;

    if message.author_id != actor.id && !actor.is_admin() {
        return Err(ChatError::forbidden("only the author can delete a message"));
    }

    let newly_deleted = soft_delete(pool, message.id).await?;
    if newly_deleted {
        info!(room = %room.public_id, message = %message_id, by = %actor.public_id, "message deleted");
    }

    Ok(Deletion {
        message: fetch_message(pool, message.id).await?,
        newly_deleted,
    })
}

/// Every message of `author_id` as the tombstone subscribers should see once
/// the rows are removed outright.
pub async fn tombstones_by_author(pool: &SqlitePool, author_id: i64) -> ChatResult<Vec<MessageView>> {
    let rows = sqlx::query(&format!(
        "{MESSAGE_SELECT} WHERE m.author_id = ? ORDER BY m.seq ASC"
    ))
    .bind(author_id)
    .fetch_all(pool)
    .await?;

    let now = time::now();
    let mut tombstones = Vec::with_capacity(rows.len());
    for row in &rows {
        let (_, mut view) = view_from_row(row)?;
        if !view.is_deleted() {
            view.deleted_at = Some(now.clone());
            view.updated_at = now.clone();
        }
        view.content = None;
        tombstones.push(view);
    }
    Ok(tombstones)
}

/// Replies written by others to messages of `author_id`.
pub async fn replies_to_author(pool: &SqlitePool, author_id: i64) -> ChatResult<Vec<i64>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT r.id FROM messages r
        JOIN messages p ON p.id = r.reply_to_id
        WHERE p.author_id = ? AND r.author_id != ?
        ORDER BY r.id
        "#,
    )
    .bind(author_id)
    .bind(author_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Move messages to the end of the change feed after something they show
/// changed, such as a removed reply parent. Returns the refreshed views.
pub async fn touch_messages(pool: &SqlitePool, message_db_ids: &[i64]) -> ChatResult<Vec<MessageView>> {
    let mut touched = Vec::with_capacity(message_db_ids.len());
    // One statement per row: the sequence subquery is evaluated once per statement.
    for id in message_db_ids {
        let result = sqlx::query(&format!(
            "UPDATE messages SET updated_at = ?, seq = {NEXT_SEQ} WHERE id = ?"
        ))
        .bind(time::now())
        .bind(id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 1 {
            touched.push(fetch_message(pool, *id).await?);
        }
    }
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rooms::create_channel;
    use crate::services::test_utils::{create_test_db, create_user, create_user_with_role};
    use modnet_auth::UserRole;

    fn settings() -> MessagingConfig {
        MessagingConfig {
            default_page_size: 2,
            ..MessagingConfig::default()
        }
    }

    #[tokio::test]
    async fn paging_walks_backwards_in_ascending_pages() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();

        for text in ["one", "two", "three"] {
            send_message(&pool, &settings(), &room.id, ada.id, &NewMessage::text(text))
                .await
                .unwrap();
        }

        let newest = list_messages(&pool, &settings(), &room.id, ada.id, None, None)
            .await
            .unwrap();
        let contents: Vec<_> = newest.messages.iter().filter_map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["two", "three"]);
        assert!(newest.has_more);

        let older = list_messages(
            &pool,
            &settings(),
            &room.id,
            ada.id,
            Some(&newest.messages[0].id),
            None,
        )
        .await
        .unwrap();
        assert_eq!(older.messages.len(), 1);
        assert_eq!(older.messages[0].content.as_deref(), Some("one"));
        assert!(!older.has_more);
    }

    #[tokio::test]
    async fn replies_carry_a_preview_of_the_parent() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();

        let parent = send_message(&pool, &settings(), &room.id, ada.id, &NewMessage::text("e4?"))
            .await
            .unwrap();
        let reply = send_message(
            &pool,
            &settings(),
            &room.id,
            ada.id,
            &NewMessage::text("e5!").replying_to(&parent.id),
        )
        .await
        .unwrap();

        let preview = reply.reply_to.unwrap();
        assert_eq!(preview.id, parent.id);
        assert_eq!(preview.excerpt.as_deref(), Some("e4?"));
        assert_eq!(preview.author.unwrap().display_name, "Ada");
        assert!(!preview.deleted);
    }

    #[tokio::test]
    async fn replying_to_a_deleted_message_fails() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        let parent = send_message(&pool, &settings(), &room.id, ada.id, &NewMessage::text("gone"))
            .await
            .unwrap();
        delete_message(&pool, &room.id, &parent.id, &ada).await.unwrap();

        let result = send_message(
            &pool,
            &settings(),
            &room.id,
            ada.id,
            &NewMessage::text("hello?").replying_to(&parent.id),
        )
        .await;
        assert!(matches!(result, Err(ChatError::MessageDeleted)));
    }

    #[tokio::test]
    async fn non_members_cannot_post() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let eve = create_user(&pool, "Eve").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();

        let result = send_message(&pool, &settings(), &room.id, eve.id, &NewMessage::text("hi")).await;
        assert!(matches!(result, Err(ChatError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn edits_are_limited_to_author_and_window() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let grace = create_user(&pool, "Grace").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        crate::services::rooms::join_channel(&pool, grace.id, &room.id).await.unwrap();

        let message = send_message(&pool, &settings(), &room.id, ada.id, &NewMessage::text("tpyo"))
            .await
            .unwrap();

        let edited = edit_message(&pool, &settings(), &room.id, &message.id, ada.id, "typo")
            .await
            .unwrap();
        assert_eq!(edited.content.as_deref(), Some("typo"));
        assert!(edited.edited_at.is_some());
        assert!(edited.updated_at > message.updated_at);
        assert!(edited.seq > message.seq);

        let by_other = edit_message(&pool, &settings(), &room.id, &message.id, grace.id, "mine").await;
        assert!(matches!(by_other, Err(ChatError::Forbidden { .. })));

        let old = time::encode(Utc::now() - Duration::hours(1));
        sqlx::query("UPDATE messages SET created_at = ? WHERE public_id = ?")
            .bind(&old)
            .bind(&message.id)
            .execute(&pool)
            .await
            .unwrap();
        let late = edit_message(&pool, &settings(), &room.id, &message.id, ada.id, "later").await;
        assert!(matches!(late, Err(ChatError::EditWindowClosed)));
    }

    #[tokio::test]
    async fn deletion_leaves_a_tombstone_visible_to_pollers() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        let message = send_message(&pool, &settings(), &room.id, ada.id, &NewMessage::text("oops"))
            .await
            .unwrap();

        let first = delete_message(&pool, &room.id, &message.id, &ada).await.unwrap();
        assert!(first.newly_deleted);
        assert!(first.message.is_deleted());
        assert_eq!(first.message.content, None);

        let second = delete_message(&pool, &room.id, &message.id, &ada).await.unwrap();
        assert!(!second.newly_deleted);

        let changes = messages_since(&pool, &settings(), &room.id, ada.id, message.seq)
            .await
            .unwrap();
        assert_eq!(changes.messages.len(), 1);
        assert!(changes.messages[0].is_deleted());
        assert!(changes.messages[0].seq > message.seq);
    }

    #[tokio::test]
    async fn admins_delete_without_membership() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let eve = create_user(&pool, "Eve").await;
        let admin = create_user_with_role(&pool, "Root", UserRole::Admin).await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        let message = send_message(&pool, &settings(), &room.id, ada.id, &NewMessage::text("spam"))
            .await
            .unwrap();

        let by_stranger = delete_message(&pool, &room.id, &message.id, &eve).await;
        assert!(matches!(by_stranger, Err(ChatError::Forbidden { .. })));

        let by_admin = delete_message(&pool, &room.id, &message.id, &admin).await.unwrap();
        assert!(by_admin.newly_deleted);
    }

    #[tokio::test]
    async fn since_rejects_negative_positions() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();

        let result = messages_since(&pool, &settings(), &room.id, ada.id, -1).await;
        assert!(matches!(result, Err(ChatError::Validation { .. })));
    }

    #[tokio::test]
    async fn since_pages_split_on_unique_positions() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        let small = MessagingConfig {
            max_page_size: 2,
            ..settings()
        };

        for text in ["one", "two", "three", "four", "five"] {
            send_message(&pool, &small, &room.id, ada.id, &NewMessage::text(text))
                .await
                .unwrap();
        }
        // Same timestamp everywhere, so only the sequence can order the feed.
        sqlx::query("UPDATE messages SET created_at = '2024-05-01T10:00:00.000000Z', updated_at = '2024-05-01T10:00:00.000000Z'")
            .execute(&pool)
            .await
            .unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = messages_since(&pool, &small, &room.id, ada.id, cursor)
                .await
                .unwrap();
            assert!(page.messages.len() <= 2);
            if let Some(last) = page.messages.last() {
                cursor = last.seq;
            }
            seen.extend(page.messages.into_iter().filter_map(|m| m.content));
            if !page.has_more {
                break;
            }
        }
        assert_eq!(seen, vec!["one", "two", "three", "four", "five"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn poller_sees_every_message_from_concurrent_writers() {
        const WRITERS: usize = 6;
        const PER_WRITER: usize = 40;

        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        let small = MessagingConfig {
            max_page_size: 7,
            ..settings()
        };

        let author = ada.id;
        let mut writers = Vec::new();
        for writer in 0..WRITERS {
            let (pool, small, room_id) = (pool.clone(), small.clone(), room.id.clone());
            writers.push(tokio::spawn(async move {
                for n in 0..PER_WRITER {
                    let text = NewMessage::text(format!("{writer}-{n}"));
                    send_message(&pool, &small, &room_id, author, &text)
                        .await
                        .unwrap();
                }
            }));
        }

        let mut cursor = 0;
        let mut seen = HashSet::new();
        let mut writers_done = false;
        loop {
            let page = messages_since(&pool, &small, &room.id, ada.id, cursor)
                .await
                .unwrap();
            for message in &page.messages {
                assert!(message.seq > cursor, "feed went backwards");
                cursor = message.seq;
                seen.insert(message.id.clone());
            }
            if writers_done && !page.has_more {
                break;
            }
            if writers.iter().all(|writer| writer.is_finished()) {
                writers_done = true;
            }
            tokio::task::yield_now().await;
        }

        for writer in writers {
            writer.await.unwrap();
        }
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored as usize, WRITERS * PER_WRITER);
        assert_eq!(seen.len(), WRITERS * PER_WRITER);
    }
}
