//! Room membership, channel discovery and channel lifecycle.

use modnet_database::{new_public_id, time};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::types::{conflict_on_unique, ChatError, ChatResult, RoomKind, RoomSummary};
use crate::utils::validation;

/// A resolved room: row id for queries, public id for responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRef {
    pub id: i64,
    pub public_id: String,
    pub kind: RoomKind,
}

const SUMMARY_SELECT: &str = r#"
    SELECT r.public_id, r.kind, r.name, r.description, r.created_at,
           mo.public_id AS module_public_id,
           (SELECT COUNT(*) FROM room_members rm WHERE rm.room_id = r.id) AS member_count,
           EXISTS (SELECT 1 FROM room_members rm WHERE rm.room_id = r.id AND rm.user_id = ?) AS joined
    FROM rooms r
    LEFT JOIN modules mo ON mo.id = r.module_id
"#;

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RoomSummary, sqlx::Error> {
    Ok(RoomSummary {
        id: row.try_get("public_id")?,
        kind: row.try_get("kind")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        module_id: row.try_get("module_public_id")?,
        member_count: row.try_get("member_count")?,
        joined: row.try_get("joined")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn find_room(pool: &SqlitePool, room_id: &str) -> ChatResult<RoomRef> {
    let row = sqlx::query("SELECT id, public_id, kind FROM rooms WHERE public_id = ?")
        .bind(room_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::not_found("room"))?;

    Ok(RoomRef {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        kind: row.try_get("kind")?,
    })
}

pub async fn is_member(pool: &SqlitePool, room_db_id: i64, user_id: i64) -> ChatResult<bool> {
    let member: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM room_members WHERE room_id = ? AND user_id = ?")
            .bind(room_db_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(member.is_some())
}

/// Resolve a room and make sure `user_id` belongs to it.
pub async fn require_membership(pool: &SqlitePool, room_id: &str, user_id: i64) -> ChatResult<RoomRef> {
    let room = find_room(pool, room_id).await?;
    if !is_member(pool, room.id, user_id).await? {
        return Err(ChatError::forbidden("not a member of this room"));
    }
    Ok(room)
}

pub async fn room_summary(pool: &SqlitePool, room_id: &str, user_id: i64) -> ChatResult<RoomSummary> {
    let row = sqlx::query(&format!("{SUMMARY_SELECT} WHERE r.public_id = ?"))
        .bind(user_id)
        .bind(room_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::not_found("room"))?;
    Ok(summary_from_row(&row)?)
}

/// Module rooms and channels the user belongs to, module rooms first.
pub async fn list_my_rooms(pool: &SqlitePool, user_id: i64) -> ChatResult<Vec<RoomSummary>> {
    let rows = sqlx::query(&format!(
        "{SUMMARY_SELECT} JOIN room_members me ON me.room_id = r.id AND me.user_id = ? ORDER BY r.kind DESC, r.name COLLATE NOCASE ASC"
    ))
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| summary_from_row(row).map_err(ChatError::from))
        .collect()
}

/// Every channel, with member counts and whether the user already joined.
pub async fn discover_channels(pool: &SqlitePool, user_id: i64) -> ChatResult<Vec<RoomSummary>> {
    let rows = sqlx::query(&format!(
        "{SUMMARY_SELECT} WHERE r.kind = 'channel' ORDER BY member_count DESC, r.name COLLATE NOCASE ASC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| summary_from_row(row).map_err(ChatError::from))
        .collect()
}

pub async fn create_channel(
    pool: &SqlitePool,
    user_id: i64,
    name: &str,
    description: Option<&str>,
) -> ChatResult<RoomSummary> {
    let name = validation::channel_name(name)?;
    let description = validation::channel_description(description)?;
    let public_id = new_public_id();
    let now = time::now();

    let mut tx = pool.begin().await?;

    let room_db_id = sqlx::query(
        "INSERT INTO rooms (public_id, kind, name, description, module_id, created_by, created_at) VALUES (?, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(&public_id)
    .bind(RoomKind::Channel)
    .bind(&name)
    .bind(&description)
    .bind(user_id)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(|error| conflict_on_unique(error, "a channel with this name already exists"))?
    .last_insert_rowid();

    sqlx::query("INSERT INTO room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)")
        .bind(room_db_id)
        .bind(user_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(room = %public_id, %name, "channel created");
    room_summary(pool, &public_id, user_id).await
}

/// Join a channel. Joining twice is harmless.
pub async fn join_channel(pool: &SqlitePool, user_id: i64, room_id: &str) -> ChatResult<RoomSummary> {
    let room = find_room(pool, room_id).await?;
    if room.kind != RoomKind::Channel {
        return Err(ChatError::forbidden(
            "module rooms follow your module selection",
        ));
    }

    sqlx::query("INSERT OR IGNORE INTO room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)")
        .bind(room.id)
        .bind(user_id)
        .bind(time::now())
        .execute(pool)
        .await?;

    room_summary(pool, room_id, user_id).await
}

pub async fn leave_channel(pool: &SqlitePool, user_id: i64, room_id: &str) -> ChatResult<RoomSummary> {
    let room = find_room(pool, room_id).await?;
    if room.kind != RoomKind::Channel {
        return Err(ChatError::forbidden(
            "module rooms follow your module selection",
        ));
    }

    sqlx::query("DELETE FROM room_members WHERE room_id = ? AND user_id = ?")
        .bind(room.id)
        .bind(user_id)
        .execute(pool)
        .await?;

    room_summary(pool, room_id, user_id).await
}
