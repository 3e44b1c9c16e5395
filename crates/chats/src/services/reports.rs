//! Message reports and the admin moderation queue.

use modnet_database::{new_public_id, time};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::messages::{fetch_message, find_message, soft_delete};
use super::rooms::require_membership;
use crate::types::{
    conflict_on_unique, AuthorView, ChatError, ChatResult, MessageView, ModerationStats,
    ReportAction, ReportStatus, ReportView,
};
use crate::utils::validation;

const REPORT_SELECT: &str = r#"
    SELECT rp.public_id, rp.reason, rp.status, rp.created_at, rp.resolved_at,
           rp.message_id AS message_db_id,
           r.public_id AS room_public_id,
           m.public_id AS message_public_id, m.content AS message_content,
           m.deleted_at AS message_deleted_at,
           a.public_id AS author_public_id, a.display_name AS author_name,
           rep.public_id AS reporter_public_id, rep.display_name AS reporter_name
    FROM reports rp
    JOIN messages m ON m.id = rp.message_id
    JOIN rooms r ON r.id = m.room_id
    JOIN users a ON a.id = m.author_id
    JOIN users rep ON rep.id = rp.reporter_id
"#;

fn report_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ReportView, sqlx::Error> {
    let message_deleted = row.try_get::<Option<String>, _>("message_deleted_at")?.is_some();
    let content: String = row.try_get("message_content")?;

    Ok(ReportView {
        id: row.try_get("public_id")?,
        room_id: row.try_get("room_public_id")?,
        message_id: row.try_get("message_public_id")?,
        message_author: AuthorView {
            id: row.try_get("author_public_id")?,
            display_name: row.try_get("author_name")?,
        },
        message_excerpt: (!message_deleted).then(|| validation::excerpt(&content)),
        message_deleted,
        reporter: AuthorView {
            id: row.try_get("reporter_public_id")?,
            display_name: row.try_get("reporter_name")?,
        },
        reason: row.try_get("reason")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

async fn fetch_report(pool: &SqlitePool, report_id: &str) -> ChatResult<(i64, ReportView)> {
    let row = sqlx::query(&format!("{REPORT_SELECT} WHERE rp.public_id = ?"))
        .bind(report_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::not_found("report"))?;

    Ok((row.try_get("message_db_id")?, report_from_row(&row)?))
}

pub async fn report_message(
    pool: &SqlitePool,
    room_id: &str,
    message_id: &str,
    reporter_id: i64,
    reason: &str,
) -> ChatResult<ReportView> {
    let reason = validation::report_reason(reason)?;
    let room = require_membership(pool, room_id, reporter_id).await?;
    let message = find_message(pool, &room, message_id).await?;

    if message.author_id == reporter_id {
        return Err(ChatError::validation("you cannot report your own message"));
    }
    if message.deleted_at.is_some() {
        return Err(ChatError::MessageDeleted);
    }

    let public_id = new_public_id();
    sqlx::query(
        "INSERT INTO reports (public_id, message_id, reporter_id, reason, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(message.id)
    .bind(reporter_id)
    .bind(&reason)
    .bind(ReportStatus::Open)
    .bind(time::now())
    .execute(pool)
    .await
    .map_err(|error| conflict_on_unique(error, "you already reported this message"))?;

    info!(report = %public_id, message = %message_id, "message reported");
    Ok(fetch_report(pool, &public_id).await?.1)
}

/// Reports for the moderation queue, oldest first.
pub async fn list_reports(
    pool: &SqlitePool,
    status: Option<ReportStatus>,
) -> ChatResult<Vec<ReportView>> {
    let rows = sqlx::query(&format!(
        "{REPORT_SELECT} WHERE (? IS NULL OR rp.status = ?) ORDER BY rp.created_at ASC, rp.id ASC"
    ))
    .bind(status)
    .bind(status)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| report_from_row(row).map_err(ChatError::from))
        .collect()
}

/// Close an open report.
///
/// `RemoveMessage` soft-deletes the reported message; the returned view is
/// `Some` when that deletion actually happened so callers can broadcast it.
pub async fn resolve_report(
    pool: &SqlitePool,
    report_id: &str,
    admin_id: i64,
    action: ReportAction,
) -> ChatResult<(ReportView, Option<MessageView>)> {
    let (message_db_id, report) = fetch_report(pool, report_id).await?;
    if report.status != ReportStatus::Open {
        return Err(ChatError::conflict("report is already closed"));
    }

    let status = match action {
        ReportAction::Dismiss => ReportStatus::Dismissed,
        ReportAction::RemoveMessage => ReportStatus::Resolved,
    };

    let closed = sqlx::query(
        "UPDATE reports SET status = ?, resolved_by = ?, resolved_at = ? WHERE public_id = ? AND status = 'open'",
    )
    .bind(status)
    .bind(admin_id)
    .bind(time::now())
    .bind(report_id)
    .execute(pool)
    .await?;
    if closed.rows_affected() != 1 {
        return Err(ChatError::conflict("report is already closed"));
    }

    let removed = match action {
        ReportAction::RemoveMessage if soft_delete(pool, message_db_id).await? => {
            Some(fetch_message(pool, message_db_id).await?)
        }
        _ => None,
    };

    info!(report = %report_id, ?action, "report resolved");
    Ok((fetch_report(pool, report_id).await?.1, removed))
}

pub async fn stats(pool: &SqlitePool) -> ChatResult<ModerationStats> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS users,
            (SELECT COUNT(*) FROM users WHERE status = 'suspended') AS suspended_users,
            (SELECT COUNT(*) FROM rooms) AS rooms,
            (SELECT COUNT(*) FROM messages) AS messages,
            (SELECT COUNT(*) FROM messages WHERE deleted_at IS NOT NULL) AS deleted_messages,
            (SELECT COUNT(*) FROM reports WHERE status = 'open') AS open_reports
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(ModerationStats {
        users: row.try_get("users")?,
        suspended_users: row.try_get("suspended_users")?,
        rooms: row.try_get("rooms")?,
        messages: row.try_get("messages")?,
        deleted_messages: row.try_get("deleted_messages")?,
        open_reports: row.try_get("open_reports")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::messages::send_message;
    use crate::services::rooms::{create_channel, join_channel};
    use crate::services::test_utils::{create_test_db, create_user, create_user_with_role};
    use crate::types::NewMessage;
    use modnet_auth::UserRole;
    use modnet_config::MessagingConfig;

    #[tokio::test]
    async fn reports_flow_through_the_moderation_queue() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let eve = create_user(&pool, "Eve").await;
        let admin = create_user_with_role(&pool, "Root", UserRole::Admin).await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        join_channel(&pool, eve.id, &room.id).await.unwrap();

        let spam = send_message(
            &pool,
            &MessagingConfig::default(),
            &room.id,
            eve.id,
            &NewMessage::text("buy cheap essays"),
        )
        .await
        .unwrap();

        let report = report_message(&pool, &room.id, &spam.id, ada.id, "spam")
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Open);
        assert_eq!(report.message_author.display_name, "Eve");
        assert_eq!(report.message_excerpt.as_deref(), Some("buy cheap essays"));

        let queue = list_reports(&pool, Some(ReportStatus::Open)).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(stats(&pool).await.unwrap().open_reports, 1);

        let (resolved, removed) =
            resolve_report(&pool, &report.id, admin.id, ReportAction::RemoveMessage)
                .await
                .unwrap();
        assert_eq!(resolved.status, ReportStatus::Resolved);
        assert!(resolved.message_deleted);
        assert!(resolved.resolved_at.is_some());
        assert!(removed.unwrap().is_deleted());

        let again = resolve_report(&pool, &report.id, admin.id, ReportAction::Dismiss).await;
        assert!(matches!(again, Err(ChatError::Conflict { .. })));

        let counts = stats(&pool).await.unwrap();
        assert_eq!(counts.open_reports, 0);
        assert_eq!(counts.deleted_messages, 1);
        assert_eq!(counts.users, 3);
    }

    #[tokio::test]
    async fn one_report_per_user_and_message() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let eve = create_user(&pool, "Eve").await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        join_channel(&pool, eve.id, &room.id).await.unwrap();
        let message = send_message(
            &pool,
            &MessagingConfig::default(),
            &room.id,
            eve.id,
            &NewMessage::text("rude"),
        )
        .await
        .unwrap();

        report_message(&pool, &room.id, &message.id, ada.id, "rude").await.unwrap();
        let twice = report_message(&pool, &room.id, &message.id, ada.id, "still rude").await;
        assert!(matches!(twice, Err(ChatError::Conflict { .. })));

        let own = report_message(&pool, &room.id, &message.id, eve.id, "me").await;
        assert!(matches!(own, Err(ChatError::Validation { .. })));
    }

    #[tokio::test]
    async fn dismissing_keeps_the_message() {
        let (pool, _dir) = create_test_db().await;
        let ada = create_user(&pool, "Ada").await;
        let eve = create_user(&pool, "Eve").await;
        let admin = create_user_with_role(&pool, "Root", UserRole::Admin).await;
        let room = create_channel(&pool, ada.id, "Chess Club", None).await.unwrap();
        join_channel(&pool, eve.id, &room.id).await.unwrap();
        let message = send_message(
            &pool,
            &MessagingConfig::default(),
            &room.id,
            eve.id,
            &NewMessage::text("fine actually"),
        )
        .await
        .unwrap();

        let report = report_message(&pool, &room.id, &message.id, ada.id, "unsure")
            .await
            .unwrap();
        let (dismissed, removed) = resolve_report(&pool, &report.id, admin.id, ReportAction::Dismiss)
            .await
            .unwrap();

        assert_eq!(dismissed.status, ReportStatus::Dismissed);
        assert!(!dismissed.message_deleted);
        assert!(removed.is_none());
        assert!(list_reports(&pool, Some(ReportStatus::Open)).await.unwrap().is_empty());
        assert_eq!(list_reports(&pool, None).await.unwrap().len(), 1);
    }
}
