//! Personal data export.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::info;
use utoipa::ToSchema;

use modnet_database::time;

use crate::{PrivacyError, PrivacyResult};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserExport {
    pub exported_at: String,
    pub profile: ExportedProfile,
    pub consent: ExportedConsent,
    pub course: Option<ExportedCourse>,
    pub modules: Vec<ExportedModule>,
    pub memberships: Vec<ExportedMembership>,
    pub messages: Vec<ExportedMessage>,
    pub attachments: Vec<ExportedAttachment>,
    pub reports: Vec<ExportedReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportedProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportedConsent {
    pub version: Option<String>,
    pub given_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportedCourse {
    pub id: String,
    pub code: String,
    pub name: String,
    pub semester: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportedModule {
    pub id: String,
    pub code: String,
    pub name: String,
    pub selected_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportedMembership {
    pub room_id: String,
    pub kind: String,
    pub name: String,
    pub joined_at: String,
}

/// An authored message. Deleted messages keep their stored content here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportedMessage {
    pub id: String,
    pub room_id: String,
    pub content: String,
    pub reply_to: Option<String>,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportedAttachment {
    pub id: String,
    pub room_id: String,
    pub message_id: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportedReport {
    pub id: String,
    pub message_id: String,
    pub reason: String,
    pub status: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

/// Collect everything stored about the user with row id `user_id`.
pub async fn export_user_data(pool: &SqlitePool, user_id: i64) -> PrivacyResult<UserExport> {
    let user = sqlx::query(
        r#"
        SELECT u.public_id, u.email, u.display_name, u.role, u.status, u.created_at, u.updated_at,
               u.consent_version, u.consent_given_at, u.semester,
               c.public_id AS course_public_id, c.code AS course_code, c.name AS course_name
        FROM users u
        LEFT JOIN courses c ON c.id = u.course_id
        WHERE u.id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(PrivacyError::UserNotFound)?;

    let profile = ExportedProfile {
        id: user.try_get("public_id")?,
        email: user.try_get("email")?,
        display_name: user.try_get("display_name")?,
        role: user.try_get("role")?,
        status: user.try_get("status")?,
        created_at: user.try_get("created_at")?,
        updated_at: user.try_get("updated_at")?,
    };

    let consent = ExportedConsent {
        version: user.try_get("consent_version")?,
        given_at: user.try_get("consent_given_at")?,
    };

    let course = match user.try_get::<Option<String>, _>("course_public_id")? {
        Some(id) => Some(ExportedCourse {
            id,
            code: user.try_get("course_code")?,
            name: user.try_get("course_name")?,
            semester: user.try_get("semester")?,
        }),
        None => None,
    };

    let modules = sqlx::query(
        r#"
        SELECT m.public_id, m.code, m.name, um.selected_at
        FROM user_modules um
        JOIN modules m ON m.id = um.module_id
        WHERE um.user_id = ?
        ORDER BY um.selected_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(ExportedModule {
            id: row.try_get("public_id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            selected_at: row.try_get("selected_at")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let memberships = sqlx::query(
        r#"
        SELECT r.public_id, r.kind, r.name, rm.joined_at
        FROM room_members rm
        JOIN rooms r ON r.id = rm.room_id
        WHERE rm.user_id = ?
        ORDER BY rm.joined_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(ExportedMembership {
            room_id: row.try_get("public_id")?,
            kind: row.try_get("kind")?,
            name: row.try_get("name")?,
            joined_at: row.try_get("joined_at")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let messages = sqlx::query(
        r#"
        SELECT m.public_id, r.public_id AS room_public_id, m.content, p.public_id AS parent_public_id,
               m.created_at, m.edited_at, m.deleted_at
        FROM messages m
        JOIN rooms r ON r.id = m.room_id
        LEFT JOIN messages p ON p.id = m.reply_to_id
        WHERE m.author_id = ?
        ORDER BY m.created_at ASC, m.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(ExportedMessage {
            id: row.try_get("public_id")?,
            room_id: row.try_get("room_public_id")?,
            content: row.try_get("content")?,
            reply_to: row.try_get("parent_public_id")?,
            created_at: row.try_get("created_at")?,
            edited_at: row.try_get("edited_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let attachments = sqlx::query(
        r#"
        SELECT a.public_id, r.public_id AS room_public_id, m.public_id AS message_public_id,
               a.file_name, a.content_type, a.size_bytes, a.created_at
        FROM attachments a
        JOIN rooms r ON r.id = a.room_id
        LEFT JOIN messages m ON m.id = a.message_id
        WHERE a.uploader_id = ?
        ORDER BY a.created_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(ExportedAttachment {
            id: row.try_get("public_id")?,
            room_id: row.try_get("room_public_id")?,
            message_id: row.try_get("message_public_id")?,
            file_name: row.try_get("file_name")?,
            content_type: row.try_get("content_type")?,
            size_bytes: row.try_get("size_bytes")?,
            created_at: row.try_get("created_at")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let reports = sqlx::query(
        r#"
        SELECT rp.public_id, m.public_id AS message_public_id, rp.reason, rp.status,
               rp.created_at, rp.resolved_at
        FROM reports rp
        JOIN messages m ON m.id = rp.message_id
        WHERE rp.reporter_id = ?
        ORDER BY rp.created_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(ExportedReport {
            id: row.try_get("public_id")?,
            message_id: row.try_get("message_public_id")?,
            reason: row.try_get("reason")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    info!(
        user = %profile.id,
        messages = messages.len(),
        attachments = attachments.len(),
        "exported user data"
    );

    Ok(UserExport {
        exported_at: time::now(),
        profile,
        consent,
        course,
        modules,
        memberships,
        messages,
        attachments,
        reports,
    })
}
