//! Account erasure.
//!
//! Erasure is a fixed sequence of independent steps. A failing step is
//! recorded and logged, and the remaining steps still run. Nothing is rolled
//! back.
//!
//! The report carries what live subscribers need to hear about: tombstones
//! for the removed messages and the replies that lost their parent. Those
//! replies get a new change feed position so pollers refetch them too.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};
use utoipa::ToSchema;

use modnet_chats::services::messages::{replies_to_author, tombstones_by_author, touch_messages};
use modnet_chats::{AttachmentStore, MessageView};

use crate::{PrivacyError, PrivacyResult};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErasureStep {
    pub name: String,
    /// Rows or files removed by this step.
    pub affected: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErasureReport {
    pub user_id: String,
    pub steps: Vec<ErasureStep>,
    /// Removed messages as tombstones.
    #[serde(skip)]
    pub removed_messages: Vec<MessageView>,
    /// Replies by other users whose parent was removed.
    #[serde(skip)]
    pub orphaned_replies: Vec<MessageView>,
}

impl ErasureReport {
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|step| step.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ErasureStep> {
        self.steps.iter().filter(|step| step.error.is_some())
    }

    fn record(&mut self, name: &str, outcome: Result<u64, String>) {
        match &outcome {
            Ok(affected) => info!(user = %self.user_id, step = name, affected, "erasure step done"),
            Err(error) => warn!(user = %self.user_id, step = name, %error, "erasure step failed"),
        }
        let (affected, error) = match outcome {
            Ok(affected) => (affected, None),
            Err(error) => (0, Some(error)),
        };
        self.steps.push(ErasureStep {
            name: name.to_owned(),
            affected,
            error,
        });
    }
}

async fn delete_where(pool: &SqlitePool, sql: &str, id: i64) -> Result<u64, String> {
    sqlx::query(sql)
        .bind(id)
        .execute(pool)
        .await
        .map(|result| result.rows_affected())
        .map_err(|error| error.to_string())
}

async fn remove_files(pool: &SqlitePool, store: &AttachmentStore, user_id: i64) -> Result<u64, String> {
    let keys = sqlx::query("SELECT storage_key FROM attachments WHERE uploader_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(|error| error.to_string())?;

    let mut removed = 0;
    let mut failed = Vec::new();
    for row in keys {
        let key: String = row.try_get("storage_key").map_err(|error| error.to_string())?;
        match store.remove(&key).await {
            Ok(()) => removed += 1,
            Err(error) => failed.push(format!("{key}: {error}")),
        }
    }

    if failed.is_empty() {
        Ok(removed)
    } else {
        Err(format!("{} file(s) could not be removed: {}", failed.len(), failed.join("; ")))
    }
}

/// Remove an account and everything it owns.
///
/// Returns [`PrivacyError::UserNotFound`] when the account is already gone.
pub async fn erase_account(
    pool: &SqlitePool,
    store: &AttachmentStore,
    user_public_id: &str,
) -> PrivacyResult<ErasureReport> {
    let user = sqlx::query("SELECT id, email FROM users WHERE public_id = ?")
        .bind(user_public_id)
        .fetch_optional(pool)
        .await?
        .ok_or(PrivacyError::UserNotFound)?;
    let user_id: i64 = user.try_get("id")?;
    let email: String = user.try_get("email")?;

    let mut report = ErasureReport {
        user_id: user_public_id.to_owned(),
        steps: Vec::new(),
        removed_messages: Vec::new(),
        orphaned_replies: Vec::new(),
    };
    info!(user = %user_public_id, "erasing account");

    report.record("attachment_files", remove_files(pool, store, user_id).await);
    report.record(
        "attachments",
        delete_where(pool, "DELETE FROM attachments WHERE uploader_id = ?", user_id).await,
    );
    report.record(
        "reports",
        delete_where(pool, "DELETE FROM reports WHERE reporter_id = ?", user_id).await,
    );

    let tombstones = tombstones_by_author(pool, user_id).await;
    let replies = replies_to_author(pool, user_id).await;
    let removed = delete_where(pool, "DELETE FROM messages WHERE author_id = ?", user_id).await;
    if removed.is_ok() {
        match tombstones {
            Ok(tombstones) => report.removed_messages = tombstones,
            Err(error) => warn!(user = %user_public_id, %error, "could not describe removed messages"),
        }
    }
    report.record("messages", removed);
    let touched = match replies {
        Ok(ids) => touch_messages(pool, &ids).await.map_err(|error| error.to_string()),
        Err(error) => Err(error.to_string()),
    };
    let touched = touched.map(|replies| {
        let count = replies.len() as u64;
        report.orphaned_replies = replies;
        count
    });
    report.record("orphaned_replies", touched);
    report.record(
        "room_memberships",
        delete_where(pool, "DELETE FROM room_members WHERE user_id = ?", user_id).await,
    );
    report.record(
        "module_selections",
        delete_where(pool, "DELETE FROM user_modules WHERE user_id = ?", user_id).await,
    );
    report.record(
        "sessions",
        delete_where(pool, "DELETE FROM sessions WHERE user_id = ?", user_id).await,
    );
    report.record(
        "login_codes",
        sqlx::query("DELETE FROM login_codes WHERE email = ?")
            .bind(&email)
            .execute(pool)
            .await
            .map(|result| result.rows_affected())
            .map_err(|error| error.to_string()),
    );
    report.record(
        "channel_ownership",
        delete_where(pool, "UPDATE rooms SET created_by = NULL WHERE created_by = ?", user_id).await,
    );
    report.record(
        "user",
        delete_where(pool, "DELETE FROM users WHERE id = ?", user_id).await,
    );

    if report.is_complete() {
        info!(user = %user_public_id, "account erased");
    } else {
        warn!(
            user = %user_public_id,
            failed_steps = report.failures().count(),
            "account erasure finished with failures"
        );
    }

    Ok(report)
}
