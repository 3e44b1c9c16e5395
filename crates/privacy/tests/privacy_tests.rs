use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use modnet_auth::{Authenticator, MemoryMailer, User};
use modnet_chats::{AttachmentStore, MessagingService, ModuleService, NewMessage};
use modnet_config::{AuthConfig, MessagingConfig, StorageConfig};
use modnet_database::MIGRATOR;
use modnet_privacy::{erase_account, export_user_data, PrivacyError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

struct TestContext {
    pool: SqlitePool,
    authenticator: Authenticator,
    mailer: MemoryMailer,
    modules: ModuleService,
    messaging: MessagingService,
    store: AttachmentStore,
    _temp_dir: TempDir,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_url = format!("sqlite://{}", temp_dir.path().join("privacy.sqlite").display());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await?;

        let mailer = MemoryMailer::new();
        let authenticator = Authenticator::new(
            pool.clone(),
            AuthConfig {
                otp_resend_cooldown_seconds: 0,
                ..AuthConfig::default()
            },
            Arc::new(mailer.clone()),
        );
        let store = AttachmentStore::new(temp_dir.path().join("attachments"));
        let messaging = MessagingService::new(
            pool.clone(),
            store.clone(),
            MessagingConfig::default(),
            StorageConfig::default(),
        );

        Ok(Self {
            modules: ModuleService::new(pool.clone()),
            pool,
            authenticator,
            mailer,
            messaging,
            store,
            _temp_dir: temp_dir,
        })
    }

    async fn student(&self, email: &str) -> TestResult<User> {
        self.authenticator.request_login_code(email).await?;
        let code = self.mailer.last_code_for(email).ok_or("no code sent")?;
        let outcome = self.authenticator.verify_login_code(email, &code).await?;
        let version = self.authenticator.consent_version().to_owned();
        Ok(self.authenticator.give_consent(outcome.user.id, &version).await?)
    }

    async fn count(&self, sql: &str) -> TestResult<i64> {
        Ok(sqlx::query_scalar(sql).fetch_one(&self.pool).await?)
    }
}

#[tokio::test]
async fn export_contains_everything_the_user_produced() -> TestResult {
    let ctx = TestContext::new().await?;
    let ada = ctx.student("ada@uni-example.de").await?;
    let grace = ctx.student("grace@uni-example.de").await?;

    let course = ctx.modules.create_course("INF", "Informatik", 6).await?;
    let module = ctx.modules.create_module(&course.id, "ALG1", "Algorithmen 1", 1).await?;
    ctx.modules.select_course(&ada, &course.id, 1).await?;
    ctx.modules.select_modules(&ada, &[module.id.clone()]).await?;

    let channel = ctx.messaging.create_channel(&grace, "Chess Club", None).await?;
    ctx.messaging.join_channel(&ada, &channel.id).await?;

    let kept = ctx
        .messaging
        .send_message(&ada, &module.room_id, &NewMessage::text("hello module"))
        .await?;
    let removed = ctx
        .messaging
        .send_message(&ada, &channel.id, &NewMessage::text("regret"))
        .await?;
    ctx.messaging.delete_message(&ada, &channel.id, &removed.id).await?;

    let gossip = ctx
        .messaging
        .send_message(&grace, &channel.id, &NewMessage::text("gossip"))
        .await?;
    ctx.messaging
        .report_message(&ada, &channel.id, &gossip.id, "not nice")
        .await?;

    let export = export_user_data(&ctx.pool, ada.id).await?;
    assert_eq!(export.profile.email, "ada@uni-example.de");
    assert!(export.consent.version.is_some());
    assert_eq!(export.course.as_ref().map(|c| c.code.as_str()), Some("INF"));
    assert_eq!(export.modules.len(), 1);
    assert_eq!(export.memberships.len(), 2);
    assert_eq!(export.messages.len(), 2);
    assert_eq!(export.messages[0].id, kept.id);
    assert!(export.messages[1].deleted_at.is_some());
    assert_eq!(export.reports.len(), 1);

    let json = serde_json::to_value(&export)?;
    assert!(json.get("exported_at").is_some());

    Ok(())
}

#[tokio::test]
async fn erasure_removes_rows_and_files() -> TestResult {
    let ctx = TestContext::new().await?;
    let ada = ctx.student("ada@uni-example.de").await?;
    let grace = ctx.student("grace@uni-example.de").await?;

    let channel = ctx.messaging.create_channel(&ada, "Study Group", None).await?;
    ctx.messaging.join_channel(&grace, &channel.id).await?;

    let upload = ctx
        .messaging
        .upload_attachment(&ada, &channel.id, "notes.txt", "text/plain", Bytes::from_static(b"notes"))
        .await?;
    let question = ctx
        .messaging
        .send_message(
            &ada,
            &channel.id,
            &NewMessage {
                content: "see notes".into(),
                attachment_ids: vec![upload.id.clone()],
                ..NewMessage::default()
            },
        )
        .await?;
    let reply = ctx
        .messaging
        .send_message(&grace, &channel.id, &NewMessage::text("thanks").replying_to(&question.id))
        .await?;

    let report = erase_account(&ctx.pool, &ctx.store, &ada.public_id).await?;
    assert!(report.is_complete(), "{:?}", report.steps);
    assert_eq!(
        report.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        vec![
            "attachment_files",
            "attachments",
            "reports",
            "messages",
            "orphaned_replies",
            "room_memberships",
            "module_selections",
            "sessions",
            "login_codes",
            "channel_ownership",
            "user",
        ]
    );

    assert_eq!(ctx.count("SELECT COUNT(*) FROM users WHERE email = 'ada@uni-example.de'").await?, 0);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM attachments").await?, 0);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM sessions").await?, 1);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM rooms WHERE created_by IS NULL").await?, 1);

    let page = ctx.messaging.list_messages(&grace, &channel.id, None, None).await?;
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, reply.id);
    assert!(page.messages[0].reply_to.is_none());

    assert_eq!(report.removed_messages.len(), 1);
    let tombstone = &report.removed_messages[0];
    assert_eq!(tombstone.id, question.id);
    assert_eq!(tombstone.room_id, channel.id);
    assert!(tombstone.is_deleted());
    assert!(tombstone.content.is_none());
    assert!(tombstone.attachments.is_empty());

    // The reply lost its parent preview, so pollers must see it again.
    assert_eq!(report.orphaned_replies.len(), 1);
    assert_eq!(report.orphaned_replies[0].id, reply.id);
    assert!(report.orphaned_replies[0].reply_to.is_none());
    let changes = ctx.messaging.messages_since(&grace, &channel.id, reply.seq).await?;
    assert_eq!(changes.messages.len(), 1);
    assert_eq!(changes.messages[0].id, reply.id);
    assert!(changes.messages[0].updated_at > reply.updated_at);

    let files = std::fs::read_dir(ctx.store.root())?
        .flat_map(|entry| entry.ok())
        .filter_map(|dir| std::fs::read_dir(dir.path()).ok())
        .flat_map(|entries| entries.flatten())
        .count();
    assert_eq!(files, 0);

    let again = erase_account(&ctx.pool, &ctx.store, &ada.public_id).await;
    assert!(matches!(again, Err(PrivacyError::UserNotFound)));

    Ok(())
}
