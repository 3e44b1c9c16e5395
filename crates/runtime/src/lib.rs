use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use modnet_auth::{mailer_from_config, Authenticator};
use modnet_chats::{
    services::attachments::purge_orphaned_uploads, AdminService, AttachmentStore,
    MessagingService, ModuleService, PresenceRegistry,
};
use modnet_config::AppConfig;
use modnet_database::initialize_database;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Pending uploads older than this many hours are treated as abandoned.
pub const ORPHANED_UPLOAD_AGE_HOURS: i64 = 24;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        init_tracing_with("info")
    }

    /// Install the global subscriber; `RUST_LOG` overrides `default_filter`.
    pub fn init_tracing_with(default_filter: &str) -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub config: AppConfig,
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub store: AttachmentStore,
    pub modules: ModuleService,
    pub messaging: MessagingService,
    pub admin: AdminService,
    pub presence: PresenceRegistry,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database).await?;

        let mailer = mailer_from_config(&config.mail).context("failed to configure mailer")?;
        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone(), mailer);

        tokio::fs::create_dir_all(&config.storage.root)
            .await
            .with_context(|| format!("failed to create attachment directory {}", config.storage.root))?;
        let store = AttachmentStore::new(&config.storage.root);

        let messaging = MessagingService::new(
            db_pool.clone(),
            store.clone(),
            config.messaging.clone(),
            config.storage.clone(),
        );

        info!(
            storage = %config.storage.root,
            mail_relay = config.mail.endpoint.is_some(),
            "backend services ready"
        );

        Ok(Self {
            config: config.clone(),
            modules: ModuleService::new(db_pool.clone()),
            admin: AdminService::new(db_pool.clone()),
            db_pool,
            authenticator,
            store,
            messaging,
            presence: PresenceRegistry::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub login_codes: u64,
    pub sessions: u64,
    pub orphaned_uploads: u64,
}

/// Drop expired login codes and sessions and abandoned uploads.
pub async fn run_housekeeping(services: &BackendServices) -> Result<HousekeepingReport> {
    let purged = services
        .authenticator
        .purge_expired()
        .await
        .context("failed to purge expired credentials")?;

    let orphaned_uploads = purge_orphaned_uploads(
        &services.db_pool,
        &services.store,
        Utc::now() - chrono::Duration::hours(ORPHANED_UPLOAD_AGE_HOURS),
    )
    .await
    .context("failed to purge orphaned uploads")?;

    Ok(HousekeepingReport {
        login_codes: purged.login_codes,
        sessions: purged.sessions,
        orphaned_uploads,
    })
}

/// Run [`run_housekeeping`] every `every` until the task is aborted.
pub fn spawn_housekeeping(services: BackendServices, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match run_housekeeping(&services).await {
                Ok(report) => info!(
                    login_codes = report.login_codes,
                    sessions = report.sessions,
                    orphaned_uploads = report.orphaned_uploads,
                    "housekeeping finished"
                ),
                Err(error) => warn!(error = %format!("{error:#}"), "housekeeping failed"),
            }
        }
    })
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
