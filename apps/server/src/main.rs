use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use modnet_auth::UserRole;
use modnet_backend_runtime::{run_housekeeping, spawn_housekeeping, telemetry, BackendServices};
use modnet_chats::ChatError;
use modnet_config::{load as load_config, AppConfig};
use modnet_database::{prepare_database, run_migrations};
use modnet_gateway::{build_router, AppState};
use modnet_privacy::erase_account;
use tokio::net::TcpListener;
use tracing::{info, warn};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Sample catalog: course code, name, semesters and its modules as
/// (code, name, semester).
const SAMPLE_CATALOG: &[(&str, &str, i64, &[(&str, &str, i64)])] = &[
    (
        "INF-B",
        "Informatik B.Sc.",
        6,
        &[
            ("PROG1", "Programmierung 1", 1),
            ("MATHE1", "Mathematik für Informatiker 1", 1),
            ("ALGO", "Algorithmen und Datenstrukturen", 2),
            ("DB", "Datenbanksysteme", 3),
            ("BS", "Betriebssysteme", 4),
        ],
    ),
    (
        "WINF-B",
        "Wirtschaftsinformatik B.Sc.",
        6,
        &[
            ("BWL1", "Grundlagen der BWL", 1),
            ("PROG1", "Programmierung 1", 1),
            ("GP", "Geschäftsprozessmanagement", 3),
        ],
    ),
];

#[derive(Parser)]
#[command(name = "modnet-backend")]
#[command(about = "ModNet backend server and maintenance commands")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server (default)
    Serve,
    /// Apply pending database migrations
    Migrate,
    /// Insert the sample courses and modules
    SeedCatalog,
    /// Remove expired login codes, sessions and abandoned uploads
    PurgeExpired,
    /// Erase an account and all of its data
    EraseUser {
        #[arg(long)]
        email: String,
    },
    /// Grant the admin role
    Promote {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(&config).await,
        Commands::Migrate => migrate(&config).await,
        Commands::SeedCatalog => seed_catalog(&config).await,
        Commands::PurgeExpired => purge_expired(&config).await,
        Commands::EraseUser { email } => erase_user(&config, &email).await,
        Commands::Promote { email } => promote(&config, &email).await,
    }
}

async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    info!("starting ModNet backend");

    let services = BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")?;
    let housekeeping = spawn_housekeeping(services.clone(), HOUSEKEEPING_INTERVAL);
    let app = build_router(AppState::new(services));

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(modnet_backend_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    housekeeping.abort();
    info!("backend shut down");
    Ok(())
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let pool = prepare_database(&config.database).await?;
    run_migrations(&pool).await?;
    info!(url = %config.database.url, "migrations applied");
    Ok(())
}

async fn seed_catalog(config: &AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")?;

    let existing = services.modules.list_courses().await?;
    let (mut courses, mut modules) = (0, 0);

    for (code, name, semesters, entries) in SAMPLE_CATALOG {
        let course = match existing.iter().find(|course| course.code == *code) {
            Some(course) => course.clone(),
            None => {
                courses += 1;
                services
                    .modules
                    .create_course(code, name, *semesters)
                    .await
                    .with_context(|| format!("failed to create course {code}"))?
            }
        };

        for (module_code, module_name, semester) in *entries {
            match services
                .modules
                .create_module(&course.id, module_code, module_name, *semester)
                .await
            {
                Ok(_) => modules += 1,
                Err(ChatError::Conflict { .. }) => {
                    info!(course = %code, module = %module_code, "module already present")
                }
                Err(error) => {
                    return Err(error).with_context(|| format!("failed to create module {module_code}"))
                }
            }
        }
    }

    info!(courses, modules, "sample catalog seeded");
    Ok(())
}

async fn purge_expired(config: &AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")?;

    let report = run_housekeeping(&services).await?;
    info!(
        login_codes = report.login_codes,
        sessions = report.sessions,
        orphaned_uploads = report.orphaned_uploads,
        "expired data purged"
    );
    Ok(())
}

async fn erase_user(config: &AppConfig, email: &str) -> anyhow::Result<()> {
    let services = BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")?;

    let user = services
        .authenticator
        .find_by_email(email)
        .await
        .with_context(|| format!("no account for {email}"))?;
    let report = erase_account(&services.db_pool, &services.store, &user.public_id).await?;

    for step in &report.steps {
        match &step.error {
            Some(error) => warn!(step = %step.name, %error, "erasure step failed"),
            None => info!(step = %step.name, affected = step.affected, "erasure step done"),
        }
    }
    if !report.is_complete() {
        anyhow::bail!("erasure of {email} left data behind");
    }
    Ok(())
}

async fn promote(config: &AppConfig, email: &str) -> anyhow::Result<()> {
    let services = BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")?;

    let user = services
        .authenticator
        .find_by_email(email)
        .await
        .with_context(|| format!("no account for {email}"))?;
    services
        .authenticator
        .set_role(&user.public_id, UserRole::Admin)
        .await?;

    info!(user = %user.public_id, %email, "admin role granted");
    Ok(())
}
