//! ModNet Database Crate
//!
//! Connection management, migrations and the small helpers every service
//! uses when talking to SQLite: timestamp encoding and public identifiers.

use cuid2::CuidConstructor;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use modnet_config::DatabaseConfig;

pub mod connection;
pub mod migrations;
pub mod time;
pub mod types;

pub use connection::prepare_database;
pub use migrations::{run_migrations, MIGRATOR};
pub use types::{DatabaseError, DatabaseResult};

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);

/// Identifier exposed over the API. Integer row ids stay inside the server.
pub fn new_public_id() -> String {
    CUID.create_id()
}

/// Initialize the database with migrations
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
