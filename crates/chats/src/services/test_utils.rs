//! Fixtures for service tests.

use std::str::FromStr;
use std::time::Duration;

use modnet_auth::{User, UserRole};
use modnet_database::{new_public_id, time, MIGRATOR};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Creates a migrated database in a temporary directory.
pub async fn create_test_db() -> (SqlitePool, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_url = format!("sqlite://{}", temp_dir.path().join("test.db").display());

    let options = SqliteConnectOptions::from_str(&db_url)
        .expect("valid sqlite url")
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("Failed to create test database");

    MIGRATOR.run(&pool).await.expect("Failed to run migrations");

    (pool, temp_dir)
}

/// Insert a consenting user directly, bypassing the login flow.
pub async fn create_user(pool: &SqlitePool, name: &str) -> User {
    create_user_with_role(pool, name, UserRole::Student).await
}

pub async fn create_user_with_role(pool: &SqlitePool, name: &str, role: UserRole) -> User {
    let now = time::now();
    let id = sqlx::query(
        r#"
        INSERT INTO users (public_id, email, display_name, role, consent_version, consent_given_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, '2024-01', ?, ?, ?)
        "#,
    )
    .bind(new_public_id())
    .bind(format!("{}@uni-example.de", name.to_lowercase()))
    .bind(name)
    .bind(role)
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("Failed to insert user")
    .last_insert_rowid();

    sqlx::query_as::<_, User>(
        "SELECT id, public_id, email, display_name, role, status, consent_version, consent_given_at, course_id, semester, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .expect("Failed to load user")
}
