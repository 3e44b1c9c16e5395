use std::sync::Arc;

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};
use modnet_config::AuthConfig;
use modnet_database::{new_public_id, time, DatabaseError};

pub mod mailer;
pub mod validation;

pub use mailer::{
    mailer_from_config, HttpMailer, LogMailer, LoginCodeMessage, MailError, Mailer, MemoryMailer,
};

const USER_COLUMNS: &str = "id, public_id, email, display_name, role, status, consent_version, consent_given_at, course_id, semester, created_at";

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    config: AuthConfig,
    session_ttl: Duration,
    otp_ttl: Duration,
    resend_cooldown: Duration,
    mailer: Arc<dyn Mailer>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("email domain is not allowed to sign in")]
    DomainNotAllowed,
    #[error("a login code was sent recently, retry in {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
    #[error("invalid login code")]
    InvalidCode,
    #[error("login code expired")]
    CodeExpired,
    #[error("too many attempts, request a new code")]
    TooManyAttempts,
    #[error("account is suspended")]
    AccountSuspended,
    #[error("consent to the current privacy notice is required")]
    ConsentRequired,
    #[error("consent version {given} does not match current version {current}")]
    ConsentVersionMismatch { given: String, current: String },
    #[error("user not found")]
    UserNotFound,
    #[error("invalid display name")]
    InvalidDisplayName,
    #[error("admin role required")]
    AdminRequired,
    #[error("failed to deliver login code: {0}")]
    Mail(#[from] MailError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored data is invalid: {0}")]
    Storage(#[from] DatabaseError),
    #[error("code hashing failed: {0}")]
    CodeHash(#[from] argon2::password_hash::Error),
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub consent_version: Option<String>,
    pub consent_given_at: Option<String>,
    #[serde(skip_serializing)]
    pub course_id: Option<i64>,
    pub semester: Option<i64>,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_suspended(&self) -> bool {
        self.status == UserStatus::Suspended
    }
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginCodeIssued {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: AuthSession,
    pub first_login: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub login_codes: u64,
    pub sessions: u64,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig, mailer: Arc<dyn Mailer>) -> Self {
        let session_ttl = Duration::seconds(config.session_ttl_seconds.min(i64::MAX as u64) as i64);
        let otp_ttl = Duration::seconds(config.otp_ttl_seconds.min(i64::MAX as u64) as i64);
        let resend_cooldown =
            Duration::seconds(config.otp_resend_cooldown_seconds.min(i64::MAX as u64) as i64);

        Self {
            pool,
            config,
            session_ttl,
            otp_ttl,
            resend_cooldown,
            mailer,
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn consent_version(&self) -> &str {
        &self.config.consent_version
    }

    /// Issue a fresh numeric code for `email` and hand it to the mailer.
    ///
    /// Earlier unconsumed codes for the same address stop working.
    pub async fn request_login_code(&self, email: &str) -> Result<LoginCodeIssued, AuthError> {
        let email = validation::normalise_email(email)?;
        if !validation::domain_allowed(&email, &self.config.allowed_email_domains) {
            return Err(AuthError::DomainNotAllowed);
        }

        let now = Utc::now();

        let last_issued: Option<String> = sqlx::query_scalar(
            "SELECT created_at FROM login_codes WHERE email = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(last_issued) = last_issued {
            let available_at = time::decode(&last_issued)? + self.resend_cooldown;
            if available_at > now {
                let remaining = (available_at - now).num_seconds().max(1) as u64;
                return Err(AuthError::RateLimited {
                    retry_after_seconds: remaining,
                });
            }
        }

        let code = self.generate_code();
        let code_hash = hash_secret(&code)?;
        let expires_at = now + self.otp_ttl;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE login_codes SET consumed_at = ? WHERE email = ? AND consumed_at IS NULL",
        )
        .bind(time::encode(now))
        .bind(&email)
        .execute(&mut *tx)
        .await?;

        let code_id = sqlx::query(
            "INSERT INTO login_codes (email, code_hash, attempts, created_at, expires_at) VALUES (?, ?, 0, ?, ?)",
        )
        .bind(&email)
        .bind(&code_hash)
        .bind(time::encode(now))
        .bind(time::encode(expires_at))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        let message = LoginCodeMessage {
            to: email.clone(),
            code,
            expires_at,
        };

        if let Err(error) = self.mailer.send_login_code(&message).await {
            warn!(%email, ?error, "login code delivery failed, discarding code");
            sqlx::query("DELETE FROM login_codes WHERE id = ?")
                .bind(code_id)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::Mail(error));
        }

        info!(%email, "login code issued");
        Ok(LoginCodeIssued { email, expires_at })
    }

    /// Exchange a login code for a session, creating the account on first login.
    pub async fn verify_login_code(&self, email: &str, code: &str) -> Result<LoginOutcome, AuthError> {
        let email = validation::normalise_email(email)?;
        let code = code.trim();

        let row = sqlx::query(
            "SELECT id, code_hash, expires_at FROM login_codes WHERE email = ? AND consumed_at IS NULL ORDER BY created_at DESC LIMIT 1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(AuthError::InvalidCode);
        };

        let code_id: i64 = row.try_get("id")?;
        let code_hash: String = row.try_get("code_hash")?;
        let expires_at: String = row.try_get("expires_at")?;

        if time::decode(&expires_at)? <= Utc::now() {
            return Err(AuthError::CodeExpired);
        }

        // The attempt is reserved before the hash check so concurrent guesses
        // cannot all pass the limit.
        let max_attempts = i64::from(self.config.otp_max_attempts);
        let attempts: Option<i64> = sqlx::query_scalar(
            "UPDATE login_codes SET attempts = attempts + 1 WHERE id = ? AND consumed_at IS NULL AND attempts < ? RETURNING attempts",
        )
        .bind(code_id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        let Some(attempts) = attempts else {
            let consumed: Option<String> =
                sqlx::query_scalar("SELECT consumed_at FROM login_codes WHERE id = ?")
                    .bind(code_id)
                    .fetch_optional(&self.pool)
                    .await?
                    .flatten();
            return if consumed.is_some() {
                Err(AuthError::InvalidCode)
            } else {
                Err(AuthError::TooManyAttempts)
            };
        };

        if !verify_secret(code, &code_hash)? {
            debug!(%email, attempts, "login code mismatch");

            return if attempts >= max_attempts {
                Err(AuthError::TooManyAttempts)
            } else {
                Err(AuthError::InvalidCode)
            };
        }

        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            "UPDATE login_codes SET consumed_at = ? WHERE id = ? AND consumed_at IS NULL",
        )
        .bind(time::now())
        .bind(code_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if consumed == 0 {
            return Err(AuthError::InvalidCode);
        }

        let existing = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(&email)
        .fetch_optional(&mut *tx)
        .await?;

        let (user, first_login) = match existing {
            Some(user) => (user, false),
            None => {
                let display_name = validation::display_name_from_email(&email);
                (self.insert_user(&mut tx, &email, &display_name).await?, true)
            }
        };

        tx.commit().await?;

        if user.is_suspended() {
            return Err(AuthError::AccountSuspended);
        }

        let session = self.issue_session(user.id).await?;
        info!(user = %user.public_id, first_login, "login code verified");

        Ok(LoginOutcome {
            user,
            session,
            first_login,
        })
    }

    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        let expires_at = time::decode(&expires_at).map_err(|_| AuthError::InvalidSession)?;

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::SessionExpired);
        }

        let user = self.fetch_user(user_id).await?;
        if user.is_suspended() {
            return Err(AuthError::AccountSuspended);
        }

        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let removed = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(AuthError::SessionNotFound);
        }
        Ok(())
    }

    /// Remove expired sessions and login codes that can no longer be used.
    pub async fn purge_expired(&self) -> Result<PurgeStats, AuthError> {
        let now = Utc::now();
        let stale_before = time::encode(now - Duration::days(1));
        let now = time::encode(now);

        let login_codes = sqlx::query(
            "DELETE FROM login_codes WHERE expires_at <= ? OR (consumed_at IS NOT NULL AND created_at <= ?)",
        )
        .bind(&now)
        .bind(&stale_before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(PurgeStats {
            login_codes,
            sessions,
        })
    }

    /// Fails with [`AuthError::ConsentRequired`] unless the user accepted the current notice.
    pub fn require_consent(&self, user: &User) -> Result<(), AuthError> {
        match user.consent_version.as_deref() {
            Some(version) if version == self.config.consent_version => Ok(()),
            _ => Err(AuthError::ConsentRequired),
        }
    }

    pub fn require_admin(&self, user: &User) -> Result<(), AuthError> {
        if user.is_admin() {
            Ok(())
        } else {
            Err(AuthError::AdminRequired)
        }
    }

    pub async fn give_consent(&self, user_id: i64, version: &str) -> Result<User, AuthError> {
        if version != self.config.consent_version {
            return Err(AuthError::ConsentVersionMismatch {
                given: version.to_owned(),
                current: self.config.consent_version.clone(),
            });
        }

        let now = time::now();
        sqlx::query(
            "UPDATE users SET consent_version = ?, consent_given_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(version)
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        info!(user_id, version, "consent recorded");
        self.fetch_user(user_id).await
    }

    pub async fn withdraw_consent(&self, user_id: i64) -> Result<User, AuthError> {
        sqlx::query(
            "UPDATE users SET consent_version = NULL, consent_given_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(time::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        info!(user_id, "consent withdrawn");
        self.fetch_user(user_id).await
    }

    pub async fn user_profile(&self, user_id: i64) -> Result<User, AuthError> {
        self.fetch_user(user_id).await
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> Result<User, AuthError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE public_id = ?"))
            .bind(public_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User, AuthError> {
        let email = validation::normalise_email(email)?;
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn list_users(&self, limit: u32, offset: u32) -> Result<Vec<User>, AuthError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?"
        ))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn update_display_name(
        &self,
        user_id: i64,
        display_name: &str,
    ) -> Result<User, AuthError> {
        let display_name = validation::validate_display_name(display_name)?;

        sqlx::query("UPDATE users SET display_name = ?, updated_at = ? WHERE id = ?")
            .bind(&display_name)
            .bind(time::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.fetch_user(user_id).await
    }

    pub async fn set_role(&self, public_id: &str, role: UserRole) -> Result<User, AuthError> {
        let user = self.find_by_public_id(public_id).await?;

        sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role)
            .bind(time::now())
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        info!(user = %user.public_id, ?role, "user role changed");
        self.fetch_user(user.id).await
    }

    /// Change the account status. Suspending a user also ends all of their sessions.
    pub async fn set_status(&self, public_id: &str, status: UserStatus) -> Result<User, AuthError> {
        let user = self.find_by_public_id(public_id).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(time::now())
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        if status == UserStatus::Suspended {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(user = %user.public_id, ?status, "user status changed");
        self.fetch_user(user.id).await
    }

    async fn insert_user(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        email: &str,
        display_name: &str,
    ) -> Result<User, AuthError> {
        let now = time::now();
        let public_id = new_public_id();

        let id = sqlx::query(
            "INSERT INTO users (public_id, email, display_name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(email)
        .bind(display_name)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;

        info!(user = %user.public_id, "created user on first login");
        Ok(user)
    }

    async fn fetch_user(&self, id: i64) -> Result<User, AuthError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = generate_session_token();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&token)
        .bind(time::encode(now))
        .bind(time::encode(expires_at))
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.config.otp_length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_secret(secret: &str, stored: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(stored)?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
