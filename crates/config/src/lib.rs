use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "modnet.toml",
    "config/modnet.toml",
    "crates/config/modnet.toml",
    "../modnet.toml",
    "../config/modnet.toml",
    "../crates/config/modnet.toml",
];

/// Keys that accept a comma separated list when supplied through the environment.
const LIST_KEYS: &[&str] = &[
    "http.allowed_origins",
    "auth.allowed_email_domains",
    "storage.allowed_content_types",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://modnet.db".to_string(),
            max_connections: 10,
        }
    }
}

/// One-time passcode login, session and consent settings.
///
/// ```
/// use modnet_config::AuthConfig;
///
/// let auth = AuthConfig::default();
/// assert_eq!(auth.otp_length, 6);
/// assert_eq!(auth.otp_ttl_seconds, 600);
/// assert!(auth.allowed_email_domains.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_otp_ttl")]
    pub otp_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_otp_length")]
    pub otp_length: usize,
    #[serde(default = "AuthConfig::default_otp_max_attempts")]
    pub otp_max_attempts: u32,
    #[serde(default = "AuthConfig::default_otp_resend_cooldown")]
    pub otp_resend_cooldown_seconds: u64,
    /// Email domains allowed to sign in, e.g. `uni-example.de`. Empty allows every domain.
    #[serde(default)]
    pub allowed_email_domains: Vec<String>,
    #[serde(default = "AuthConfig::default_consent_version")]
    pub consent_version: String,
}

impl AuthConfig {
    const fn default_session_ttl() -> u64 {
        7 * 86_400
    }

    const fn default_otp_ttl() -> u64 {
        600
    }

    const fn default_otp_length() -> usize {
        6
    }

    const fn default_otp_max_attempts() -> u32 {
        5
    }

    const fn default_otp_resend_cooldown() -> u64 {
        60
    }

    fn default_consent_version() -> String {
        "2024-01".to_string()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
            otp_ttl_seconds: Self::default_otp_ttl(),
            otp_length: Self::default_otp_length(),
            otp_max_attempts: Self::default_otp_max_attempts(),
            otp_resend_cooldown_seconds: Self::default_otp_resend_cooldown(),
            allowed_email_domains: Vec::new(),
            consent_version: Self::default_consent_version(),
        }
    }
}

/// Outgoing mail used for login codes. Without an endpoint the codes are only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "MailConfig::default_from")]
    pub from: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "MailConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl MailConfig {
    fn default_from() -> String {
        "ModNet <no-reply@modnet.local>".to_string()
    }

    const fn default_request_timeout() -> u64 {
        10
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: Self::default_from(),
            endpoint: None,
            api_key: None,
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "MessagingConfig::default_edit_window")]
    pub edit_window_seconds: u64,
    #[serde(default = "MessagingConfig::default_max_length")]
    pub max_message_length: usize,
    #[serde(default = "MessagingConfig::default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "MessagingConfig::default_max_page_size")]
    pub max_page_size: u32,
}

impl MessagingConfig {
    const fn default_edit_window() -> u64 {
        900
    }

    const fn default_max_length() -> usize {
        4000
    }

    const fn default_page_size() -> u32 {
        50
    }

    const fn default_max_page_size() -> u32 {
        100
    }

    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            edit_window_seconds: Self::default_edit_window(),
            max_message_length: Self::default_max_length(),
            default_page_size: Self::default_page_size(),
            max_page_size: Self::default_max_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_root")]
    pub root: String,
    #[serde(default = "StorageConfig::default_max_bytes")]
    pub max_attachment_bytes: u64,
    #[serde(default = "StorageConfig::default_content_types")]
    pub allowed_content_types: Vec<String>,
}

impl StorageConfig {
    fn default_root() -> String {
        "data/attachments".to_string()
    }

    const fn default_max_bytes() -> u64 {
        10 * 1024 * 1024
    }

    fn default_content_types() -> Vec<String> {
        [
            "image/png",
            "image/jpeg",
            "image/gif",
            "image/webp",
            "application/pdf",
            "text/plain",
        ]
        .iter()
        .map(|value| value.to_string())
        .collect()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            max_attachment_bytes: Self::default_max_bytes(),
            allowed_content_types: Self::default_content_types(),
        }
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use modnet_config::load;
///
/// std::env::remove_var("MODNET_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("http.allowed_origins", defaults.http.allowed_origins.clone())?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default(
            "auth.session_ttl_seconds",
            clamp_i64(defaults.auth.session_ttl_seconds),
        )?
        .set_default("auth.otp_ttl_seconds", clamp_i64(defaults.auth.otp_ttl_seconds))?
        .set_default("auth.otp_length", defaults.auth.otp_length as i64)?
        .set_default(
            "auth.otp_max_attempts",
            i64::from(defaults.auth.otp_max_attempts),
        )?
        .set_default(
            "auth.otp_resend_cooldown_seconds",
            clamp_i64(defaults.auth.otp_resend_cooldown_seconds),
        )?
        .set_default(
            "auth.allowed_email_domains",
            defaults.auth.allowed_email_domains.clone(),
        )?
        .set_default("auth.consent_version", defaults.auth.consent_version.clone())?
        .set_default("mail.from", defaults.mail.from.clone())?
        .set_default(
            "mail.request_timeout_seconds",
            clamp_i64(defaults.mail.request_timeout_seconds),
        )?
        .set_default(
            "messaging.edit_window_seconds",
            clamp_i64(defaults.messaging.edit_window_seconds),
        )?
        .set_default(
            "messaging.max_message_length",
            defaults.messaging.max_message_length as i64,
        )?
        .set_default(
            "messaging.default_page_size",
            i64::from(defaults.messaging.default_page_size),
        )?
        .set_default(
            "messaging.max_page_size",
            i64::from(defaults.messaging.max_page_size),
        )?
        .set_default("storage.root", defaults.storage.root.clone())?
        .set_default(
            "storage.max_attachment_bytes",
            clamp_i64(defaults.storage.max_attachment_bytes),
        )?
        .set_default(
            "storage.allowed_content_types",
            defaults.storage.allowed_content_types.clone(),
        )?;

    let mut environment_overrides = config::Environment::with_prefix("MODNET")
        .separator("__")
        .try_parsing(true)
        .list_separator(",");
    for key in LIST_KEYS {
        environment_overrides = environment_overrides.with_list_parse_key(key);
    }

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("MODNET_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via MODNET_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    normalise(&mut config);

    debug!(?config, "loaded backend configuration");
    Ok(config)
}

fn normalise(config: &mut AppConfig) {
    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    config.auth.otp_length = config.auth.otp_length.clamp(4, 10);
    config.auth.otp_max_attempts = config.auth.otp_max_attempts.max(1);

    config.auth.allowed_email_domains = config
        .auth
        .allowed_email_domains
        .iter()
        .map(|domain| domain.trim().trim_start_matches('@').to_ascii_lowercase())
        .filter(|domain| !domain.is_empty())
        .collect();

    if config.messaging.max_page_size == 0 {
        config.messaging.max_page_size = MessagingConfig::default_max_page_size();
    }
}
