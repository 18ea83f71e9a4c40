//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! The resulting [`Config`] is built once at process start and handed by
//! reference to the event store, classifier, email client and API layer.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transactional email provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Provider API key. Sending is disabled when absent.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_from")]
    pub from: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_email_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Drop every outbound email (non-production environments)
    #[serde(default)]
    pub suppress_outbound: bool,

    /// Rewrite every recipient list to this single address
    #[serde(default)]
    pub redirect_to: Option<String>,

    #[serde(default)]
    pub disable_idempotency: bool,
}

fn default_from() -> String {
    "Outreach <noreply@example.org>".to_string()
}

fn default_api_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_email_timeout() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    500
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from: default_from(),
            api_base_url: default_api_base_url(),
            timeout_ms: default_email_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            suppress_outbound: false,
            redirect_to: None,
            disable_idempotency: false,
        }
    }
}

impl EmailConfig {
    /// Whether a provider credential is configured
    pub fn is_enabled(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Public website configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Public base URL used for links and image proxying
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Same-domain path that proxies therapist profile images
    #[serde(default = "default_image_proxy_path")]
    pub image_proxy_path: String,

    /// Cookie-consent banner flag (legal-page copy only)
    #[serde(default)]
    pub cookie_consent: bool,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_image_proxy_path() -> String {
    "/api/images/therapist-profiles".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            image_proxy_path: default_image_proxy_path(),
            cookie_consent: false,
        }
    }
}

impl SiteConfig {
    /// Base URL without a trailing slash
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Absolute URL of the image proxy (`<base_url><image_proxy_path>`)
    pub fn image_proxy_base(&self) -> String {
        format!(
            "{}/{}",
            self.base(),
            self.image_proxy_path.trim_matches('/')
        )
    }
}

/// Object storage configuration (therapist profile photos)
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Public object URL prefix, e.g.
    /// `https://<project>.supabase.co/storage/v1/object/public`
    #[serde(default)]
    pub public_url: Option<String>,

    #[serde(default = "default_profile_bucket")]
    pub profile_bucket: String,
}

fn default_profile_bucket() -> String {
    "therapist-profiles".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_url: None,
            profile_bucket: default_profile_bucket(),
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Row cap for a single classification query
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("outreach").join("events.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./outreach_data/events.db".to_string())
}

fn default_max_rows() -> usize {
    5000
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_rows: default_max_rows(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_segment_window")]
    pub default_segment_window_days: i64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_segment_window() -> i64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_segment_window_days: default_segment_window(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber.
    ///
    /// `RUST_LOG` wins over the configured level. `format = "json"` selects
    /// structured output, anything else the human-readable formatter.
    pub fn init(&self) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("outreach={},tower_http=info", self.level)));

        let registry = tracing_subscriber::registry().with(filter);

        let result = if self.format.eq_ignore_ascii_case("json") {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
        } else {
            registry.with(tracing_subscriber::fmt::layer()).try_init()
        };

        if let Err(e) = result {
            eprintln!("Tracing already initialized: {}", e);
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("outreach").join("config.toml")),
            Some(PathBuf::from("/etc/outreach/config.toml")),
            Some(PathBuf::from("./outreach.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Split out from [`Config::apply_env_overrides`] so the mapping can be
    /// exercised without touching process-global environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Email overrides
        if let Some(key) = lookup("OUTREACH_EMAIL_API_KEY").or_else(|| lookup("RESEND_API_KEY")) {
            self.email.api_key = non_empty(key);
        }
        if let Some(from) = lookup("OUTREACH_EMAIL_FROM") {
            self.email.from = from;
        }
        if let Some(base) = lookup("OUTREACH_EMAIL_API_BASE") {
            self.email.api_base_url = base;
        }
        if let Some(timeout) = lookup("OUTREACH_EMAIL_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse() {
                self.email.timeout_ms = t;
            }
        }
        if let Some(flag) = lookup("OUTREACH_EMAIL_SUPPRESS") {
            self.email.suppress_outbound = parse_flag(&flag);
        }
        if let Some(to) = lookup("OUTREACH_EMAIL_REDIRECT_TO") {
            self.email.redirect_to = non_empty(to);
        }
        if let Some(flag) = lookup("OUTREACH_EMAIL_DISABLE_IDEMPOTENCY") {
            self.email.disable_idempotency = parse_flag(&flag);
        }

        // Site overrides
        if let Some(url) = lookup("OUTREACH_BASE_URL") {
            self.site.base_url = url;
        }
        if let Some(flag) = lookup("OUTREACH_COOKIE_CONSENT") {
            self.site.cookie_consent = parse_flag(&flag);
        }

        // Storage overrides
        if let Some(url) = lookup("OUTREACH_STORAGE_PUBLIC_URL") {
            self.storage.public_url = non_empty(url);
        }

        // Event log overrides
        if let Some(path) = lookup("OUTREACH_EVENTS_DB") {
            self.events.database_path = path;
        }

        // API overrides
        if let Some(host) = lookup("OUTREACH_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("OUTREACH_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Logging overrides
        if let Some(level) = lookup("OUTREACH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("OUTREACH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Outreach Configuration
#
# Environment variables override these settings:
# - OUTREACH_EMAIL_API_KEY (or RESEND_API_KEY)
# - OUTREACH_EMAIL_FROM
# - OUTREACH_EMAIL_API_BASE
# - OUTREACH_EMAIL_TIMEOUT_MS
# - OUTREACH_EMAIL_SUPPRESS
# - OUTREACH_EMAIL_REDIRECT_TO
# - OUTREACH_EMAIL_DISABLE_IDEMPOTENCY
# - OUTREACH_BASE_URL
# - OUTREACH_COOKIE_CONSENT
# - OUTREACH_STORAGE_PUBLIC_URL
# - OUTREACH_EVENTS_DB
# - OUTREACH_API_HOST
# - OUTREACH_API_PORT
# - OUTREACH_LOG_LEVEL
# - OUTREACH_LOG_FORMAT

[email]
# Provider API key; leave unset to disable sending
# api_key = "re_..."

# Default sender
from = "Outreach <noreply@example.org>"

# Provider API base URL
api_base_url = "https://api.resend.com"

# Per-attempt request timeout (ms)
timeout_ms = 10000

# Total attempts per email (retries on 429 and 5xx)
max_attempts = 3

# Base delay for exponential backoff between attempts (ms)
backoff_base_ms = 500

# Drop all outbound email (staging)
suppress_outbound = false

# Send everything to one address instead (staging)
# redirect_to = "qa@example.org"

# Skip the Idempotency-Key header
disable_idempotency = false

[site]
# Public base URL for links and image proxying
base_url = "http://localhost:3000"

# Same-domain path serving therapist profile photos
image_proxy_path = "/api/images/therapist-profiles"

# Show the cookie-consent banner
cookie_consent = false

[storage]
# Public object storage prefix for the image proxy
# public_url = "https://<project>.supabase.co/storage/v1/object/public"
profile_bucket = "therapist-profiles"

[events]
# SQLite event log
database_path = "./outreach_data/events.db"

# Maximum rows read per classification
max_rows = 5000

[api]
host = "0.0.0.0"
port = 8082

# Default look-back window for segment classification (days)
default_segment_window_days = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
