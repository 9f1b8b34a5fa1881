//! Configuration module for DriveMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that overrides `security.credential_secret`.
pub const CREDENTIAL_SECRET_ENV: &str = "DRIVEMIRROR_CREDENTIAL_SECRET";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriveMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
    pub tokens: TokensConfig,
    pub replication: ReplicationConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API listens on, e.g. `127.0.0.1:8080`.
    pub bind: String,
}

/// SQLite database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Google OAuth client and API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Where Google sends the administrator back after consent.
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub tokeninfo_url: String,
    pub userinfo_url: String,
    /// Base URL for the Drive v3 API.
    pub api_base_url: String,
    pub scopes: Vec<String>,
}

/// Credential lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    /// Refresh a credential when it expires within this many minutes.
    pub refresh_margin_minutes: u32,
    /// Minutes between background refresh sweeps over all accounts.
    pub sweep_interval_minutes: u32,
}

/// Replication and folder taxonomy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Name of the application root folder on every account.
    pub root_folder_name: String,
    /// Share uploaded files with "anyone with the link".
    pub make_public: bool,
    /// Page size used when listing all files of an account.
    pub list_page_size: u32,
    /// Number of replication reports kept for the admin API.
    pub history_size: usize,
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding files stored before Drive integration.
    pub local_dir: PathBuf,
    /// Directory where incoming uploads are staged.
    pub staging_dir: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Secrets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Secret from which the credential encryption key is derived.
    pub credential_secret: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` if a file exists there.
    ///
    /// A missing file is `Ok(None)`; a file that cannot be read or parsed is
    /// an error.
    pub fn load_if_present(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivemirror")
            .join("config.yaml")
    }

    /// The credential secret, with the environment variable taking precedence.
    pub fn credential_secret(&self) -> Option<String> {
        pick_secret(
            std::env::var(CREDENTIAL_SECRET_ENV).ok(),
            self.security.credential_secret.clone(),
        )
    }
}

fn pick_secret(env: Option<String>, configured: Option<String>) -> Option<String> {
    env.filter(|s| !s.is_empty())
        .or(configured.filter(|s| !s.is_empty()))
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("drivemirror")
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("drivemirror.db"),
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://127.0.0.1:8080/api/accounts/callback".into(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            revoke_url: "https://oauth2.googleapis.com/revoke".into(),
            tokeninfo_url: "https://oauth2.googleapis.com/tokeninfo".into(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".into(),
            api_base_url: "https://www.googleapis.com".into(),
            scopes: vec![
                "https://www.googleapis.com/auth/drive".into(),
                "https://www.googleapis.com/auth/userinfo.email".into(),
            ],
        }
    }
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            refresh_margin_minutes: 15,
            sweep_interval_minutes: 30,
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            root_folder_name: "DriveMirror".into(),
            make_public: true,
            list_page_size: 1000,
            history_size: 50,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_dir: data_dir().join("files"),
            staging_dir: data_dir().join("staging"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"tokens.refresh_margin_minutes"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Drive caps `pageSize` at this value.
const MAX_LIST_PAGE_SIZE: u32 = 1000;

fn push(errors: &mut Vec<ValidationError>, field: &str, message: impl Into<String>) {
    errors.push(ValidationError {
        field: field.into(),
        message: message.into(),
    });
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- server ---
        if self.server.bind.parse::<SocketAddr>().is_err() {
            push(
                &mut errors,
                "server.bind",
                format!("not a socket address: {}", self.server.bind),
            );
        }

        // --- google ---
        if self.google.client_id.trim().is_empty() {
            push(&mut errors, "google.client_id", "must not be empty");
        }
        if self.google.client_secret.trim().is_empty() {
            push(&mut errors, "google.client_secret", "must not be empty");
        }
        for (field, value) in [
            ("google.redirect_uri", &self.google.redirect_uri),
            ("google.auth_url", &self.google.auth_url),
            ("google.token_url", &self.google.token_url),
            ("google.revoke_url", &self.google.revoke_url),
            ("google.tokeninfo_url", &self.google.tokeninfo_url),
            ("google.userinfo_url", &self.google.userinfo_url),
            ("google.api_base_url", &self.google.api_base_url),
        ] {
            if !is_http_url(value) {
                push(&mut errors, field, format!("not an http(s) URL: {value}"));
            }
        }
        if self.google.scopes.is_empty() {
            push(&mut errors, "google.scopes", "at least one scope is required");
        }

        // --- tokens ---
        if self.tokens.refresh_margin_minutes == 0 {
            push(
                &mut errors,
                "tokens.refresh_margin_minutes",
                "must be greater than 0",
            );
        }
        if self.tokens.sweep_interval_minutes == 0 {
            push(
                &mut errors,
                "tokens.sweep_interval_minutes",
                "must be greater than 0",
            );
        }

        // --- replication ---
        if self.replication.root_folder_name.trim().is_empty() {
            push(
                &mut errors,
                "replication.root_folder_name",
                "must not be empty",
            );
        }
        if self.replication.list_page_size == 0
            || self.replication.list_page_size > MAX_LIST_PAGE_SIZE
        {
            push(
                &mut errors,
                "replication.list_page_size",
                format!("must be between 1 and {MAX_LIST_PAGE_SIZE}"),
            );
        }
        if self.replication.history_size == 0 {
            push(
                &mut errors,
                "replication.history_size",
                "must be greater than 0",
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                &mut errors,
                "logging.level",
                format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        // --- security ---
        if self.credential_secret().is_none() {
            push(
                &mut errors,
                "security.credential_secret",
                format!("must be set (or provide {CREDENTIAL_SECRET_ENV})"),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for constructing a [`Config`] programmatically.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- server / database ---

    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.config.server.bind = bind.into();
        self
    }

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- google ---

    pub fn google_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.google.client_id = client_id.into();
        self.config.google.client_secret = client_secret.into();
        self
    }

    pub fn google_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.google.redirect_uri = uri.into();
        self
    }

    /// Point every Google endpoint at one base URL (useful for tests).
    pub fn google_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let g = &mut self.config.google;
        g.auth_url = format!("{base}/o/oauth2/v2/auth");
        g.token_url = format!("{base}/token");
        g.revoke_url = format!("{base}/revoke");
        g.tokeninfo_url = format!("{base}/tokeninfo");
        g.userinfo_url = format!("{base}/oauth2/v2/userinfo");
        g.api_base_url = base.to_string();
        self
    }

    // --- tokens ---

    pub fn refresh_margin_minutes(mut self, minutes: u32) -> Self {
        self.config.tokens.refresh_margin_minutes = minutes;
        self
    }

    pub fn sweep_interval_minutes(mut self, minutes: u32) -> Self {
        self.config.tokens.sweep_interval_minutes = minutes;
        self
    }

    // --- replication ---

    pub fn root_folder_name(mut self, name: impl Into<String>) -> Self {
        self.config.replication.root_folder_name = name.into();
        self
    }

    pub fn make_public(mut self, make_public: bool) -> Self {
        self.config.replication.make_public = make_public;
        self
    }

    pub fn list_page_size(mut self, size: u32) -> Self {
        self.config.replication.list_page_size = size;
        self
    }

    // --- storage ---

    pub fn local_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.local_dir = dir;
        self
    }

    pub fn staging_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.staging_dir = dir;
        self
    }

    // --- logging / security ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    pub fn credential_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.security.credential_secret = Some(secret.into());
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
