//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_PREFIX: &str = "/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOKEN_FILE: &str = ".admin-tokens.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing config: env var {var} not set")]
    MissingVar { var: String },

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

/// How concurrent 401s share token refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Refreshes are serialized; a caller whose token was already replaced
    /// reuses the new one instead of refreshing again.
    #[default]
    SingleFlight,
    /// Every 401 triggers its own refresh call; the last write wins.
    Independent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Backend auth endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPaths {
    pub login: String,
    pub refresh: String,
    pub me: String,
    pub logout: String,
}

impl AuthPaths {
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = normalize_prefix(prefix);
        Self {
            login: format!("{prefix}/auth/login"),
            refresh: format!("{prefix}/auth/refresh"),
            me: format!("{prefix}/auth/me"),
            logout: format!("{prefix}/auth/logout"),
        }
    }
}

impl Default for AuthPaths {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_API_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub auth_paths: AuthPaths,
    pub timeouts: Timeouts,
    pub refresh_mode: RefreshMode,
    /// Minimum time a loading state stays visible. Zero disables the delay.
    pub min_loading: Duration,
    pub token_file: PathBuf,
}

impl ClientConfig {
    /// Defaults for everything but the base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_prefix: DEFAULT_API_PREFIX.to_owned(),
            auth_paths: AuthPaths::default(),
            timeouts: Timeouts::default(),
            refresh_mode: RefreshMode::default(),
            min_loading: Duration::ZERO,
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
        }
    }

    /// Build typed client config from environment variables.
    ///
    /// Required:
    /// - `ADMIN_API_BASE_URL`
    ///
    /// Optional:
    /// - `ADMIN_API_PREFIX`: default `/api/v1`
    /// - `ADMIN_API_REQUEST_TIMEOUT_SECS`: default 30
    /// - `ADMIN_API_CONNECT_TIMEOUT_SECS`: default 10
    /// - `ADMIN_REFRESH_MODE`: `single_flight` (default) or `independent`
    /// - `ADMIN_MIN_LOADING_MS`: default 0
    /// - `ADMIN_TOKEN_FILE`: default `.admin-tokens.json`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            env_var("ADMIN_API_BASE_URL").ok_or_else(|| ConfigError::MissingVar { var: "ADMIN_API_BASE_URL".into() })?;
        let mut config = Self::new(base_url);

        if let Some(prefix) = env_var("ADMIN_API_PREFIX") {
            config.api_prefix = normalize_prefix(&prefix);
            config.auth_paths = AuthPaths::with_prefix(&prefix);
        }
        config.timeouts = Timeouts {
            request_secs: env_parse_u64("ADMIN_API_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: env_parse_u64("ADMIN_API_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };
        config.refresh_mode = parse_refresh_mode(env_var("ADMIN_REFRESH_MODE").as_deref())?;
        config.min_loading = Duration::from_millis(env_parse_u64("ADMIN_MIN_LOADING_MS", 0)?);
        if let Some(path) = env_var("ADMIN_TOKEN_FILE") {
            config.token_file = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Path of a resource under the API prefix, e.g. `users/7` -> `/api/v1/users/7`.
    #[must_use]
    pub fn resource_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.api_prefix.is_empty() { format!("/{path}") } else { format!("{}/{path}", self.api_prefix) }
    }
}

fn env_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn env_parse_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::Parse(format!("{key} must be a non-negative integer, got '{raw}'"))),
    }
}

fn parse_refresh_mode(raw: Option<&str>) -> Result<RefreshMode, ConfigError> {
    match raw.unwrap_or("single_flight") {
        "single_flight" => Ok(RefreshMode::SingleFlight),
        "independent" => Ok(RefreshMode::Independent),
        other => Err(ConfigError::Parse(format!(
            "unsupported ADMIN_REFRESH_MODE '{other}' (expected 'single_flight' or 'independent')"
        ))),
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() { String::new() } else { format!("/{trimmed}") }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
