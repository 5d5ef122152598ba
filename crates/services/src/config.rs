use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "http://java-quiz.test";
pub const DEFAULT_DB_URL: &str = "sqlite://quiz-client.sqlite3";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_BASE_URL: &str = "QUIZ_API_BASE_URL";
pub const ENV_DB_URL: &str = "QUIZ_DB_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "QUIZ_HTTP_TIMEOUT_SECS";

/// Connection settings for the quiz client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    api_base_url: String,
    db_url: String,
    http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            db_url: DEFAULT_DB_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Read settings from the process environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = non_empty(lookup(ENV_API_BASE_URL)) {
            config = config.with_api_base_url(&raw)?;
        }
        if let Some(raw) = non_empty(lookup(ENV_DB_URL)) {
            config.db_url = raw;
        }
        if let Some(raw) = non_empty(lookup(ENV_HTTP_TIMEOUT_SECS)) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidNumber {
                    key: ENV_HTTP_TIMEOUT_SECS,
                    raw,
                })?;
            config.http_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Replace the API base URL. Trailing slashes are dropped so paths can be
    /// appended with a single `/`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` for anything that is not an
    /// absolute http(s) URL.
    pub fn with_api_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let parsed = Url::parse(trimmed).map_err(|err| ConfigError::InvalidBaseUrl {
            raw: raw.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                raw: raw.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        self.api_base_url = trimmed.trim_end_matches('/').to_string();
        Ok(self)
    }

    #[must_use]
    pub fn with_db_url(mut self, db_url: impl Into<String>) -> Self {
        self.db_url = db_url.into();
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    #[must_use]
    pub fn db_url(&self) -> &str {
        &self.db_url
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
