use url::Url;

use crate::error::ConnectorError;

pub const ENV_BASE_URL: &str = "CALDAV_BASE_URL";
pub const ENV_USERNAME: &str = "CALDAV_USERNAME";
pub const ENV_PASSWORD: &str = "CALDAV_PASSWORD";
pub const ENV_ENABLE_REMINDERS: &str = "ENABLE_REMINDERS";

/// Startup configuration for the server.
///
/// Recognized options:
/// - `CALDAV_BASE_URL` (required): absolute http(s) URL of the CalDAV server
/// - `CALDAV_USERNAME` (required): basic-auth user name
/// - `CALDAV_PASSWORD` (required): basic-auth password
/// - `ENABLE_REMINDERS` (optional): reminder tools are registered when unset
///   or `true`; any other value turns them off
#[derive(Clone)]
pub struct ServerConfig {
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub reminders_enabled: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("reminders_enabled", &self.reminders_enabled)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConnectorError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConnectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConnectorError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    ConnectorError::Config(format!("{} must be set", key))
                })
        };

        let raw_url = required(ENV_BASE_URL)?;
        let base_url = Url::parse(&raw_url).map_err(|e| {
            ConnectorError::Config(format!("{} is not a valid URL ({}): {}", ENV_BASE_URL, raw_url, e))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConnectorError::Config(format!(
                "{} must use http or https, got '{}'",
                ENV_BASE_URL,
                base_url.scheme()
            )));
        }

        // Whitespace is significant in passwords, so this one is not trimmed.
        let password = lookup(ENV_PASSWORD)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConnectorError::Config(format!("{} must be set", ENV_PASSWORD)))?;

        Ok(Self {
            base_url,
            username: required(ENV_USERNAME)?,
            password,
            reminders_enabled: parse_reminders_flag(lookup(ENV_ENABLE_REMINDERS).as_deref()),
        })
    }
}

fn parse_reminders_flag(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => v.trim() == "true",
    }
}
