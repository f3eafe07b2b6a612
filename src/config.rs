//! Runtime configuration, resolved once at startup from the environment
//! (after `.env` has been loaded) and passed into the services.

use std::path::PathBuf;

use zeroize::Zeroizing;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MEDIA_ROOT: &str = "media";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone)]
pub struct AppConfig {
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: String,
    pub field_encryption_key: Zeroizing<String>,
    pub media_root: PathBuf,
    /// Reject records whose author is also the patient.
    pub self_authorship_guard: bool,
    pub cors_allow_any: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let field_encryption_key = get("FIELD_ENCRYPTION_KEY")
            .map(Zeroizing::new)
            .ok_or(ConfigError::Missing("FIELD_ENCRYPTION_KEY"))?;
        if field_encryption_key.len() != 64
            || !field_encryption_key.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ConfigError::Invalid {
                name: "FIELD_ENCRYPTION_KEY",
                reason: "expected 64 hex characters".into(),
            });
        }

        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .ok()
                .filter(|n: &u32| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "DATABASE_MAX_CONNECTIONS",
                    reason: format!("not a positive integer: {v}"),
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            max_connections,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            field_encryption_key,
            media_root: get("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_ROOT)),
            self_authorship_guard: parse_flag(
                "RECORD_SELF_AUTHORSHIP_GUARD",
                get("RECORD_SELF_AUTHORSHIP_GUARD"),
                true,
            )?,
            cors_allow_any: parse_flag("CORS_ALLOW_ANY", get("CORS_ALLOW_ANY"), true)?,
        })
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("max_connections", &self.max_connections)
            .field("bind_addr", &self.bind_addr)
            .field("media_root", &self.media_root)
            .field("self_authorship_guard", &self.self_authorship_guard)
            .field("cors_allow_any", &self.cors_allow_any)
            .finish_non_exhaustive()
    }
}

fn parse_flag(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {other}"),
        }),
    }
}
