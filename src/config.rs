// Service configuration, read once at startup from the environment (.env is
// loaded by main via dotenvy before this runs).

use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::store::{DEFAULT_DOCS_API_BASE, DEFAULT_SHEETS_API_BASE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    /// Google Drive v3, needs an access token.
    Drive,
    /// Process-local store, no credentials.
    Memory,
}

impl StoreBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackendKind::Drive => "drive",
            StoreBackendKind::Memory => "memory",
        }
    }
}

impl FromStr for StoreBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drive" => Ok(StoreBackendKind::Drive),
            "memory" => Ok(StoreBackendKind::Memory),
            other => bail!("unknown STORE_BACKEND '{}' (expected 'drive' or 'memory')", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Public base URL, used in messages pointing users at the auth endpoint.
    pub app_host: String,
    pub auth_secret: Option<String>,
    pub store_backend: StoreBackendKind,
    pub google_access_token: Option<String>,
    pub drive_api_base: String,
    pub docs_api_base: String,
    pub sheets_api_base: String,
    pub http_timeout_secs: u64,
    pub cors_origins: Vec<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = parse_or(&get, "PORT", 8081)?;
        let store_backend = match get("STORE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StoreBackendKind::Drive,
        };

        let config = Self {
            port,
            app_host: get("APP_HOST")
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            auth_secret: get("AUTH_SECRET"),
            store_backend,
            google_access_token: get("GOOGLE_ACCESS_TOKEN"),
            drive_api_base: get("DRIVE_API_BASE").unwrap_or_else(|| "https://www.googleapis.com".to_string()),
            docs_api_base: get("DOCS_API_BASE").unwrap_or_else(|| DEFAULT_DOCS_API_BASE.to_string()),
            sheets_api_base: get("SHEETS_API_BASE").unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            http_timeout_secs: parse_or(&get, "HTTP_TIMEOUT_SECS", 60)?,
            cors_origins: get("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            rate_limit_per_second: parse_or(&get, "RATE_LIMIT_PER_SECOND", 2)?,
            rate_limit_burst: parse_or(&get, "RATE_LIMIT_BURST", 30)?,
        };

        if config.rate_limit_per_second == 0 || config.rate_limit_burst == 0 {
            bail!("RATE_LIMIT_PER_SECOND and RATE_LIMIT_BURST must be positive");
        }
        Ok(config)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {} value '{}'", key, raw)),
        None => Ok(default),
    }
}
