//! Backend connection configuration.

use crate::error::{CloudError, CloudResult};
use serde::{Deserialize, Serialize};

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_TIMEOUT: &str = "FUNDPAL_REQUEST_TIMEOUT_SECS";
pub const ENV_POLL_MS: &str = "FUNDPAL_REALTIME_POLL_MS";

/// Configuration for the hosted backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project base URL (e.g., "https://xyzcompany.supabase.co").
    pub url: String,

    /// Public anon key, sent as `apikey` on every request.
    pub anon_key: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// How often a REST change feed re-reads its table (milliseconds).
    #[serde(default = "default_poll_ms")]
    pub realtime_poll_interval_ms: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_poll_ms() -> u64 {
    2_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            request_timeout_secs: default_timeout(),
            realtime_poll_interval_ms: default_poll_ms(),
        }
    }
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            ..Self::default()
        }
    }

    /// Reads configuration from the process environment.
    pub fn from_env() -> CloudResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup. `SUPABASE_URL` is
    /// required; numeric overrides that fail to parse are rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CloudResult<Self> {
        let url = lookup(ENV_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CloudError::Config(format!("{ENV_URL} is not set")))?;

        let mut config = Self::new(url.trim().trim_end_matches('/'), lookup(ENV_ANON_KEY).unwrap_or_default());

        if let Some(raw) = lookup(ENV_TIMEOUT) {
            config.request_timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| CloudError::Config(format!("{ENV_TIMEOUT} must be an integer, got {raw:?}")))?;
        }
        if let Some(raw) = lookup(ENV_POLL_MS) {
            config.realtime_poll_interval_ms = raw
                .trim()
                .parse()
                .map_err(|_| CloudError::Config(format!("{ENV_POLL_MS} must be an integer, got {raw:?}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CloudResult<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(CloudError::Config(format!(
                "url must start with http:// or https://, got {:?}",
                self.url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CloudError::Config("request_timeout_secs must be positive".into()));
        }
        if self.realtime_poll_interval_ms == 0 {
            return Err(CloudError::Config("realtime_poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), table)
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url.trim_end_matches('/'), path)
    }
}
