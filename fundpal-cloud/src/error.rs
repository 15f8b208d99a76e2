//! Remote persistence error types.

use serde::Deserialize;
use thiserror::Error;

/// Result type for remote operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// PostgREST code for "JSON object requested, multiple (or no) rows returned".
const PGRST_NO_ROWS: &str = "PGRST116";
/// Postgres `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur talking to the backend.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("API request failed ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("local storage error: {0}")]
    Storage(#[from] fundpal_storage::StorageError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("subscription error: {0}")]
    Subscription(String),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }
}

#[derive(Deserialize, Default)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Translates an error response from the REST gateway into a [`CloudError`].
///
/// This is the only place that knows vendor error codes; everything above
/// it matches on [`CloudError::NotFound`] and friends.
pub fn translate_postgrest_error(status: u16, body: &str) -> CloudError {
    let parsed: PostgrestErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match (parsed.message, parsed.details) {
        (Some(m), Some(d)) if !d.is_empty() => format!("{m} ({d})"),
        (Some(m), _) => m,
        (None, _) if !body.trim().is_empty() => body.trim().to_string(),
        (None, _) => format!("HTTP {status}"),
    };

    match parsed.code.as_deref() {
        Some(PGRST_NO_ROWS) => return CloudError::NotFound(message),
        Some(PG_UNIQUE_VIOLATION) => return CloudError::Conflict(message),
        _ => {}
    }

    match status {
        401 | 403 => CloudError::AuthFailed(message),
        409 => CloudError::Conflict(message),
        _ => CloudError::Api {
            status,
            code: parsed.code,
            message,
        },
    }
}
