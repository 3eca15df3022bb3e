use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-retryable API response (auth failures, bad requests, missing endpoints).
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The remote asked us to slow down.
    #[error("API rate limited (HTTP 429)")]
    RateLimited,

    /// Request-level timeout surfaced by the HTTP client.
    #[error("API request timed out: {0}")]
    Timeout(String),

    #[error("Record {key} has no usable modification timestamp")]
    MissingTimestamp { key: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl SyncError {
    /// Whether a failed remote call is worth retrying.
    ///
    /// Network-level failures, timeouts, rate limiting and server-side errors
    /// (HTTP 5xx) are transient; everything else aborts the run immediately.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Reqwest(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<&str> for SyncError {
    fn from(msg: &str) -> Self {
        Self::Custom(msg.to_string())
    }
}

impl From<String> for SyncError {
    fn from(msg: String) -> Self {
        Self::Custom(msg)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(SyncError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(SyncError::RateLimited.is_transient());
        assert!(SyncError::Timeout("fetch_page".into()).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!SyncError::Api {
            status: 401,
            message: "unauthorized".into()
        }
        .is_transient());
        assert!(!SyncError::Api {
            status: 404,
            message: "no such table".into()
        }
        .is_transient());
        assert!(!SyncError::Custom("boom".into()).is_transient());
    }
}
