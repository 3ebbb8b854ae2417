//! Custom error types for the relay

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which quota period produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    /// Per-minute style rolling window
    ShortWindow,
    /// Per-day style rolling window
    LongWindow,
    /// Calendar-month character budget
    Monthly,
}

impl QuotaScope {
    /// True for the periods a caller should treat as a long backoff
    pub fn is_daily(&self) -> bool {
        !matches!(self, QuotaScope::ShortWindow)
    }
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaScope::ShortWindow => write!(f, "short window"),
            QuotaScope::LongWindow => write!(f, "long window"),
            QuotaScope::Monthly => write!(f, "monthly"),
        }
    }
}

/// Relay-related errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Text was empty after trimming; recovered locally, never surfaced
    #[error("empty input text")]
    EmptyInput,

    /// No client configured for the routed provider
    #[error("provider not available: {provider}")]
    ProviderUnavailable {
        provider: String,
    },

    /// Local quota accounting refused the request
    #[error("quota exceeded ({scope}), estimated wait {wait:?}")]
    QuotaExceeded {
        scope: QuotaScope,
        wait: Option<Duration>,
        remaining: usize,
    },

    /// The remote side refused with a rate/quota error
    #[error("remote rate limit hit, retry after {retry_after:?} seconds")]
    RemoteRateLimited {
        retry_after: Option<u64>,
    },

    /// Any other failure from the remote call
    #[error("provider error: {status:?} - {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// Malformed message or unexpected failure during processing
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayError {
    /// True if this error came from a remote quota refusal and is worth a
    /// single retry on a different credential
    pub fn is_quota_shaped(&self) -> bool {
        matches!(self, RelayError::RemoteRateLimited { .. })
    }
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_scope_daily_flag() {
        assert!(!QuotaScope::ShortWindow.is_daily());
        assert!(QuotaScope::LongWindow.is_daily());
        assert!(QuotaScope::Monthly.is_daily());
    }

    #[test]
    fn test_quota_shaped() {
        assert!(RelayError::RemoteRateLimited { retry_after: None }.is_quota_shaped());
        assert!(!RelayError::Provider {
            status: Some(500),
            message: "boom".to_string()
        }
        .is_quota_shaped());
    }
}
