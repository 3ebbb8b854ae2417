//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Key for the volume-billed provider; `None` disables that route
    pub deepl_api_key: Option<String>,
    pub deepl_endpoint: String,
    /// Priority-ordered keys for the request-count provider
    pub gemini_api_keys: Vec<String>,
    pub gemini_endpoint: String,
    pub gemini_model: String,
    /// Bypass all real provider calls with deterministic stub output
    pub mock_mode: bool,
    pub short_window_limit: usize,
    pub short_window_secs: u64,
    pub long_window_limit: usize,
    pub long_window_hours: u64,
    pub monthly_char_limit: usize,
    pub cache_capacity: usize,
    pub ledger_path: PathBuf,
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            deepl_api_key: None,
            deepl_endpoint: "https://api-free.deepl.com/v2/translate".to_string(),
            gemini_api_keys: vec![],
            gemini_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            mock_mode: false,
            short_window_limit: 15,
            short_window_secs: 60,
            long_window_limit: 1500,
            long_window_hours: 24,
            monthly_char_limit: 500_000,
            cache_capacity: 100,
            ledger_path: PathBuf::from("quota_ledger.json"),
            timeout_ms: 30_000,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let deepl_api_key = std::env::var("DEEPL_API_KEY").ok().filter(|k| !k.is_empty());

        let deepl_endpoint =
            std::env::var("DEEPL_API_ENDPOINT").unwrap_or(defaults.deepl_endpoint);

        let gemini_api_keys = std::env::var("GEMINI_API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        let gemini_endpoint =
            std::env::var("GEMINI_API_ENDPOINT").unwrap_or(defaults.gemini_endpoint);

        let gemini_model = std::env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model);

        let mock_mode = std::env::var("MOCK_MODE")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let short_window_limit = std::env::var("SHORT_WINDOW_LIMIT")
            .unwrap_or_else(|_| defaults.short_window_limit.to_string())
            .parse::<usize>()?;

        let short_window_secs = std::env::var("SHORT_WINDOW_SECS")
            .unwrap_or_else(|_| defaults.short_window_secs.to_string())
            .parse::<u64>()?;

        let long_window_limit = std::env::var("LONG_WINDOW_LIMIT")
            .unwrap_or_else(|_| defaults.long_window_limit.to_string())
            .parse::<usize>()?;

        let long_window_hours = std::env::var("LONG_WINDOW_HOURS")
            .unwrap_or_else(|_| defaults.long_window_hours.to_string())
            .parse::<u64>()?;

        let monthly_char_limit = std::env::var("MONTHLY_CHAR_LIMIT")
            .unwrap_or_else(|_| defaults.monthly_char_limit.to_string())
            .parse::<usize>()?;

        let cache_capacity = std::env::var("CACHE_CAPACITY")
            .unwrap_or_else(|_| defaults.cache_capacity.to_string())
            .parse::<usize>()?;

        let ledger_path = std::env::var("QUOTA_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.ledger_path);

        let timeout_ms = std::env::var("REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| defaults.timeout_ms.to_string())
            .parse::<u64>()?;

        Ok(Self {
            deepl_api_key,
            deepl_endpoint,
            gemini_api_keys,
            gemini_endpoint,
            gemini_model,
            mock_mode,
            short_window_limit,
            short_window_secs,
            long_window_limit,
            long_window_hours,
            monthly_char_limit,
            cache_capacity,
            ledger_path,
            timeout_ms,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.short_window_limit == 0 || self.long_window_limit == 0 {
            return Err(anyhow::anyhow!("window limits must be greater than 0"));
        }

        if self.short_window_secs == 0 || self.long_window_hours == 0 {
            return Err(anyhow::anyhow!("window durations must be greater than 0"));
        }

        if self.monthly_char_limit == 0 {
            return Err(anyhow::anyhow!("monthly_char_limit must be greater than 0"));
        }

        if self.cache_capacity == 0 {
            return Err(anyhow::anyhow!("cache_capacity must be greater than 0"));
        }

        if !self.mock_mode && self.deepl_api_key.is_none() && self.gemini_api_keys.is_empty() {
            warn!("no provider credentials configured, every request will be rejected");
        }

        Ok(())
    }

    /// Short quota window duration
    pub fn short_window(&self) -> Duration {
        Duration::from_secs(self.short_window_secs)
    }

    /// Long quota window duration
    pub fn long_window(&self) -> Duration {
        Duration::from_secs(self.long_window_hours * 3600)
    }

    /// Provider call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
