//! Connection settings for the remote query service.
//!
//! # Environment Variables
//!
//! - `OBSQUERY_API_URL`: Base URL of the query API (default: `https://api.coralogix.com`)
//! - `OBSQUERY_API_KEY`: Bearer token attached to every call (optional at startup)
//! - `OBSQUERY_TIMEOUT_SECS`: Per-call HTTP timeout in seconds (default: 30)

use std::time::Duration;

use tracing::warn;

pub const API_URL_ENV: &str = "OBSQUERY_API_URL";
pub const API_KEY_ENV: &str = "OBSQUERY_API_KEY";
pub const TIMEOUT_ENV: &str = "OBSQUERY_TIMEOUT_SECS";

pub const DEFAULT_API_URL: &str = "https://api.coralogix.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings used to construct the shared HTTP client.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// Keeps the key out of debug logs.
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ApiConfig::from_env`] but reads values through `lookup`, so
    /// tests do not have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            config = config.with_base_url(url);
        }

        config.api_key = lookup(API_KEY_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => warn!(
                    value = %raw,
                    default_secs = DEFAULT_TIMEOUT.as_secs(),
                    "ignoring invalid {}", TIMEOUT_ENV
                ),
            }
        }

        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = ApiConfig::from_lookup(|_| None);
        assert_eq!(config, ApiConfig::default());
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn reads_all_values_and_trims_trailing_slash() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            (API_URL_ENV, "https://api.eu2.example.com/"),
            (API_KEY_ENV, " secret "),
            (TIMEOUT_ENV, "5"),
        ]));
        assert_eq!(config.base_url, "https://api.eu2.example.com");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_timeout_falls_back_to_default() {
        let config = ApiConfig::from_lookup(lookup_from(&[(TIMEOUT_ENV, "soon")]));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        let zero = ApiConfig::from_lookup(lookup_from(&[(TIMEOUT_ENV, "0")]));
        assert_eq!(zero.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = ApiConfig::default().with_api_key("top-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
