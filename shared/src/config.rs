/// Client configuration read from the environment.
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://co.wuk.sh/api/json";
pub const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
pub const MIN_CHUNK_SIZE: usize = 8 * 1024;
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_ERROR_BODY_LIMIT: usize = 4096;
pub const DEFAULT_RESPONSE_BODY_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Resolution endpoint that receives the JSON POST.
    pub api_url: String,
    /// Deadline for the resolution round trip.
    pub resolve_timeout: Duration,
    /// Largest piece written to disk at once.
    pub chunk_size: usize,
    /// Bytes of a non-2xx body kept for diagnostics.
    pub error_body_limit: usize,
    /// Bytes of a 2xx resolution body read before giving up on it.
    pub response_body_limit: usize,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            resolve_timeout: Duration::from_secs(DEFAULT_RESOLVE_TIMEOUT_SECS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            error_body_limit: DEFAULT_ERROR_BODY_LIMIT,
            response_body_limit: DEFAULT_RESPONSE_BODY_LIMIT,
            user_agent: format!("cobalt-fetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Read configuration from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_url = lookup("COBALT_API_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.api_url);
        let resolve_timeout = lookup("RESOLVE_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.resolve_timeout);
        let chunk_size = lookup("DOWNLOAD_CHUNK_SIZE")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(defaults.chunk_size);
        let error_body_limit = lookup("ERROR_BODY_LIMIT")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.error_body_limit);
        let response_body_limit = lookup("RESPONSE_BODY_LIMIT")
            .and_then(|s| s.trim().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.response_body_limit);
        let user_agent = lookup("USER_AGENT").unwrap_or(defaults.user_agent);

        Self {
            api_url,
            resolve_timeout,
            chunk_size,
            error_body_limit,
            response_body_limit,
            user_agent,
        }
        .normalized()
    }

    /// Clamp the chunk size into the supported window.
    pub fn normalized(mut self) -> Self {
        self.chunk_size = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
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
    fn test_defaults_when_unset() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.chunk_size, 8192);
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("COBALT_API_URL", "http://localhost:9000/api/json"),
            ("RESOLVE_TIMEOUT_SECS", "5"),
            ("DOWNLOAD_CHUNK_SIZE", "32768"),
            ("ERROR_BODY_LIMIT", "128"),
        ]));
        assert_eq!(config.api_url, "http://localhost:9000/api/json");
        assert_eq!(config.resolve_timeout, Duration::from_secs(5));
        assert_eq!(config.chunk_size, 32768);
        assert_eq!(config.error_body_limit, 128);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("RESOLVE_TIMEOUT_SECS", "soon"),
            ("DOWNLOAD_CHUNK_SIZE", "1"),
            ("ERROR_BODY_LIMIT", "-3"),
        ]));
        assert_eq!(config.resolve_timeout, Duration::from_secs(DEFAULT_RESOLVE_TIMEOUT_SECS));
        assert_eq!(config.chunk_size, MIN_CHUNK_SIZE);
        assert_eq!(config.error_body_limit, DEFAULT_ERROR_BODY_LIMIT);

        let config = ClientConfig::from_lookup(lookup_from(&[("DOWNLOAD_CHUNK_SIZE", "10000000")]));
        assert_eq!(config.chunk_size, MAX_CHUNK_SIZE);
    }
}
