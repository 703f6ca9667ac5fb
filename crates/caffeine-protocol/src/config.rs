use serde::{Deserialize, Serialize};

/// Top-level configuration for the broadcast control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaffeineConfig {
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// REST client tuning. `domain` defaults to the value baked in at build
/// time but is always overridden by the `LIBCAFFEINE_DOMAIN` environment
/// variable when present, per the Host API contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bounded attempt count for the retry loop (spec: exactly 3).
    #[serde(default = "default_num_retries")]
    pub num_retries: u32,
    /// Cap on the backoff formula `min(1 + retry_index, max_backoff_secs)`.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Heartbeat tick interval, in milliseconds (spec: 100ms).
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Heartbeat pulse period, in milliseconds (spec: 5000ms).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Consecutive heartbeat failures tolerated before disconnecting.
    #[serde(default = "default_max_heartbeat_failures")]
    pub max_heartbeat_failures: u32,
    /// Long-poll fallback retry interval, in milliseconds, used when the
    /// server hasn't yet supplied a `retry_in`.
    #[serde(default = "default_longpoll_retry_ms")]
    pub longpoll_retry_ms: u64,
    /// Target starting/maximum bitrate for the outgoing video track, in bps.
    #[serde(default = "default_max_bitrate_bps")]
    pub max_bitrate_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_type")]
    pub client_type: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_library_version")]
    pub library_version: String,
    /// Reported to the server in the stage request's `client.headless` field.
    #[serde(default)]
    pub headless: bool,
}

impl Default for CaffeineConfig {
    fn default() -> Self {
        Self {
            rest: RestConfig::default(),
            broadcast: BroadcastConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            request_timeout_secs: default_request_timeout_secs(),
            num_retries: default_num_retries(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_heartbeat_failures: default_max_heartbeat_failures(),
            longpoll_retry_ms: default_longpoll_retry_ms(),
            max_bitrate_bps: default_max_bitrate_bps(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_type: default_client_type(),
            client_version: default_client_version(),
            library_version: default_library_version(),
            headless: false,
        }
    }
}

impl CaffeineConfig {
    /// Resolve the domain, honoring `LIBCAFFEINE_DOMAIN` over the configured
    /// value, matching the original library's environment override.
    pub fn resolved_domain(&self) -> String {
        std::env::var("LIBCAFFEINE_DOMAIN").unwrap_or_else(|_| self.rest.domain.clone())
    }

    /// Collect configuration issues without failing fast. Each issue is
    /// prefixed `ERROR:` or `WARNING:` depending on severity.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.rest.domain.trim().is_empty() {
            issues.push("ERROR: rest.domain must not be empty".to_string());
        }
        if self.rest.request_timeout_secs == 0 {
            issues.push("ERROR: rest.request_timeout_secs must be greater than 0".to_string());
        }
        if self.rest.request_timeout_secs > 120 {
            issues.push(
                "WARNING: rest.request_timeout_secs is unusually high (>120s)".to_string(),
            );
        }
        if self.rest.num_retries != 3 {
            issues.push(format!(
                "WARNING: rest.num_retries is {} but the control plane was validated against 3",
                self.rest.num_retries
            ));
        }
        if self.rest.max_backoff_secs == 0 {
            issues.push("ERROR: rest.max_backoff_secs must be greater than 0".to_string());
        }

        if self.broadcast.check_interval_ms == 0 {
            issues.push("ERROR: broadcast.check_interval_ms must be greater than 0".to_string());
        }
        if self.broadcast.heartbeat_interval_ms < self.broadcast.check_interval_ms {
            issues.push(
                "ERROR: broadcast.heartbeat_interval_ms must be >= check_interval_ms".to_string(),
            );
        }
        if self.broadcast.max_heartbeat_failures == 0 {
            issues.push(
                "WARNING: broadcast.max_heartbeat_failures is 0; the first heartbeat failure disconnects"
                    .to_string(),
            );
        }
        if self.broadcast.max_bitrate_bps == 0 {
            issues.push("ERROR: broadcast.max_bitrate_bps must be greater than 0".to_string());
        }

        if self.client.client_type.trim().is_empty() {
            issues.push("ERROR: client.client_type must not be empty".to_string());
        }
        if self.client.client_version.trim().is_empty() {
            issues.push("ERROR: client.client_version must not be empty".to_string());
        }

        if issues.iter().any(|issue| issue.starts_with("ERROR:")) {
            Err(issues)
        } else if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

fn default_domain() -> String {
    "caffeine.tv".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_num_retries() -> u32 {
    3
}

fn default_max_backoff_secs() -> u64 {
    20
}

fn default_check_interval_ms() -> u64 {
    100
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}

fn default_max_heartbeat_failures() -> u32 {
    5
}

fn default_longpoll_retry_ms() -> u64 {
    5000
}

fn default_max_bitrate_bps() -> u32 {
    2_000_000
}

fn default_client_type() -> String {
    "rust".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_library_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> CaffeineConfig {
        CaffeineConfig::default()
    }

    fn validate_issues(config: &CaffeineConfig) -> Vec<String> {
        match config.validate() {
            Ok(()) => Vec::new(),
            Err(issues) => issues,
        }
    }

    fn has_error(issues: &[String]) -> bool {
        issues.iter().any(|i| i.starts_with("ERROR:"))
    }

    fn has_warning(issues: &[String]) -> bool {
        issues.iter().any(|i| i.starts_with("WARNING:"))
    }

    #[test]
    fn defaults_parse_from_empty_toml() {
        let config: CaffeineConfig = toml::from_str("").unwrap();
        assert_eq!(config.rest.domain, "caffeine.tv");
        assert_eq!(config.rest.request_timeout_secs, 10);
        assert_eq!(config.rest.num_retries, 3);
        assert_eq!(config.rest.max_backoff_secs, 20);
        assert_eq!(config.broadcast.check_interval_ms, 100);
        assert_eq!(config.broadcast.heartbeat_interval_ms, 5000);
        assert_eq!(config.broadcast.max_heartbeat_failures, 5);
        assert_eq!(config.broadcast.max_bitrate_bps, 2_000_000);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_domain_is_an_error() {
        let mut config = valid_config();
        config.rest.domain = "  ".to_string();
        let issues = validate_issues(&config);
        assert!(has_error(&issues));
    }

    #[test]
    fn zero_timeout_is_an_error() {
        let mut config = valid_config();
        config.rest.request_timeout_secs = 0;
        assert!(has_error(&validate_issues(&config)));
    }

    #[test]
    fn high_timeout_is_a_warning_not_an_error() {
        let mut config = valid_config();
        config.rest.request_timeout_secs = 200;
        let issues = validate_issues(&config);
        assert!(has_warning(&issues));
        assert!(!has_error(&issues));
    }

    #[test]
    fn heartbeat_interval_below_check_interval_is_an_error() {
        let mut config = valid_config();
        config.broadcast.heartbeat_interval_ms = 50;
        assert!(has_error(&validate_issues(&config)));
    }

    #[test]
    fn env_override_wins_over_configured_domain() {
        let config = valid_config();
        // SAFETY: test-only process-wide env mutation, no concurrent access
        // to LIBCAFFEINE_DOMAIN elsewhere in this test binary.
        unsafe {
            std::env::set_var("LIBCAFFEINE_DOMAIN", "staging.example.com");
        }
        assert_eq!(config.resolved_domain(), "staging.example.com");
        unsafe {
            std::env::remove_var("LIBCAFFEINE_DOMAIN");
        }
    }

    #[test]
    fn no_env_override_falls_back_to_configured_domain() {
        unsafe {
            std::env::remove_var("LIBCAFFEINE_DOMAIN");
        }
        let config = valid_config();
        assert_eq!(config.resolved_domain(), "caffeine.tv");
    }
}
