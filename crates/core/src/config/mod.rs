//! Client configuration loaded from environment

use std::time::Duration;
use thiserror::Error;

/// How a channel spaces out its reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base × attempt`
    Linear,
    /// `base × 2^(attempt-1)`, capped at `max_delay`
    Exponential { max_delay: Duration },
}

/// Reconnect policy for one WebSocket channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries allowed after the initial attempt before giving up
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl ReconnectPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Exponential { max_delay },
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential { max_delay } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor).min(max_delay)
            }
        }
    }
}

/// Default chat policy: linear, 3s steps, 5 retries
pub fn default_chat_policy() -> ReconnectPolicy {
    ReconnectPolicy::linear(5, Duration::from_millis(3000))
}

/// Default notification policy: exponential from 1s, capped at 30s, 5 retries
pub fn default_notification_policy() -> ReconnectPolicy {
    ReconnectPolicy::exponential(5, Duration::from_millis(1000), Duration::from_secs(30))
}

/// Client configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP origin of the backend (e.g. `https://social.example.com`)
    pub base_url: String,
    /// Bearer token for authenticated requests, if any
    pub token: Option<String>,
    pub chat_policy: ReconnectPolicy,
    pub notification_policy: ReconnectPolicy,
    /// Interval of the REST polling fallback
    pub poll_interval: Duration,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
}

impl ClientConfig {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("SOCIALINK_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "SOCIALINK_BASE_URL",
                value: base_url,
            });
        }

        let token = lookup("SOCIALINK_TOKEN").filter(|t| !t.trim().is_empty());

        let chat_default = default_chat_policy();
        let chat_policy = ReconnectPolicy {
            max_attempts: parse_or(&lookup, "SOCIALINK_CHAT_MAX_RETRIES", chat_default.max_attempts)?,
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "SOCIALINK_CHAT_RETRY_BASE_MS",
                chat_default.base_delay.as_millis() as u64,
            )?),
            backoff: chat_default.backoff,
        };

        let notif_default = default_notification_policy();
        let notification_policy = ReconnectPolicy {
            max_attempts: parse_or(&lookup, "SOCIALINK_NOTIF_MAX_RETRIES", notif_default.max_attempts)?,
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "SOCIALINK_NOTIF_RETRY_BASE_MS",
                notif_default.base_delay.as_millis() as u64,
            )?),
            backoff: notif_default.backoff,
        };

        let poll_interval =
            Duration::from_secs(parse_or(&lookup, "SOCIALINK_POLL_INTERVAL_SECS", 30u64)?.max(1));
        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            base_url,
            token,
            chat_policy,
            notification_policy,
            poll_interval,
            log_level,
        })
    }

    /// WebSocket origin derived from the HTTP origin
    pub fn ws_base_url(&self) -> String {
        to_ws_origin(&self.base_url)
    }
}

/// Map an `http(s)://` origin onto `ws(s)://`
pub fn to_ws_origin(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
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
    fn test_defaults() {
        let cfg = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8080");
        assert_eq!(cfg.ws_base_url(), "ws://localhost:8080");
        assert_eq!(cfg.chat_policy, default_chat_policy());
        assert_eq!(cfg.notification_policy, default_notification_policy());
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert!(cfg.token.is_none());
    }

    #[test]
    fn test_overrides_and_wss() {
        let cfg = ClientConfig::from_lookup(lookup_from(&[
            ("SOCIALINK_BASE_URL", "https://social.example.com/"),
            ("SOCIALINK_TOKEN", "abc"),
            ("SOCIALINK_CHAT_MAX_RETRIES", "2"),
            ("SOCIALINK_NOTIF_RETRY_BASE_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.ws_base_url(), "wss://social.example.com");
        assert_eq!(cfg.token.as_deref(), Some("abc"));
        assert_eq!(cfg.chat_policy.max_attempts, 2);
        assert_eq!(cfg.notification_policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = ClientConfig::from_lookup(lookup_from(&[("SOCIALINK_CHAT_MAX_RETRIES", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("SOCIALINK_CHAT_MAX_RETRIES"));
    }

    #[test]
    fn test_linear_delays() {
        let policy = ReconnectPolicy::linear(5, Duration::from_millis(3000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(9000));
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = ReconnectPolicy::exponential(
            10,
            Duration::from_millis(1000),
            Duration::from_secs(30),
        );
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }
}
