//! Environment configuration.

use std::env;
use std::time::Duration;

use workbench_api::poller::DEFAULT_SETTLE_DELAY;
use workbench_api::url::DEFAULT_WORKBENCH_BASE_URL;
use workbench_api::{PipelineOptions, WorkbenchApiConfig};

use crate::connection::ChannelConfig;

pub const CHANNEL_URL_ENV: &str = "AGENT_LINK_CHANNEL_URL";
pub const API_URL_ENV: &str = "AGENT_LINK_API_URL";
pub const KEEPALIVE_SECS_ENV: &str = "AGENT_LINK_KEEPALIVE_SECS";
pub const CONNECT_TIMEOUT_SECS_ENV: &str = "AGENT_LINK_CONNECT_TIMEOUT_SECS";
pub const SETTLE_MS_ENV: &str = "AGENT_LINK_SETTLE_MS";
pub const LOG_ENV: &str = "AGENT_LINK_LOG";

pub const DEFAULT_CHANNEL_URL: &str = "ws://127.0.0.1:8000";
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub channel_url: String,
    pub api_url: String,
    pub keepalive_interval: Duration,
    /// `None` waits for the channel indefinitely.
    pub connect_timeout: Option<Duration>,
    pub settle_delay: Duration,
    pub log_filter: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            channel_url: DEFAULT_CHANNEL_URL.to_string(),
            api_url: DEFAULT_WORKBENCH_BASE_URL.to_string(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            settle_delay: DEFAULT_SETTLE_DELAY,
            log_filter: None,
        }
    }
}

impl LinkConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let connect_timeout = match env_u64_opt(CONNECT_TIMEOUT_SECS_ENV) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.connect_timeout,
        };

        Self {
            channel_url: env_string_opt(CHANNEL_URL_ENV).unwrap_or(defaults.channel_url),
            api_url: env_string_opt(API_URL_ENV).unwrap_or(defaults.api_url),
            keepalive_interval: env_u64_opt(KEEPALIVE_SECS_ENV)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.keepalive_interval),
            connect_timeout,
            settle_delay: env_u64_opt(SETTLE_MS_ENV)
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            log_filter: env_string_opt(LOG_ENV),
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            base_url: self.channel_url.clone(),
            keepalive_interval: self.keepalive_interval,
            connect_timeout: self.connect_timeout,
        }
    }

    pub fn api_config(&self) -> WorkbenchApiConfig {
        WorkbenchApiConfig::new(&self.api_url)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions::default().with_settle_delays(self.settle_delay, self.settle_delay)
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_string())
        }
    })
}

fn env_u64_opt(key: &str) -> Option<u64> {
    let value = env_string_opt(key)?;
    match value.parse::<u64>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring non-numeric environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_all() -> Vec<EnvGuard> {
        [
            CHANNEL_URL_ENV,
            API_URL_ENV,
            KEEPALIVE_SECS_ENV,
            CONNECT_TIMEOUT_SECS_ENV,
            SETTLE_MS_ENV,
            LOG_ENV,
        ]
        .into_iter()
        .map(|key| set_env_guard(key, None))
        .collect()
    }

    #[test]
    fn env_defaults_apply_when_unset() {
        let _lock = env_lock();
        let _guards = clear_all();

        let config = LinkConfig::from_env();
        assert_eq!(config, LinkConfig::default());
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.settle_delay, Duration::from_millis(2000));
    }

    #[test]
    fn env_values_override_defaults() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard(CHANNEL_URL_ENV, Some("wss://agents.example.com"));
        let _g2 = set_env_guard(API_URL_ENV, Some("https://agents.example.com/api"));
        let _g3 = set_env_guard(KEEPALIVE_SECS_ENV, Some("5"));
        let _g4 = set_env_guard(CONNECT_TIMEOUT_SECS_ENV, Some("0"));
        let _g5 = set_env_guard(SETTLE_MS_ENV, Some("250"));
        let _g6 = set_env_guard(LOG_ENV, Some("agent_link=debug"));

        let config = LinkConfig::from_env();
        assert_eq!(config.channel_url, "wss://agents.example.com");
        assert_eq!(config.api_url, "https://agents.example.com/api");
        assert_eq!(config.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, None);
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.log_filter.as_deref(), Some("agent_link=debug"));

        let options = config.pipeline_options();
        assert_eq!(options.first_settle_delay, Duration::from_millis(250));
        assert_eq!(options.second_settle_delay, Duration::from_millis(250));
    }

    #[test]
    fn invalid_numbers_and_blank_strings_are_ignored() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard(KEEPALIVE_SECS_ENV, Some("soon"));
        let _g2 = set_env_guard(CHANNEL_URL_ENV, Some("   "));

        let config = LinkConfig::from_env();
        assert_eq!(config.keepalive_interval, DEFAULT_KEEPALIVE_INTERVAL);
        assert_eq!(config.channel_url, DEFAULT_CHANNEL_URL);
    }
}
