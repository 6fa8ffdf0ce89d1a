use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub login: LoginConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub ws_url: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    /// Zero disables the application-level keepalive.
    pub ping_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Zero disables polling.
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginConfig {
    pub email: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>, // Pre-issued token, e.g. from an OAuth redirect
    pub user_id: Option<String>,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RealtimeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        if self.ping_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.ping_interval_secs))
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        if self.poll_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.poll_interval_secs))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api: ApiConfig {
                base_url: "http://localhost:5000".to_string(),
                timeout_secs: 30,
            },
            realtime: RealtimeConfig {
                ws_url: "http://localhost:5001".to_string(),
                reconnect_attempts: 5,
                reconnect_delay_ms: 5000,
                ping_interval_secs: 30,
            },
            storage: StorageConfig {
                path: PathBuf::from(".tovplay/state.json"),
            },
            sync: SyncConfig {
                poll_interval_secs: 60,
            },
            login: LoginConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        let defaults = Config::default();

        Config {
            api: ApiConfig {
                base_url: env::var("API_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.api.base_url),
                timeout_secs: parse_var("API_TIMEOUT_SECS", defaults.api.timeout_secs),
            },
            realtime: RealtimeConfig {
                ws_url: env::var("WS_URL").unwrap_or(defaults.realtime.ws_url),
                reconnect_attempts: parse_var(
                    "WS_RECONNECT_ATTEMPTS",
                    defaults.realtime.reconnect_attempts,
                ),
                reconnect_delay_ms: parse_var(
                    "WS_RECONNECT_DELAY_MS",
                    defaults.realtime.reconnect_delay_ms,
                ),
                ping_interval_secs: parse_var(
                    "WS_PING_INTERVAL_SECS",
                    defaults.realtime.ping_interval_secs,
                ),
            },
            storage: StorageConfig {
                path: env::var("TOVPLAY_STATE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.path),
            },
            sync: SyncConfig {
                poll_interval_secs: parse_var(
                    "NOTIFICATION_POLL_SECS",
                    defaults.sync.poll_interval_secs,
                ),
            },
            login: LoginConfig {
                email: env::var("TOVPLAY_EMAIL").ok(),
                password: env::var("TOVPLAY_PASSWORD").ok(),
                token: env::var("TOVPLAY_TOKEN").ok(),
                user_id: env::var("TOVPLAY_USER_ID").ok(),
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_client_transport_options() {
        let config = Config::default();
        assert_eq!(config.realtime.reconnect_attempts, 5);
        assert_eq!(config.realtime.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.realtime.ping_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_poll_interval_disables_polling() {
        let sync = SyncConfig { poll_interval_secs: 0 };
        assert!(sync.poll_interval().is_none());

        let sync = SyncConfig { poll_interval_secs: 15 };
        assert_eq!(sync.poll_interval(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn zero_ping_interval_disables_keepalive() {
        let mut realtime = Config::default().realtime;
        realtime.ping_interval_secs = 0;
        assert!(realtime.ping_interval().is_none());
    }
}
