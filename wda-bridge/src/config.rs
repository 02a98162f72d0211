//! Bridge configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Command-line flags (applied by the unit binary)
//! 2. Values from a TOML file
//! 3. Environment variables (`WDA_HOST`, `WDA_PORT`, ...)
//! 4. Built-in defaults

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_WDA_HOST: &str = "127.0.0.1";
const DEFAULT_WDA_PORT: u16 = 8100;
/// WDA MJPEG server port.
const DEFAULT_CONNECT_PORT: u16 = 9100;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1000;
const DEFAULT_LOG_COMMAND: &str = "ios syslog";

const ENV_SERIAL: &str = "WDA_DEVICE_SERIAL";
const ENV_WDA_HOST: &str = "WDA_HOST";
const ENV_WDA_PORT: &str = "WDA_PORT";
const ENV_CONNECT_PORT: &str = "WDA_CONNECT_PORT";
const ENV_REQUEST_TIMEOUT_SECS: &str = "WDA_REQUEST_TIMEOUT_SECS";
const ENV_RECONNECT_DELAY_MS: &str = "WDA_RECONNECT_DELAY_MS";
const ENV_RECONNECT_MAX_ATTEMPTS: &str = "WDA_RECONNECT_MAX_ATTEMPTS";
const ENV_LOG_COMMAND: &str = "WDA_LOG_COMMAND";

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Liveness watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Fixed delay before each reconnect attempt, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Reconnect attempts allowed before escalating.
    pub max_attempts: u32,
    /// Upper bound on draining the socket after a graceful disconnect.
    pub drain_timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: env_parse(ENV_RECONNECT_DELAY_MS)
                .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            max_attempts: env_parse(ENV_RECONNECT_MAX_ATTEMPTS)
                .unwrap_or(DEFAULT_RECONNECT_MAX_ATTEMPTS),
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl WatchdogConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Device log capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCaptureConfig {
    /// Log tailing command; split with shell-word rules, never run through a shell.
    pub command: String,
}

impl Default for LogCaptureConfig {
    fn default() -> Self {
        Self {
            command: env::var(ENV_LOG_COMMAND).unwrap_or_else(|_| DEFAULT_LOG_COMMAND.to_string()),
        }
    }
}

/// Top-level bridge configuration for one device unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Device serial (UDID).
    pub serial: String,
    /// Host running WebDriverAgent and its MJPEG server.
    pub wda_host: String,
    /// WebDriverAgent HTTP port.
    pub wda_port: u16,
    /// MJPEG streaming port watched for liveness.
    pub connect_port: u16,
    /// Per-request HTTP timeout, in seconds.
    pub request_timeout_secs: u64,
    pub watchdog: WatchdogConfig,
    pub log_capture: LogCaptureConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: env::var(ENV_SERIAL).unwrap_or_default(),
            wda_host: env::var(ENV_WDA_HOST).unwrap_or_else(|_| DEFAULT_WDA_HOST.to_string()),
            wda_port: env_parse(ENV_WDA_PORT).unwrap_or(DEFAULT_WDA_PORT),
            connect_port: env_parse(ENV_CONNECT_PORT).unwrap_or(DEFAULT_CONNECT_PORT),
            request_timeout_secs: env_parse(ENV_REQUEST_TIMEOUT_SECS)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            watchdog: WatchdogConfig::default(),
            log_capture: LogCaptureConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Base URL of the WebDriverAgent HTTP server.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.wda_host, self.wda_port)
    }

    /// `host:port` of the MJPEG streaming channel.
    pub fn stream_addr(&self) -> String {
        format!("{}:{}", self.wda_host, self.connect_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_and_stream_addr_use_host() {
        let config = BridgeConfig {
            wda_host: "10.0.0.7".into(),
            wda_port: 8100,
            connect_port: 9100,
            ..BridgeConfig::default()
        };
        assert_eq!(config.base_url(), "http://10.0.0.7:8100");
        assert_eq!(config.stream_addr(), "10.0.0.7:9100");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "serial": "00008030-0011",
            "watchdog": { "max_attempts": 2 }
        }))
        .unwrap();
        assert_eq!(config.serial, "00008030-0011");
        assert_eq!(config.watchdog.max_attempts, 2);
        assert_eq!(config.watchdog.drain_timeout_ms, DEFAULT_DRAIN_TIMEOUT_MS);
    }
}
