//! Session configuration
//!
//! Durations are stored as seconds so configuration files stay readable:
//!
//! ```json
//! { "device_args": "type=b200", "rx_channels": 2, "retry_policy": "strict" }
//! ```

use std::path::Path;
use std::time::Duration;

use rf_hal::MAX_CHANNELS;
use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};
use crate::transfer::DEFAULT_MAX_ATTEMPTS;

/// Default sample rate applied at open, both directions (Hz)
pub const DEFAULT_SAMPLE_RATE: f64 = 1.92e6;

/// Zero padding for unused transmit channels (samples)
pub const DEFAULT_ZERO_PAD_SAMPLES: usize = 64 * 1024;

/// What a blocking call returns when it runs out of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Return the requested sample count as if the transfer had completed
    #[default]
    Legacy,
    /// Return [`StreamError::RetryExhausted`]
    Strict,
}

/// Configuration for a [`StreamSession`](crate::StreamSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Device argument string ("type=b200,serial=...")
    #[serde(default)]
    pub device_args: String,
    /// Receive channels (1..=4)
    #[serde(default = "default_channels")]
    pub rx_channels: usize,
    /// Transmit channels (1..=4)
    #[serde(default = "default_channels")]
    pub tx_channels: usize,
    /// Receive sample rate applied at open (Hz)
    #[serde(default = "default_rate")]
    pub default_rx_rate: f64,
    /// Transmit sample rate applied at open (Hz)
    #[serde(default = "default_rate")]
    pub default_tx_rate: f64,
    /// Timeout for each blocking receive call
    #[serde(default = "default_rx_timeout")]
    pub rx_timeout_secs: f64,
    /// Timeout for each blocking send call
    #[serde(default = "default_tx_timeout")]
    pub tx_timeout_secs: f64,
    /// Fault monitor poll interval, also the upper bound on close latency
    #[serde(default = "default_async_poll")]
    pub async_poll_secs: f64,
    /// Attempt budget for each blocking call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Size of the zero buffer used to pad unused transmit channels
    #[serde(default = "default_zero_pad")]
    pub zero_pad_samples: usize,
    /// Delay between "now" and the start of continuous receive streaming
    #[serde(default = "default_rx_start_delay")]
    pub rx_start_delay_secs: f64,
}

fn default_channels() -> usize {
    1
}

fn default_rate() -> f64 {
    DEFAULT_SAMPLE_RATE
}

fn default_rx_timeout() -> f64 {
    1.0
}

fn default_tx_timeout() -> f64 {
    3.0
}

fn default_async_poll() -> f64 {
    0.5
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_zero_pad() -> usize {
    DEFAULT_ZERO_PAD_SAMPLES
}

fn default_rx_start_delay() -> f64 {
    0.5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_args: String::new(),
            rx_channels: default_channels(),
            tx_channels: default_channels(),
            default_rx_rate: default_rate(),
            default_tx_rate: default_rate(),
            rx_timeout_secs: default_rx_timeout(),
            tx_timeout_secs: default_tx_timeout(),
            async_poll_secs: default_async_poll(),
            max_attempts: default_max_attempts(),
            retry_policy: RetryPolicy::default(),
            zero_pad_samples: default_zero_pad(),
            rx_start_delay_secs: default_rx_start_delay(),
        }
    }
}

impl SessionConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> StreamResult<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> StreamResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON
    pub fn to_json_pretty(&self) -> StreamResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check ranges
    pub fn validate(&self) -> StreamResult<()> {
        for (name, n) in [("rx_channels", self.rx_channels), ("tx_channels", self.tx_channels)] {
            if n == 0 || n > MAX_CHANNELS {
                return Err(StreamError::Config(format!(
                    "{name} must be between 1 and {MAX_CHANNELS}, got {n}"
                )));
            }
        }
        for (name, rate) in [
            ("default_rx_rate", self.default_rx_rate),
            ("default_tx_rate", self.default_tx_rate),
        ] {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(StreamError::Config(format!(
                    "{name} must be positive, got {rate}"
                )));
            }
        }
        if self.max_attempts == 0 {
            return Err(StreamError::Config("max_attempts must be at least 1".into()));
        }
        self.rx_timeout()?;
        self.tx_timeout()?;
        self.rx_start_delay()?;
        if self.async_poll()?.is_zero() {
            return Err(StreamError::Config("async_poll_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn rx_timeout(&self) -> StreamResult<Duration> {
        secs("rx_timeout_secs", self.rx_timeout_secs)
    }

    pub fn tx_timeout(&self) -> StreamResult<Duration> {
        secs("tx_timeout_secs", self.tx_timeout_secs)
    }

    pub fn async_poll(&self) -> StreamResult<Duration> {
        secs("async_poll_secs", self.async_poll_secs)
    }

    pub fn rx_start_delay(&self) -> StreamResult<Duration> {
        secs("rx_start_delay_secs", self.rx_start_delay_secs)
    }
}

fn secs(name: &str, value: f64) -> StreamResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| StreamError::Config(format!("{name} = {value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.rx_channels, 1);
        assert_eq!(config.max_attempts, 100);
        assert_eq!(config.retry_policy, RetryPolicy::Legacy);
        assert_eq!(config.rx_timeout().unwrap(), Duration::from_secs(1));
        assert_eq!(config.tx_timeout().unwrap(), Duration::from_secs(3));
        assert_eq!(config.async_poll().unwrap(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config =
            SessionConfig::from_json_str(r#"{ "rx_channels": 2, "retry_policy": "strict" }"#)
                .unwrap();
        assert_eq!(config.rx_channels, 2);
        assert_eq!(config.retry_policy, RetryPolicy::Strict);
        assert_eq!(config.tx_channels, 1);
        assert_eq!(config.default_tx_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SessionConfig {
            device_args: "type=x300".into(),
            max_attempts: 7,
            ..Default::default()
        };
        let json = config.to_json_pretty().unwrap();
        assert_eq!(SessionConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_channel_count() {
        let config = SessionConfig {
            rx_channels: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StreamError::Config(_))));
    }

    #[test]
    fn test_rejects_negative_timeout() {
        let err = SessionConfig::from_json_str(r#"{ "rx_timeout_secs": -1.0 }"#).unwrap_err();
        assert!(err.to_string().contains("rx_timeout_secs"));
    }

    #[test]
    fn test_rejects_zero_poll() {
        let config = SessionConfig {
            async_poll_secs: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
