//! Configuration types for parallel-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
///
/// Every field has a sensible default; `Config::default()` yields a working
/// setup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Maximum concurrent downloads (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Inactivity window applied to tasks that set no timeout of their own
    /// (default: None = watchdog disabled for such tasks)
    #[serde(default)]
    pub default_timeout: Option<Duration>,

    /// Capacity of the broadcast event channel (default: 1000)
    ///
    /// Slow subscribers that fall more than this many events behind observe a
    /// `Lagged` error from their receiver.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Capacity of the channel the transport delivers its events into
    /// (default: 256)
    #[serde(default = "default_transport_channel_capacity")]
    pub transport_channel_capacity: usize,

    /// Capacity of the public-API command channel (default: 64)
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,

    /// Extension appended to suffixless names during collision probing
    /// (default: "txt")
    #[serde(default = "default_extension")]
    pub default_extension: String,

    /// File name used when a URL yields nothing usable (default: "download")
    #[serde(default = "default_fallback_file_name")]
    pub fallback_file_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_timeout: None,
            event_channel_capacity: default_event_channel_capacity(),
            transport_channel_capacity: default_transport_channel_capacity(),
            command_channel_capacity: default_command_channel_capacity(),
            default_extension: default_extension(),
            fallback_file_name: default_fallback_file_name(),
        }
    }
}

impl Config {
    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config {
                message: "max_concurrent must be at least 1".to_string(),
                key: Some("max_concurrent".to_string()),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config {
                message: "event_channel_capacity must be at least 1".to_string(),
                key: Some("event_channel_capacity".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_transport_channel_capacity() -> usize {
    256
}

fn default_command_channel_capacity() -> usize {
    64
}

fn default_extension() -> String {
    "txt".to_string()
}

fn default_fallback_file_name() -> String {
    "download".to_string()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.default_extension, "txt");
        assert_eq!(config.fallback_file_name, "download");
        assert!(config.default_timeout.is_none());
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(
            config.max_concurrent, 4,
            "missing fields must fall back to their serde defaults"
        );
        assert_eq!(config.event_channel_capacity, 1000);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config: Config = serde_json::from_str(r#"{"max_concurrent": 2}"#).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(
            config.command_channel_capacity, 64,
            "unnamed fields keep their defaults"
        );
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let config = Config {
            max_concurrent: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, Error::Config { ref key, .. } if key.as_deref() == Some("max_concurrent")),
            "validation must name the offending key, got {err:?}"
        );
    }

    #[test]
    fn zero_event_capacity_fails_validation() {
        let config = Config {
            event_channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
