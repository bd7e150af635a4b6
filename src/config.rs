//! Consumer configuration.

use crate::error::{ConsumerError, Result};
use crate::types::{Offset, TransportKind};
use serde::Deserialize;
use std::time::Duration;

/// Consumer configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumerConfig {
    /// Scope sessions and history to a single counterpart.
    pub with_user: Option<String>,

    /// Resume point for the first session.
    /// Default: 0
    pub from_offset: Offset,

    /// Use the long-poll transport instead of the push stream.
    /// Default: false
    pub use_long_poll: bool,

    /// Time between polls when long-polling.
    /// Default: 30s
    pub poll_interval: Duration,

    /// Window each poll request asks the service to cover.
    /// Default: 30
    pub poll_window_seconds: u64,

    /// Messages fetched by `load_history` when the caller passes no limit.
    /// Default: 50
    pub history_limit: usize,

    /// Max buffered events per observer before it is dropped.
    /// Default: 256
    pub observer_buffer_size: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            with_user: None,
            from_offset: Offset::ZERO,
            use_long_poll: false,
            poll_interval: Duration::from_secs(30),
            poll_window_seconds: 30,
            history_limit: 50,
            observer_buffer_size: 256,
        }
    }
}

/// On-disk / JSON form. Durations are whole seconds.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConsumerConfigFile {
    with_user: Option<String>,
    from_offset: Option<u64>,
    use_long_poll: Option<bool>,
    poll_interval: Option<u64>,
    poll_window_seconds: Option<u64>,
    history_limit: Option<usize>,
    observer_buffer_size: Option<usize>,
}

impl ConsumerConfig {
    /// Parse a JSON config, filling unset options with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConsumerConfigFile = serde_json::from_str(json)?;
        let defaults = Self::default();

        let config = Self {
            with_user: file.with_user,
            from_offset: file.from_offset.map(Offset).unwrap_or(defaults.from_offset),
            use_long_poll: file.use_long_poll.unwrap_or(defaults.use_long_poll),
            poll_interval: file
                .poll_interval
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            poll_window_seconds: file
                .poll_window_seconds
                .unwrap_or(defaults.poll_window_seconds),
            history_limit: file.history_limit.unwrap_or(defaults.history_limit),
            observer_buffer_size: file
                .observer_buffer_size
                .unwrap_or(defaults.observer_buffer_size),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ConsumerError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.observer_buffer_size == 0 {
            return Err(ConsumerError::InvalidConfig(
                "observer_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_user(mut self, peer: impl Into<String>) -> Self {
        self.with_user = Some(peer.into());
        self
    }

    pub fn with_from_offset(mut self, offset: Offset) -> Self {
        self.from_offset = offset;
        self
    }

    pub fn with_long_poll(mut self, interval: Duration) -> Self {
        self.use_long_poll = true;
        self.poll_interval = interval;
        self
    }

    pub fn transport(&self) -> TransportKind {
        if self.use_long_poll {
            TransportKind::Pull
        } else {
            TransportKind::Push
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsumerConfig::default();
        assert_eq!(config.from_offset, Offset(0));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.transport(), TransportKind::Push);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ConsumerConfig::from_json(r#"{"withUser": "bob", "useLongPoll": true, "pollInterval": 5}"#)
                .unwrap();
        assert_eq!(config.with_user.as_deref(), Some("bob"));
        assert_eq!(config.transport(), TransportKind::Pull);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.history_limit, 50);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = ConsumerConfig::from_json(r#"{"pollInterval": 0}"#);
        assert!(matches!(result, Err(ConsumerError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = ConsumerConfig::from_json("{not json");
        assert!(matches!(result, Err(ConsumerError::Serialization(_))));
    }
}
