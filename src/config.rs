//! # Session Configuration
//!
//! Timing and sizing knobs for the session and its print jobs. Every field has
//! a default, so an empty or partial TOML file is valid.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! max_job_steps = 12
//! default_job_steps = 3
//! step_interval_ms = 1000
//! settle_delay_ms = 600
//! discovery_timeout_ms = 10000
//! wait_for_ack = true
//! rfcomm_channel = 0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CajeroError;

/// Configuration for one printer session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Steps of a timed filler job at full length
    pub max_job_steps: u32,
    /// Steps selected before the user picks a length
    pub default_job_steps: u32,
    /// Pause between consecutive filler pulses (milliseconds)
    pub step_interval_ms: u64,
    /// Wait after the release disconnect before the session is idle again
    pub settle_delay_ms: u64,
    /// How long a discovery request may stay unanswered
    pub discovery_timeout_ms: u64,
    /// Ask the driver to acknowledge each transmission
    pub wait_for_ack: bool,
    /// `/dev/rfcommN` index used when a new RFCOMM binding is needed
    pub rfcomm_channel: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_job_steps: 12,
            default_job_steps: 3,
            step_interval_ms: 1000,
            settle_delay_ms: 600,
            discovery_timeout_ms: 10_000,
            wait_for_ack: true,
            rfcomm_channel: 0,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CajeroError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| CajeroError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self, CajeroError> {
        toml::from_str(text).map_err(|e| CajeroError::Config(e.to_string()))
    }

    /// Steps for a filler job of the given length fraction.
    ///
    /// `length` is clamped to `[0, 1]` and the product is truncated, so any
    /// length below `1 / max_job_steps` yields zero steps.
    pub fn job_steps(&self, length: f32) -> u32 {
        let length = if length.is_nan() { 0.0 } else { length.clamp(0.0, 1.0) };
        (length * self.max_job_steps as f32) as u32
    }

    /// Length fraction matching `default_job_steps`.
    pub fn default_job_length(&self) -> f32 {
        if self.max_job_steps == 0 {
            return 0.0;
        }
        self.default_job_steps as f32 / self.max_job_steps as f32
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_job_steps, 12);
        assert_eq!(config.settle_delay(), Duration::from_millis(600));
        assert_eq!(config.step_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SessionConfig::from_toml("settle_delay_ms = 250\n").unwrap();
        assert_eq!(config.settle_delay_ms, 250);
        assert_eq!(config.max_job_steps, 12);
        assert!(config.wait_for_ack);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = SessionConfig::from_toml("max_job_steps = \"many\"").unwrap_err();
        assert!(matches!(err, CajeroError::Config(_)));
    }

    #[test]
    fn test_short_lengths_yield_zero_steps() {
        let config = SessionConfig::default();
        for length in [0.0, 0.01, 0.05, 0.08, 1.0 / 12.0 - 0.001] {
            assert_eq!(config.job_steps(length), 0, "length {}", length);
        }
        assert_eq!(config.job_steps(-1.0), 0);
        assert_eq!(config.job_steps(f32::NAN), 0);
    }

    #[test]
    fn test_job_steps_truncate() {
        let config = SessionConfig::default();
        assert_eq!(config.job_steps(0.25), 3);
        assert_eq!(config.job_steps(0.5), 6);
        assert_eq!(config.job_steps(1.0), 12);
        assert_eq!(config.job_steps(7.0), 12);
        assert_eq!(config.default_job_length(), 0.25);
    }
}
