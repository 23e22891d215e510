//! Configuration loading and typed config structures for Tandem.
//!
//! Configuration lives in `tandem-config.yaml`. Every field has a default
//! so an empty file (or no file at all) yields a working setup.
//!
//! ```yaml
//! presence:
//!   typing_window_ms: 3000
//!   nudge_window_ms: 3000
//! heartbeat:
//!   ping_interval_ms: 5000
//! resonance:
//!   mood_step: 10
//!   latency_free_ms: 200
//! relay:
//!   host: 0.0.0.0
//!   port: 8090
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::resonance::{MAX_SCORE, ResonancePolicy};

/// Largest distance between two mood levels.
const MAX_MOOD_DISTANCE: u16 = 4;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TandemConfig {
    /// Expiry windows of the presence flags.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Latency heartbeat settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Resonance scoring constants.
    #[serde(default)]
    pub resonance: ResonancePolicy,

    /// Relay server settings.
    #[serde(default)]
    pub relay: RelayConfig,
}

impl TandemConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override the relay address:
    /// - `TANDEM_RELAY_HOST` overrides `relay.host`
    /// - `TANDEM_RELAY_PORT` overrides `relay.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.relay.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make timers or scoring degenerate.
    ///
    /// A resonance base above 100 is refused, and neither penalty may be
    /// able to reach the base on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let resonance = &self.resonance;
        let max_mood_penalty = u16::from(resonance.mood_step).saturating_mul(MAX_MOOD_DISTANCE);
        let checks = [
            (self.presence.typing_window_ms == 0, "presence.typing_window_ms must be > 0"),
            (self.presence.nudge_window_ms == 0, "presence.nudge_window_ms must be > 0"),
            (self.heartbeat.ping_interval_ms == 0, "heartbeat.ping_interval_ms must be > 0"),
            (
                self.resonance.latency_ms_per_point == 0,
                "resonance.latency_ms_per_point must be > 0",
            ),
            (self.relay.room_capacity == 0, "relay.room_capacity must be > 0"),
            (resonance.base > MAX_SCORE, "resonance.base must be <= 100"),
            (
                max_mood_penalty >= u16::from(resonance.base),
                "resonance.mood_step * 4 must be < resonance.base",
            ),
            (
                resonance.latency_penalty_cap >= resonance.base,
                "resonance.latency_penalty_cap must be < resonance.base",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(ConfigError::Invalid {
                reason: (*reason).to_owned(),
            }),
            None => Ok(()),
        }
    }
}

/// Expiry windows for the presence flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PresenceConfig {
    /// Silence after which a remote typing indicator drops.
    #[serde(default = "default_window_ms")]
    pub typing_window_ms: u64,

    /// How long a received nudge stays pending.
    #[serde(default = "default_window_ms")]
    pub nudge_window_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            typing_window_ms: default_window_ms(),
            nudge_window_ms: default_window_ms(),
        }
    }
}

/// Latency heartbeat configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HeartbeatConfig {
    /// Milliseconds between `ping` messages.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
}

impl HeartbeatConfig {
    /// The ping interval as a [`Duration`].
    pub const fn ping_interval(self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
        }
    }
}

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayConfig {
    /// Address to bind.
    #[serde(default = "default_relay_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_relay_port")]
    pub port: u16,

    /// Per-room broadcast buffer; slow connections skip ahead past this.
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

impl RelayConfig {
    /// Apply `TANDEM_RELAY_HOST` / `TANDEM_RELAY_PORT` if set.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("TANDEM_RELAY_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("TANDEM_RELAY_PORT") {
            self.port = port.parse().map_err(|e| ConfigError::Invalid {
                reason: format!("invalid TANDEM_RELAY_PORT {port:?}: {e}"),
            })?;
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_relay_port(),
            room_capacity: default_room_capacity(),
        }
    }
}

const fn default_window_ms() -> u64 {
    3_000
}

const fn default_ping_interval_ms() -> u64 {
    5_000
}

fn default_relay_host() -> String {
    String::from("0.0.0.0")
}

const fn default_relay_port() -> u16 {
    8090
}

const fn default_room_capacity() -> usize {
    256
}
