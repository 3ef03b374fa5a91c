// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lifecycle::DisconnectPolicy;
use crate::state::DEFAULT_SEQUENCE_LEN;

/// Shortest supervisory interval accepted by the bus.
const MIN_SUPERVISION_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for an [`EventBus`](crate::EventBus).
///
/// Durations are written in milliseconds when serialized.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use signalbus::BusConfig;
/// use signalbus::lifecycle::DisconnectPolicy;
///
/// let config = BusConfig::new()
///     .with_supervision_interval(Duration::from_millis(250))
///     .with_default_sequence_len(16)
///     .with_default_disconnect_policy(DisconnectPolicy::new().with_max_missed_beats(4));
///
/// let parsed = BusConfig::from_json_str(r#"{"supervision_interval_ms": 250}"#).unwrap();
/// assert_eq!(parsed.supervision_interval, Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Period of the heartbeat supervisor.
    #[serde(rename = "supervision_interval_ms", with = "duration_ms")]
    pub supervision_interval: Duration,
    /// Bound for sequence aggregates registered without an explicit length.
    pub default_sequence_len: usize,
    /// Policy for producers registered without one.
    pub default_disconnect_policy: DisconnectPolicy,
}

impl BusConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Sets the supervisory interval (at least 1 ms).
    #[must_use]
    pub fn with_supervision_interval(mut self, interval: Duration) -> Self {
        self.supervision_interval = interval;
        self.normalized()
    }

    /// Sets the default sequence length (at least 1).
    #[must_use]
    pub fn with_default_sequence_len(mut self, len: usize) -> Self {
        self.default_sequence_len = len;
        self.normalized()
    }

    /// Sets the default disconnect policy.
    #[must_use]
    pub fn with_default_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.default_disconnect_policy = policy;
        self
    }

    fn normalized(mut self) -> Self {
        self.supervision_interval = self.supervision_interval.max(MIN_SUPERVISION_INTERVAL);
        self.default_sequence_len = self.default_sequence_len.max(1);
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            supervision_interval: Duration::from_secs(1),
            default_sequence_len: DEFAULT_SEQUENCE_LEN,
            default_disconnect_policy: DisconnectPolicy::default(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BusConfig::default();
        assert_eq!(config.supervision_interval, Duration::from_secs(1));
        assert_eq!(config.default_sequence_len, DEFAULT_SEQUENCE_LEN);
        assert_eq!(config.default_disconnect_policy.max_missed_beats, 3);
    }

    #[test]
    fn builder_clamps_to_minimums() {
        let config = BusConfig::new()
            .with_supervision_interval(Duration::ZERO)
            .with_default_sequence_len(0);
        assert_eq!(config.supervision_interval, Duration::from_millis(1));
        assert_eq!(config.default_sequence_len, 1);
    }

    #[test]
    fn json_round_trip() {
        let config = BusConfig::new()
            .with_supervision_interval(Duration::from_millis(500))
            .with_default_disconnect_policy(DisconnectPolicy::disabled());

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"supervision_interval_ms\":500"));
        assert_eq!(BusConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = BusConfig::from_json_str(
            r#"{"default_disconnect_policy": {"max_missed_beats": 5}, "default_sequence_len": 0}"#,
        )
        .unwrap();
        assert_eq!(config.supervision_interval, Duration::from_secs(1));
        assert_eq!(config.default_sequence_len, 1);
        assert_eq!(config.default_disconnect_policy.max_missed_beats, 5);
        assert!(config.default_disconnect_policy.enabled);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(BusConfig::from_json_str("{\"supervision_interval_ms\": \"soon\"}").is_err());
    }
}
