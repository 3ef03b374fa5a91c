// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Producer registration types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::AggregationContract;

/// Registration for a producer.
///
/// # Examples
///
/// ```
/// use signalbus::lifecycle::{DisconnectPolicy, ProducerConfig};
/// use signalbus::state::AggregationContract;
///
/// // A switch that only reports presses and never heartbeats
/// let switch = ProducerConfig::new("switch-1")
///     .with_type("switch.pressed")
///     .with_disconnect_policy(DisconnectPolicy::disabled());
///
/// // An accelerometer whose readings are summed with its siblings
/// let accel = ProducerConfig::new("accel-a")
///     .with_aggregated_type("accel.magnitude", AggregationContract::Sum)
///     .with_slot("ble:c4:7f:51:00:12:9a");
/// ```
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// The producer id, `[a-z0-9-]+`.
    pub producer_id: String,
    /// Event types the producer may emit, with the contract for each.
    pub supported_types: BTreeMap<String, AggregationContract>,
    /// Physical slot (port, MAC address, ...) the producer occupies.
    pub slot: Option<String>,
    /// Heartbeat policy; `None` uses the bus default.
    pub disconnect_policy: Option<DisconnectPolicy>,
}

impl ProducerConfig {
    /// Creates a registration with no supported types.
    #[must_use]
    pub fn new(producer_id: impl Into<String>) -> Self {
        Self {
            producer_id: producer_id.into(),
            supported_types: BTreeMap::new(),
            slot: None,
            disconnect_policy: None,
        }
    }

    /// Declares a type aggregated with [`AggregationContract::Overwrite`].
    #[must_use]
    pub fn with_type(self, event_type: impl Into<String>) -> Self {
        self.with_aggregated_type(event_type, AggregationContract::Overwrite)
    }

    /// Declares a type with an explicit aggregation contract.
    #[must_use]
    pub fn with_aggregated_type(
        mut self,
        event_type: impl Into<String>,
        contract: AggregationContract,
    ) -> Self {
        self.supported_types.insert(event_type.into(), contract);
        self
    }

    /// Sets the physical slot.
    ///
    /// Registering a different producer id on the same slot later marks
    /// this producer as replaced.
    #[must_use]
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Sets the heartbeat policy.
    #[must_use]
    pub fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = Some(policy);
        self
    }

    /// Returns `true` if the producer declared `event_type`.
    #[must_use]
    pub fn supports(&self, event_type: &str) -> bool {
        self.supported_types.contains_key(event_type)
    }
}

/// Heartbeat supervision settings for a producer.
///
/// A producer misses a beat on every supervisory tick without a `touch` or
/// an emit since the previous tick. Reaching `max_missed_beats` flags it as
/// suspected-disconnected; nothing is purged.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use signalbus::lifecycle::DisconnectPolicy;
///
/// let policy = DisconnectPolicy::new().with_max_missed_beats(5);
/// assert_eq!(policy.timeout(Duration::from_secs(1)), Some(Duration::from_secs(5)));
///
/// assert_eq!(DisconnectPolicy::disabled().timeout(Duration::from_secs(1)), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisconnectPolicy {
    /// Whether the producer is supervised at all.
    pub enabled: bool,
    /// Number of missed beats that flags a suspected disconnect.
    pub max_missed_beats: u32,
}

impl DisconnectPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that never flags the producer.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the missed-beat threshold (at least 1).
    #[must_use]
    pub fn with_max_missed_beats(mut self, beats: u32) -> Self {
        self.max_missed_beats = beats.max(1);
        self
    }

    /// Returns how long a silent producer survives before it is suspected,
    /// given the supervisory interval.
    #[must_use]
    pub fn timeout(&self, supervision_interval: Duration) -> Option<Duration> {
        self.enabled
            .then(|| supervision_interval.saturating_mul(self.max_missed_beats))
    }

    /// Returns `true` if `missed` beats crosses the threshold.
    #[must_use]
    pub fn is_exceeded(&self, missed: u32) -> bool {
        self.enabled && missed >= self.max_missed_beats
    }
}

impl Default for DisconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_missed_beats: 3,
        }
    }
}
