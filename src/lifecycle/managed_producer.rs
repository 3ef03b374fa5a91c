// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Internal producer record for the registry.

use std::fmt;

use crate::event::Timestamp;

use super::producer_config::{DisconnectPolicy, ProducerConfig};

/// Lifecycle status of a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducerStatus {
    /// Registration accepted, connected event not yet published.
    Registered,
    /// Producer is heartbeating normally.
    Available,
    /// Producer missed too many heartbeats; its state is kept.
    SuspectedDisconnect,
    /// Producer disconnected explicitly.
    Disconnected,
    /// Another producer took over the producer's physical slot.
    Replaced,
}

impl ProducerStatus {
    /// Returns `true` while the producer counts towards live aggregates.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Registered | Self::Available | Self::SuspectedDisconnect
        )
    }

    /// Returns `true` if the producer is flagged as suspected.
    #[must_use]
    pub fn is_suspected(self) -> bool {
        matches!(self, Self::SuspectedDisconnect)
    }
}

impl fmt::Display for ProducerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Registered => "registered",
            Self::Available => "available",
            Self::SuspectedDisconnect => "suspected_disconnect",
            Self::Disconnected => "disconnected",
            Self::Replaced => "replaced",
        };
        f.write_str(name)
    }
}

/// Public view of a producer's registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerInfo {
    /// The producer id.
    pub producer_id: String,
    /// Current status.
    pub status: ProducerStatus,
    /// Declared event types, sorted.
    pub supported_types: Vec<String>,
    /// Physical slot, if any.
    pub slot: Option<String>,
    /// Consecutive supervisory ticks without a heartbeat.
    pub missed_heartbeats: u32,
    /// Time of the last heartbeat or emit.
    pub last_seen: Timestamp,
}

/// Internal representation of a producer in the registry.
#[derive(Debug)]
pub(crate) struct ManagedProducer {
    pub config: ProducerConfig,
    pub policy: DisconnectPolicy,
    pub status: ProducerStatus,
    /// Distinguishes successive registrations of the same id.
    pub generation: u64,
    pub missed_heartbeats: u32,
    pub touched_since_check: bool,
    pub last_seen: Timestamp,
}

impl ManagedProducer {
    pub fn new(
        config: ProducerConfig,
        policy: DisconnectPolicy,
        generation: u64,
        now: Timestamp,
    ) -> Self {
        Self {
            config,
            policy,
            status: ProducerStatus::Registered,
            generation,
            missed_heartbeats: 0,
            touched_since_check: false,
            last_seen: now,
        }
    }

    pub fn producer_id(&self) -> &str {
        &self.config.producer_id
    }

    /// Records a heartbeat.
    ///
    /// Returns `true` if this recovered the producer from a suspected
    /// disconnect.
    pub fn touch(&mut self, now: Timestamp) -> bool {
        self.missed_heartbeats = 0;
        self.touched_since_check = true;
        self.last_seen = now;
        if self.status.is_suspected() {
            self.status = ProducerStatus::Available;
            true
        } else {
            false
        }
    }

    /// Advances supervision by one tick.
    ///
    /// Returns `true` exactly when this tick crosses the missed-beat
    /// threshold.
    pub fn supervise(&mut self) -> bool {
        if !self.policy.enabled || !self.status.is_live() {
            return false;
        }
        if std::mem::take(&mut self.touched_since_check) {
            return false;
        }

        self.missed_heartbeats = self.missed_heartbeats.saturating_add(1);
        if self.status == ProducerStatus::Available
            && self.policy.is_exceeded(self.missed_heartbeats)
        {
            self.status = ProducerStatus::SuspectedDisconnect;
            true
        } else {
            false
        }
    }

    pub fn info(&self) -> ProducerInfo {
        ProducerInfo {
            producer_id: self.config.producer_id.clone(),
            status: self.status,
            supported_types: self.config.supported_types.keys().cloned().collect(),
            slot: self.config.slot.clone(),
            missed_heartbeats: self.missed_heartbeats,
            last_seen: self.last_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer(policy: DisconnectPolicy) -> ManagedProducer {
        let mut producer = ManagedProducer::new(
            ProducerConfig::new("hrm-1").with_type("hr.bpm"),
            policy,
            1,
            Timestamp::ZERO,
        );
        producer.status = ProducerStatus::Available;
        producer
    }

    #[test]
    fn status_liveness() {
        assert!(ProducerStatus::Available.is_live());
        assert!(ProducerStatus::SuspectedDisconnect.is_live());
        assert!(!ProducerStatus::Disconnected.is_live());
        assert!(!ProducerStatus::Replaced.is_live());
        assert_eq!(ProducerStatus::SuspectedDisconnect.to_string(), "suspected_disconnect");
    }

    #[test]
    fn crossing_fires_once() {
        let mut p = producer(DisconnectPolicy::new().with_max_missed_beats(3));

        assert!(!p.supervise());
        assert!(!p.supervise());
        assert!(p.supervise());
        assert_eq!(p.status, ProducerStatus::SuspectedDisconnect);

        assert!(!p.supervise());
        assert!(!p.supervise());
        assert_eq!(p.missed_heartbeats, 5);
    }

    #[test]
    fn touch_between_ticks_resets() {
        let mut p = producer(DisconnectPolicy::new().with_max_missed_beats(2));

        assert!(!p.supervise());
        p.touch(Timestamp::from_millis(5));
        assert!(!p.supervise());
        assert_eq!(p.missed_heartbeats, 0);
        assert!(!p.supervise());
        assert!(p.supervise());
    }

    #[test]
    fn touch_recovers_suspected() {
        let mut p = producer(DisconnectPolicy::new().with_max_missed_beats(1));
        assert!(p.supervise());
        assert!(p.touch(Timestamp::from_millis(9)));
        assert_eq!(p.status, ProducerStatus::Available);
        assert!(!p.touch(Timestamp::from_millis(10)));
    }

    #[test]
    fn disabled_policy_never_fires() {
        let mut p = producer(DisconnectPolicy::disabled());
        for _ in 0..10 {
            assert!(!p.supervise());
        }
        assert_eq!(p.status, ProducerStatus::Available);
    }
}
