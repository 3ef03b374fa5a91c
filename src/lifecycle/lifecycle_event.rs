// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic lifecycle events published by the bus.

use serde_json::{Value, json};

use crate::event::{Event, Payload, SYSTEM_PRODUCER_ID, Timestamp};

/// Type of the event published when a producer registers.
pub const CONNECTED: &str = "system.lifecycle.connected";
/// Type of the event published when a producer misses too many heartbeats.
pub const SUSPECTED_DISCONNECT: &str = "system.lifecycle.suspected_disconnect";
/// Type of the event published when a suspected producer touches again.
pub const RECOVERED: &str = "system.lifecycle.recovered";
/// Type of the event published on explicit disconnect.
pub const DISCONNECTED: &str = "system.lifecycle.disconnected";
/// Type of the event published when a slot is taken over by a new producer.
pub const REPLACED: &str = "system.lifecycle.replaced";

/// Every reserved lifecycle topic.
///
/// These are exempt from the slug rule (`suspected_disconnect`), so they
/// are accepted as exact subscription patterns but can never be declared
/// by a producer.
pub const TOPICS: [&str; 5] = [
    CONNECTED,
    SUSPECTED_DISCONNECT,
    RECOVERED,
    DISCONNECTED,
    REPLACED,
];

/// Returns `true` if `event_type` is a reserved lifecycle topic.
#[must_use]
pub fn is_lifecycle_topic(event_type: &str) -> bool {
    TOPICS.contains(&event_type)
}

/// A producer lifecycle transition.
///
/// These travel on the bus as ordinary events emitted by the reserved
/// `system` producer. [`LifecycleEvent::from_event`] turns them back into
/// a typed value on the consumer side.
///
/// # Examples
///
/// ```
/// use signalbus::event::Timestamp;
/// use signalbus::lifecycle::LifecycleEvent;
///
/// let notice = LifecycleEvent::Disconnected {
///     producer_id: "hrm-1".to_string(),
///     reason: "shutdown".to_string(),
/// };
/// let event = notice.to_event(Timestamp::ZERO);
/// assert_eq!(event.event_type(), "system.lifecycle.disconnected");
/// assert_eq!(LifecycleEvent::from_event(&event), Some(notice));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The producer registered and is available.
    Connected {
        /// The producer.
        producer_id: String,
    },
    /// The producer stopped heartbeating.
    SuspectedDisconnect {
        /// The producer.
        producer_id: String,
        /// Consecutive supervisory ticks without a heartbeat.
        missed_heartbeats: u32,
    },
    /// A suspected producer heartbeated again.
    Recovered {
        /// The producer.
        producer_id: String,
    },
    /// The producer disconnected explicitly.
    Disconnected {
        /// The producer.
        producer_id: String,
        /// Reason given by the adapter.
        reason: String,
    },
    /// A new producer took over the physical slot of an older one.
    Replaced {
        /// The new producer.
        producer_id: String,
        /// The archived producer.
        previous_producer_id: String,
    },
}

impl LifecycleEvent {
    /// Returns the reserved event type for this transition.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => CONNECTED,
            Self::SuspectedDisconnect { .. } => SUSPECTED_DISCONNECT,
            Self::Recovered { .. } => RECOVERED,
            Self::Disconnected { .. } => DISCONNECTED,
            Self::Replaced { .. } => REPLACED,
        }
    }

    /// Returns the producer the transition is about.
    #[must_use]
    pub fn producer_id(&self) -> &str {
        match self {
            Self::Connected { producer_id }
            | Self::SuspectedDisconnect { producer_id, .. }
            | Self::Recovered { producer_id }
            | Self::Disconnected { producer_id, .. }
            | Self::Replaced { producer_id, .. } => producer_id,
        }
    }

    /// Builds the event payload.
    #[must_use]
    pub fn payload(&self) -> Payload {
        let value = match self {
            Self::Connected { producer_id } | Self::Recovered { producer_id } => {
                json!({ "producer_id": producer_id })
            }
            Self::SuspectedDisconnect {
                producer_id,
                missed_heartbeats,
            } => json!({
                "producer_id": producer_id,
                "missed_heartbeats": missed_heartbeats,
            }),
            Self::Disconnected {
                producer_id,
                reason,
            } => json!({ "producer_id": producer_id, "reason": reason }),
            Self::Replaced {
                producer_id,
                previous_producer_id,
            } => json!({
                "producer_id": producer_id,
                "previous_producer_id": previous_producer_id,
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    /// Wraps the transition in a bus event stamped with `timestamp`.
    #[must_use]
    pub fn to_event(&self, timestamp: Timestamp) -> Event {
        Event::new(self.event_type(), SYSTEM_PRODUCER_ID, timestamp, self.payload())
    }

    /// Parses a lifecycle event received from the bus.
    ///
    /// Returns `None` for events that are not lifecycle transitions.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.producer_id() != SYSTEM_PRODUCER_ID {
            return None;
        }
        let text = |key: &str| {
            event
                .payload()
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let producer_id = text("producer_id")?;

        match event.event_type() {
            CONNECTED => Some(Self::Connected { producer_id }),
            RECOVERED => Some(Self::Recovered { producer_id }),
            SUSPECTED_DISCONNECT => {
                let missed = event.payload().get("missed_heartbeats")?.as_u64()?;
                Some(Self::SuspectedDisconnect {
                    producer_id,
                    missed_heartbeats: u32::try_from(missed).ok()?,
                })
            }
            DISCONNECTED => Some(Self::Disconnected {
                producer_id,
                reason: text("reason")?,
            }),
            REPLACED => Some(Self::Replaced {
                producer_id,
                previous_producer_id: text("previous_producer_id")?,
            }),
            _ => None,
        }
    }
}
