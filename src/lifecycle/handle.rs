// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handle returned to a producer adapter on registration.

use serde::Serialize;

use crate::error::Result;
use crate::event::{Event, EventBus, Timestamp};

use super::ProducerStatus;

/// A registered producer.
///
/// The handle is bound to one registration: once the producer
/// disconnects, or its id is registered again, every method fails with
/// [`Error::NotConnected`](crate::Error::NotConnected) or
/// [`Error::UnauthorizedProducer`](crate::Error::UnauthorizedProducer).
/// Dropping the handle does not disconnect the producer; supervision
/// will notice the silence instead.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use signalbus::{EventBus, ProducerConfig};
///
/// let bus = EventBus::new();
/// let hrm = bus
///     .register_producer(ProducerConfig::new("hrm-1").with_type("hr.bpm"))
///     .unwrap();
///
/// hrm.emit("hr.bpm", &json!({"bpm": 62})).unwrap();
/// hrm.touch().unwrap();
/// hrm.disconnect("battery low").unwrap();
///
/// assert!(hrm.touch().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    bus: EventBus,
    producer_id: String,
    generation: u64,
}

impl ProducerHandle {
    pub(crate) fn new(bus: EventBus, producer_id: String, generation: u64) -> Self {
        Self {
            bus,
            producer_id,
            generation,
        }
    }

    /// Returns the producer id.
    #[must_use]
    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    /// Returns the bus the producer is registered on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Returns the producer's current status.
    ///
    /// Reports the status of whatever registration currently holds the id.
    #[must_use]
    pub fn status(&self) -> Option<ProducerStatus> {
        self.bus.producer_status(&self.producer_id)
    }

    /// Emits an event stamped with the bus clock when it is committed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEvent`](crate::Error::InvalidEvent) if `payload`
    ///   does not serialize to a JSON object or `event_type` is malformed
    /// - [`Error::UnauthorizedProducer`](crate::Error::UnauthorizedProducer)
    ///   if the type was not declared or the producer is no longer live
    pub fn emit<T: Serialize + ?Sized>(&self, event_type: &str, payload: &T) -> Result<()> {
        let producer_id = self.producer_id.as_str();
        let event = Event::from_serializable(event_type, producer_id, Timestamp::ZERO, payload)?;
        self.bus.emit_stamped(event)
    }

    /// Records a heartbeat without emitting data.
    ///
    /// A suspected producer recovers and `system.lifecycle.recovered` is
    /// published.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`](crate::Error::NotConnected) if this
    /// registration is no longer live.
    pub fn touch(&self) -> Result<()> {
        self.bus.touch_producer(&self.producer_id, self.generation)
    }

    /// Disconnects the producer.
    ///
    /// The producer is withdrawn from live aggregates; its last payloads
    /// stay readable through
    /// [`EventBus::get_latest`](crate::EventBus::get_latest).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`](crate::Error::NotConnected) if this
    /// registration is no longer live.
    pub fn disconnect(&self, reason: &str) -> Result<()> {
        self.bus
            .disconnect_producer(&self.producer_id, self.generation, reason)
    }
}
