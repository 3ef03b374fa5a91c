// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Events and the bus that routes them.
//!
//! An [`Event`] is a typed record `{type, producer_id, timestamp, payload}`.
//! Types are dotted names of two or three lowercase slugs
//! (`switch.pressed`, `accel.magnitude`), and the `system` domain is
//! reserved for lifecycle events published by the bus itself.
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use signalbus::event::{Event, EventBus};
//! use signalbus::ProducerConfig;
//!
//! let bus = EventBus::new();
//! bus.register_producer(ProducerConfig::new("accel-a").with_type("accel.magnitude"))
//!     .unwrap();
//!
//! let payload = json!({"value": 2.5}).as_object().cloned().unwrap();
//! bus.emit(Event::new("accel.magnitude", "accel-a", bus.now(), payload))
//!     .unwrap();
//! ```

mod event_bus;
pub mod naming;
mod record;

pub use event_bus::EventBus;
pub use naming::{SYSTEM_PRODUCER_ID, validate_event_type, validate_producer_id};
pub use record::{BusClock, Event, Payload, Timestamp};
