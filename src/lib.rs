// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `signalbus` - An in-process event bus for hardware input.
//!
//! Hardware adapters (switches, accelerometers, heart-rate monitors,
//! probes...) register as producers and emit typed events. The bus keeps
//! the latest state of every producer, combines producers of the same
//! type into an aggregate, watches their heartbeats, and notifies
//! subscribers synchronously and in order.
//!
//! # Supported Features
//!
//! - **Dispatch**: exact, `domain.*` and `*` subscriptions with priorities
//! - **State**: last payload per `(producer, type)` plus one aggregate per type
//! - **Aggregation**: overwrite, sum, difference, bounded sequence, custom folds
//! - **Lifecycle**: heartbeat supervision, recovery, disconnect, slot replacement
//! - **Metrics**: rolling windows per producer, type or custom key
//!
//! # Quick Start
//!
//! ```
//! use serde_json::json;
//! use signalbus::{AggregationContract, EventBus, ProducerConfig};
//!
//! # fn main() -> signalbus::Result<()> {
//! let bus = EventBus::new();
//!
//! bus.subscribe("accel.*", |event| {
//!     println!("{} reported {:?}", event.producer_id(), event.payload());
//!     Ok(())
//! })?;
//!
//! let mut handles = Vec::new();
//! for id in ["accel-a", "accel-b"] {
//!     let config = ProducerConfig::new(id)
//!         .with_aggregated_type("accel.magnitude", AggregationContract::Sum);
//!     handles.push(bus.register_producer(config)?);
//! }
//!
//! handles[0].emit("accel.magnitude", &json!({"value": 2.0}))?;
//! handles[1].emit("accel.magnitude", &json!({"value": 3.0}))?;
//!
//! let total = bus.get_latest("accel.magnitude", None).unwrap();
//! assert_eq!(total.value, json!({"value": 5.0}));
//! # Ok(())
//! # }
//! ```
//!
//! ## Heartbeat Supervision
//!
//! ```no_run
//! use std::time::Duration;
//! use signalbus::{BusConfig, EventBus, ProducerConfig};
//!
//! #[tokio::main]
//! async fn main() -> signalbus::Result<()> {
//!     let bus = EventBus::with_config(
//!         BusConfig::new().with_supervision_interval(Duration::from_millis(500)),
//!     );
//!     let _supervisor = bus.spawn_supervisor();
//!
//!     bus.subscribe("system.lifecycle.*", |event| {
//!         println!("{}: {:?}", event.event_type(), event.payload());
//!         Ok(())
//!     })?;
//!
//!     let hrm = bus.register_producer(ProducerConfig::new("hrm-1").with_type("hr.bpm"))?;
//!     loop {
//!         tokio::time::sleep(Duration::from_millis(400)).await;
//!         hrm.touch()?;
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod metric;
pub mod state;
pub mod subscription;

pub use config::BusConfig;
pub use error::{Error, Result};
pub use event::{Event, EventBus, Payload, Timestamp};
pub use lifecycle::{
    DisconnectPolicy, LifecycleEvent, ProducerConfig, ProducerHandle, ProducerInfo, ProducerStatus,
};
pub use metric::{
    CompositePolicy, EventWindow, KeyBy, KeyedMetric, MaxAgePolicy, MaxLengthPolicy,
    RetentionPolicy, WindowStats,
};
pub use state::{AggregationContract, CustomAggregator, StateSnapshot, StateStore};
pub use subscription::{CallbackResult, SubscriptionId, TypePattern};
