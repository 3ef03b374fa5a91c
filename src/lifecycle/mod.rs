// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Producer registration and lifecycle.
//!
//! A producer moves through
//! `Registered -> Available -> SuspectedDisconnect -> Available` while it
//! heartbeats, ends in `Disconnected` when its adapter says so, and in
//! `Replaced` when a new producer takes its physical slot. Each transition
//! is published on the bus as a `system.lifecycle.*` event.
//!
//! Heartbeats are counted in supervisory ticks: a producer that neither
//! emits nor calls [`ProducerHandle::touch`] for
//! [`DisconnectPolicy::max_missed_beats`] consecutive ticks is suspected.
//! Suspected producers keep their state and stay in live aggregates.

mod handle;
mod lifecycle_event;
mod managed_producer;
mod producer_config;
mod registry;

pub use handle::ProducerHandle;
pub use lifecycle_event::{
    CONNECTED, DISCONNECTED, LifecycleEvent, RECOVERED, REPLACED, SUSPECTED_DISCONNECT, TOPICS,
    is_lifecycle_topic,
};
pub use managed_producer::{ProducerInfo, ProducerStatus};
pub use producer_config::{DisconnectPolicy, ProducerConfig};
pub(crate) use registry::ProducerRegistry;
