// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription system for bus events.
//!
//! Consumers register plain callbacks against a [`TypePattern`] and get a
//! [`SubscriptionId`] back. Callbacks run synchronously on the emitting
//! thread, in priority then registration order.
//!
//! # Overview
//!
//! - [`TypePattern`] - Exact type, `domain.*` prefix, or `*`
//! - [`SubscriptionId`] - A unique identifier for a subscription, used to unsubscribe
//! - [`CallbackRegistry`] - Ordered registry that dispatches events with failure isolation
//!
//! # Usage
//!
//! ```
//! use signalbus::EventBus;
//!
//! let bus = EventBus::new();
//! let sub_id = bus
//!     .subscribe("switch.*", |event| {
//!         println!("{} from {}", event.event_type(), event.producer_id());
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert!(bus.unsubscribe(sub_id));
//! ```

mod callback;
mod dispatch_queue;
mod pattern;

pub use callback::{CallbackError, CallbackRegistry, CallbackResult, SubscriptionId};
pub(crate) use dispatch_queue::DispatchQueue;
pub use pattern::TypePattern;
