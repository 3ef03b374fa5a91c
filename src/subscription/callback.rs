// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback management for event subscriptions.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`CallbackRegistry`] - Ordered registry that stores and dispatches callbacks

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::event::Event;

use super::TypePattern;

/// Unique identifier for a subscription.
///
/// Returned by [`EventBus::subscribe`](crate::EventBus::subscribe) and used
/// to unsubscribe later. IDs are unique within a bus's lifetime and grow
/// in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a new subscription ID with the given value.
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

/// Error a subscriber may return to signal it could not handle an event.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by every subscriber callback.
pub type CallbackResult = Result<(), CallbackError>;

/// Type alias for event callbacks.
type EventCallback = Arc<dyn Fn(&Event) -> CallbackResult + Send + Sync>;

/// A registered callback together with its selection rules.
struct Subscriber {
    id: SubscriptionId,
    pattern: TypePattern,
    priority: i32,
    callback: EventCallback,
}

/// Registry of subscriber callbacks, kept in dispatch order.
///
/// Higher priorities run first; equal priorities run in registration
/// order. Dispatch works on a snapshot of the matching subscribers, so a
/// callback may subscribe, unsubscribe or emit without deadlocking.
pub struct CallbackRegistry {
    /// Counter for generating unique subscription IDs.
    next_id: AtomicU64,
    /// Subscribers sorted by descending priority, then ascending ID.
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
}

impl CallbackRegistry {
    /// Creates a new empty callback registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Generates a new unique subscription ID.
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a callback for every event whose type matches `pattern`.
    pub fn register<F>(&self, pattern: TypePattern, priority: i32, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) -> CallbackResult + Send + Sync + 'static,
    {
        let id = self.next_id();
        let subscriber = Arc::new(Subscriber {
            id,
            pattern,
            priority,
            callback: Arc::new(callback),
        });

        let mut subscribers = self.subscribers.write();
        let position = subscribers.partition_point(|s| s.priority >= priority);
        subscribers.insert(position, subscriber);
        id
    }

    /// Unregisters a callback by its subscription ID.
    ///
    /// Returns `true` if a callback was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Clears all callbacks.
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Dispatches an event to every matching callback, in order.
    ///
    /// A callback that returns an error or panics is logged and skipped;
    /// the remaining callbacks still run. Returns the number of callbacks
    /// that handled the event successfully.
    pub fn dispatch(&self, event: &Event) -> usize {
        let matching: Vec<Arc<Subscriber>> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.pattern.matches(event.event_type()))
            .cloned()
            .collect();

        let mut delivered = 0;
        for subscriber in matching {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(event)));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(error)) => {
                    tracing::warn!(
                        subscription = %subscriber.id,
                        pattern = %subscriber.pattern,
                        event_type = event.event_type(),
                        producer_id = event.producer_id(),
                        timestamp = %event.timestamp(),
                        %error,
                        "Subscriber failed to handle event"
                    );
                }
                Err(panic) => {
                    tracing::warn!(
                        subscription = %subscriber.id,
                        pattern = %subscriber.pattern,
                        event_type = event.event_type(),
                        producer_id = event.producer_id(),
                        timestamp = %event.timestamp(),
                        panic = panic_message(panic.as_ref()),
                        "Subscriber panicked while handling event"
                    );
                }
            }
        }
        delivered
    }

    /// Returns the total number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns `true` if there are no registered callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback_count() == 0
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}
