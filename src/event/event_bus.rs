// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event bus tying together dispatch, state and producer lifecycle.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::lifecycle::{
    LifecycleEvent, ProducerConfig, ProducerHandle, ProducerInfo, ProducerRegistry, ProducerStatus,
};
use crate::state::{AggregationContract, StateSnapshot, StateStore};
use crate::subscription::{
    CallbackRegistry, CallbackResult, DispatchQueue, SubscriptionId, TypePattern,
};

use super::naming::{is_reserved_type, validate_event_type, validate_producer_id};
use super::{BusClock, Event, Timestamp};

/// State mutated by `emit`, guarded by one lock.
#[derive(Debug)]
struct Core {
    store: StateStore,
    registry: ProducerRegistry,
}

impl Core {
    /// Applies a lifecycle transition to the store and returns its event.
    fn commit_lifecycle(&mut self, notice: &LifecycleEvent, now: Timestamp) -> Event {
        let event = notice.to_event(now);
        self.store.update(&event);
        event
    }
}

#[derive(Debug)]
struct BusInner {
    core: RwLock<Core>,
    callbacks: CallbackRegistry,
    queue: DispatchQueue,
    clock: BusClock,
    config: BusConfig,
}

/// Central dispatcher for hardware input events.
///
/// On [`emit`](Self::emit) the bus validates the event, checks that the
/// producer is registered and declared the type, folds it into the
/// [`StateStore`] and records a heartbeat, all under a single write lock.
/// Only then are matching subscribers called, in priority/registration
/// order, synchronously on the emitting thread. Every event, lifecycle
/// events included, reaches subscribers in the order it was committed: an
/// emitting thread waits for earlier commits from other threads to be
/// delivered before running its own callbacks. An event emitted from
/// inside a callback is delivered after the callback chain that emitted
/// it, before the outer `emit` returns.
///
/// `EventBus` is a cheap handle: clones share the same state.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use signalbus::{EventBus, ProducerConfig};
///
/// let bus = EventBus::new();
///
/// bus.subscribe("switch.*", |event| {
///     println!("{} -> {:?}", event.producer_id(), event.payload());
///     Ok(())
/// })
/// .unwrap();
///
/// let switch = bus
///     .register_producer(ProducerConfig::new("switch-1").with_type("switch.pressed"))
///     .unwrap();
/// switch
///     .emit("switch.pressed", &json!({"port": 1, "pressed": true}))
///     .unwrap();
///
/// let latest = bus.get_latest("switch.pressed", Some("switch-1")).unwrap();
/// assert_eq!(latest.value, json!({"port": 1, "pressed": true}));
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Creates a bus with the given configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        let core = Core {
            store: StateStore::with_default_sequence_len(config.default_sequence_len),
            registry: ProducerRegistry::new(),
        };
        Self {
            inner: Arc::new(BusInner {
                core: RwLock::new(core),
                callbacks: CallbackRegistry::new(),
                queue: DispatchQueue::new(),
                clock: BusClock::new(),
                config,
            }),
        }
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Returns the current time on the bus clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Subscribes to events whose type matches `pattern`.
    ///
    /// `pattern` is an exact type (`switch.pressed`), a prefix
    /// (`switch.*`, `system.lifecycle.*`) or `*` for every event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the pattern cannot be parsed.
    pub fn subscribe<F>(&self, pattern: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&Event) -> CallbackResult + Send + Sync + 'static,
    {
        self.subscribe_with_priority(pattern, 0, callback)
    }

    /// Subscribes with an explicit priority; higher priorities run first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the pattern cannot be parsed.
    pub fn subscribe_with_priority<F>(
        &self,
        pattern: &str,
        priority: i32,
        callback: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&Event) -> CallbackResult + Send + Sync + 'static,
    {
        let pattern = TypePattern::parse(pattern)?;
        tracing::debug!(%pattern, priority, "Adding subscription");
        Ok(self.inner.callbacks.register(pattern, priority, callback))
    }

    /// Removes a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.callbacks.unsubscribe(id)
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.callbacks.callback_count()
    }

    /// Removes every subscription. Producers and state are untouched.
    pub fn clear_subscriptions(&self) {
        tracing::debug!("Clearing all subscriptions");
        self.inner.callbacks.clear();
    }

    // =========================================================================
    // Producer lifecycle
    // =========================================================================

    /// Registers a producer and publishes `system.lifecycle.connected`.
    ///
    /// If the registration takes over the slot of another producer, that
    /// producer is archived, withdrawn from live aggregates and a
    /// `system.lifecycle.replaced` event is published first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidProducerId`] for a malformed id
    /// - [`Error::InvalidEvent`] for a malformed type
    /// - [`Error::ReservedType`] for a `system.*` type
    /// - [`Error::ProducerConflict`] if the id is live (or is `system`)
    /// - [`Error::AggregationConflict`] if a type is already bound to a
    ///   different contract
    pub fn register_producer(&self, config: ProducerConfig) -> Result<ProducerHandle> {
        validate_producer_id(&config.producer_id)?;
        for event_type in config.supported_types.keys() {
            validate_event_type(event_type)?;
            if is_reserved_type(event_type) {
                return Err(Error::ReservedType(event_type.clone()));
            }
        }

        let producer_id = config.producer_id.clone();
        let policy = config
            .disconnect_policy
            .unwrap_or(self.inner.config.default_disconnect_policy);

        let mut core = self.inner.core.write();
        core.registry.check_available(&producer_id)?;
        check_contracts(&core.store, &config)?;
        for (event_type, contract) in &config.supported_types {
            core.store.bind_contract(event_type, contract.clone())?;
        }

        let now = self.now();
        let registration = core.registry.register(config, policy, now);
        let generation = registration.generation;
        let mut published = Vec::with_capacity(2);

        if let Some(previous) = registration.replaced {
            if previous.was_live {
                core.store.retire_producer(&previous.producer_id);
            }
            let notice = LifecycleEvent::Replaced {
                producer_id: producer_id.clone(),
                previous_producer_id: previous.producer_id,
            };
            published.push(core.commit_lifecycle(&notice, now));
        }

        let notice = LifecycleEvent::Connected {
            producer_id: producer_id.clone(),
        };
        published.push(core.commit_lifecycle(&notice, now));
        core.registry.activate(&producer_id);

        tracing::info!(%producer_id, generation, "Producer connected");
        self.publish(core, published);

        Ok(ProducerHandle::new(self.clone(), producer_id, generation))
    }

    /// Records a heartbeat from a handle.
    pub(crate) fn touch_producer(&self, producer_id: &str, generation: u64) -> Result<()> {
        let mut core = self.inner.core.write();
        let now = self.now();
        let recovered = core
            .registry
            .touch(producer_id, Some(generation), now)?
            .then(|| {
                let notice = LifecycleEvent::Recovered {
                    producer_id: producer_id.to_string(),
                };
                core.commit_lifecycle(&notice, now)
            });

        self.publish(core, recovered.into_iter().collect());
        Ok(())
    }

    /// Disconnects a producer from a handle.
    pub(crate) fn disconnect_producer(
        &self,
        producer_id: &str,
        generation: u64,
        reason: &str,
    ) -> Result<()> {
        let mut core = self.inner.core.write();
        core.registry.disconnect(producer_id, generation)?;
        core.store.retire_producer(producer_id);
        let notice = LifecycleEvent::Disconnected {
            producer_id: producer_id.to_string(),
            reason: reason.to_string(),
        };
        let event = core.commit_lifecycle(&notice, self.now());

        tracing::info!(%producer_id, %reason, "Producer disconnected");
        self.publish(core, vec![event]);
        Ok(())
    }

    /// Advances heartbeat supervision by one tick.
    ///
    /// Every supervised producer that was not touched since the previous
    /// tick misses a beat; producers crossing their threshold become
    /// suspected and a `system.lifecycle.suspected_disconnect` event is
    /// published for each. Returns the number of such events.
    pub fn check_heartbeats(&self) -> usize {
        let mut core = self.inner.core.write();
        let now = self.now();
        let published: Vec<Event> = core
            .registry
            .check_heartbeats()
            .into_iter()
            .map(|(producer_id, missed_heartbeats)| {
                let notice = LifecycleEvent::SuspectedDisconnect {
                    producer_id,
                    missed_heartbeats,
                };
                core.commit_lifecycle(&notice, now)
            })
            .collect();

        let suspected = published.len();
        self.publish(core, published);
        suspected
    }

    /// Spawns a task calling [`check_heartbeats`](Self::check_heartbeats)
    /// every [`BusConfig::supervision_interval`].
    ///
    /// The task holds only a weak reference and stops once every clone of
    /// the bus (and every producer handle) has been dropped. Abort the
    /// returned handle to stop it earlier.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use = "dropping the handle detaches the supervisor; keep it to abort it"]
    pub fn spawn_supervisor(&self) -> JoinHandle<()> {
        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.supervision_interval;

        tokio::spawn(async move {
            tracing::debug!(?period, "Starting heartbeat supervisor");

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                EventBus { inner }.check_heartbeats();
            }

            tracing::debug!("Heartbeat supervisor stopped");
        })
    }

    /// Returns the status of a producer, including replaced ones.
    #[must_use]
    pub fn producer_status(&self, producer_id: &str) -> Option<ProducerStatus> {
        self.inner.core.read().registry.status(producer_id)
    }

    /// Returns every registered producer, sorted by id.
    #[must_use]
    pub fn producers(&self) -> Vec<ProducerInfo> {
        self.inner.core.read().registry.producers()
    }

    /// Returns producers archived by slot replacement, oldest first.
    #[must_use]
    pub fn archived_producers(&self) -> Vec<ProducerInfo> {
        self.inner.core.read().registry.archived().to_vec()
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Publishes an event.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEvent`] if the type or producer id is malformed
    /// - [`Error::UnauthorizedProducer`] if the producer is unknown, no
    ///   longer live, or did not declare the type
    ///
    /// Errors are reported before any state changes. Subscriber failures
    /// are logged and never reported here.
    ///
    /// The event keeps the timestamp it was built with; use
    /// [`ProducerHandle::emit`] to have the bus stamp it at commit time.
    pub fn emit(&self, event: Event) -> Result<()> {
        self.commit(event, false)
    }

    /// Publishes an event stamped with the bus clock at commit time, so
    /// timestamps follow commit order across producer threads.
    pub(crate) fn emit_stamped(&self, event: Event) -> Result<()> {
        self.commit(event, true)
    }

    fn commit(&self, mut event: Event, stamp: bool) -> Result<()> {
        event.validate()?;

        let mut core = self.inner.core.write();
        core.registry
            .authorize(event.producer_id(), event.event_type())?;

        let now = self.now();
        if stamp {
            event.set_timestamp(now);
        }
        core.store.update(&event);

        let recovered = core
            .registry
            .touch(event.producer_id(), None, now)?
            .then(|| {
                let notice = LifecycleEvent::Recovered {
                    producer_id: event.producer_id().to_string(),
                };
                core.commit_lifecycle(&notice, now)
            });

        tracing::trace!(
            event_type = event.event_type(),
            producer_id = event.producer_id(),
            timestamp = %event.timestamp(),
            "Event committed"
        );

        self.publish(core, recovered.into_iter().chain([event]).collect());
        Ok(())
    }

    /// Queues `events` behind everything committed before them, releases
    /// the store lock and delivers them on this thread.
    fn publish(&self, core: RwLockWriteGuard<'_, Core>, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        self.inner.queue.enqueue(events);
        drop(core);

        self.inner.queue.deliver(|event| {
            self.inner.callbacks.dispatch(event);
        });
    }

    // =========================================================================
    // State queries
    // =========================================================================

    /// Returns the latest value for a type.
    ///
    /// With `producer_id`, returns that producer's last snapshot (still
    /// available after it disconnects). Without it, returns the type's
    /// aggregate.
    #[must_use]
    pub fn get_latest(&self, event_type: &str, producer_id: Option<&str>) -> Option<StateSnapshot> {
        self.inner.core.read().store.get_latest(event_type, producer_id)
    }

    /// Returns the latest value deserialized into a typed view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the stored value does not match `T`.
    pub fn get_latest_as<T: DeserializeOwned>(
        &self,
        event_type: &str,
        producer_id: Option<&str>,
    ) -> Result<Option<T>> {
        self.inner
            .core
            .read()
            .store
            .get_latest_as(event_type, producer_id)
    }

    /// Returns the last payload of every live producer of a type.
    #[must_use]
    pub fn get_all(&self, event_type: &str) -> BTreeMap<String, Value> {
        self.inner.core.read().store.get_all(event_type)
    }

    /// Returns every event type that has a bound contract or stored state,
    /// lifecycle topics included, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.inner.core.read().store.event_types()
    }

    /// Returns the aggregation contract bound to a type.
    #[must_use]
    pub fn contract(&self, event_type: &str) -> Option<AggregationContract> {
        self.inner.core.read().store.contract(event_type).cloned()
    }

    /// Clears a type's aggregate; see [`StateStore::reset_aggregate`].
    pub fn reset_aggregate(&self, event_type: &str) -> bool {
        self.inner.core.write().store.reset_aggregate(event_type)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Fails before anything is bound if any declared contract conflicts.
fn check_contracts(store: &StateStore, config: &ProducerConfig) -> Result<()> {
    for (event_type, contract) in &config.supported_types {
        if let Some(existing) = store.contract(event_type)
            && !existing.is_compatible_with(contract)
        {
            return Err(Error::AggregationConflict {
                event_type: event_type.clone(),
                existing: existing.name(),
                requested: contract.name(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::DisconnectPolicy;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn collect(bus: &EventBus, pattern: &str) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(pattern, move |event| {
            sink.lock().push(event.clone());
            Ok(())
        })
        .unwrap();
        seen
    }

    #[test]
    fn new_bus_has_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.producers().is_empty());
    }

    #[test]
    fn clone_shares_state() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        bus1.subscribe("*", |_| Ok(())).unwrap();
        assert_eq!(bus2.subscriber_count(), 1);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let bus = EventBus::new();
        assert!(matches!(
            bus.subscribe("switch", |_| Ok(())),
            Err(Error::InvalidPattern(_))
        ));
    }

    #[test]
    fn registration_publishes_connected() {
        let bus = EventBus::new();
        let seen = collect(&bus, "system.lifecycle.*");

        bus.register_producer(ProducerConfig::new("switch-1").with_type("switch.pressed"))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_type(), "system.lifecycle.connected");
        assert_eq!(seen[0].producer_id(), "system");
        assert_eq!(seen[0].payload().get("producer_id"), Some(&json!("switch-1")));
        assert_eq!(bus.producer_status("switch-1"), Some(ProducerStatus::Available));
    }

    #[test]
    fn registration_validates_input() {
        let bus = EventBus::new();
        assert!(matches!(
            bus.register_producer(ProducerConfig::new("Switch 1")),
            Err(Error::InvalidProducerId(_))
        ));
        assert!(matches!(
            bus.register_producer(ProducerConfig::new("switch-1").with_type("switch")),
            Err(Error::InvalidEvent(_))
        ));
        assert!(matches!(
            bus.register_producer(
                ProducerConfig::new("switch-1").with_type("system.lifecycle.connected")
            ),
            Err(Error::ReservedType(_))
        ));
        assert!(matches!(
            bus.register_producer(ProducerConfig::new("system")),
            Err(Error::ProducerConflict(_))
        ));
    }

    #[test]
    fn conflicting_contract_binds_nothing() {
        let bus = EventBus::new();
        bus.register_producer(
            ProducerConfig::new("accel-a")
                .with_aggregated_type("accel.magnitude", AggregationContract::Sum),
        )
        .unwrap();

        let err = bus
            .register_producer(
                ProducerConfig::new("accel-b")
                    .with_type("accel.raw")
                    .with_type("accel.magnitude"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::AggregationConflict { .. }));
        assert!(bus.contract("accel.raw").is_none());
        assert!(bus.producer_status("accel-b").is_none());
    }

    #[test]
    fn unauthorized_emit_changes_nothing() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        bus.subscribe("accel.*", move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        bus.register_producer(ProducerConfig::new("switch-1").with_type("switch.pressed"))
            .unwrap();

        let event = Event::new(
            "accel.magnitude",
            "switch-1",
            bus.now(),
            json!({"value": 1.0}).as_object().cloned().unwrap(),
        );
        assert!(matches!(
            bus.emit(event),
            Err(Error::UnauthorizedProducer { .. })
        ));
        assert!(bus.get_latest("accel.magnitude", Some("switch-1")).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn system_producer_cannot_be_impersonated() {
        let bus = EventBus::new();
        let event = Event::new(
            "system.lifecycle.connected",
            "system",
            bus.now(),
            json!({"producer_id": "fake"}).as_object().cloned().unwrap(),
        );
        assert!(matches!(
            bus.emit(event),
            Err(Error::UnauthorizedProducer { .. })
        ));
    }

    #[test]
    fn subscriber_sees_committed_state() {
        let bus = EventBus::new();
        let observed = Arc::new(Mutex::new(None));

        let bus_clone = bus.clone();
        let observed_clone = observed.clone();
        bus.subscribe("switch.pressed", move |event| {
            *observed_clone.lock() = bus_clone
                .get_latest(event.event_type(), Some(event.producer_id()))
                .map(|s| s.value);
            Ok(())
        })
        .unwrap();

        let switch = bus
            .register_producer(ProducerConfig::new("switch-1").with_type("switch.pressed"))
            .unwrap();
        switch.emit("switch.pressed", &json!({"pressed": true})).unwrap();

        assert_eq!(*observed.lock(), Some(json!({"pressed": true})));
    }

    #[test]
    fn emit_counts_as_heartbeat() {
        let bus = EventBus::new();
        let hrm = bus
            .register_producer(
                ProducerConfig::new("hrm-1")
                    .with_type("hr.bpm")
                    .with_disconnect_policy(DisconnectPolicy::new().with_max_missed_beats(1)),
            )
            .unwrap();

        hrm.emit("hr.bpm", &json!({"bpm": 61})).unwrap();
        assert_eq!(bus.check_heartbeats(), 0);
        assert_eq!(bus.check_heartbeats(), 1);
        assert_eq!(bus.producer_status("hrm-1"), Some(ProducerStatus::SuspectedDisconnect));

        let lifecycle = collect(&bus, "system.lifecycle.*");
        let data = collect(&bus, "hr.bpm");
        hrm.emit("hr.bpm", &json!({"bpm": 62})).unwrap();

        assert_eq!(bus.producer_status("hrm-1"), Some(ProducerStatus::Available));
        assert_eq!(lifecycle.lock()[0].event_type(), "system.lifecycle.recovered");
        assert_eq!(data.lock().len(), 1);
    }

    #[test]
    fn reset_aggregate_via_bus() {
        let bus = EventBus::new();
        let probe = bus
            .register_producer(
                ProducerConfig::new("probe-1")
                    .with_aggregated_type("probe.temp", AggregationContract::Difference),
            )
            .unwrap();
        probe.emit("probe.temp", &json!({"celsius": 20.0})).unwrap();
        probe.emit("probe.temp", &json!({"celsius": 22.0})).unwrap();
        assert_eq!(
            bus.get_latest("probe.temp", None).unwrap().value,
            json!({"celsius": 2.0})
        );

        assert!(bus.reset_aggregate("probe.temp"));
        assert!(!bus.reset_aggregate("probe.unknown"));
        probe.emit("probe.temp", &json!({"celsius": 25.0})).unwrap();
        assert_eq!(
            bus.get_latest("probe.temp", None).unwrap().value,
            json!({"celsius": 0.0})
        );
    }
}
