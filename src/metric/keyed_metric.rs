// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-key metric windows fed from bus events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::event::{Event, EventBus};
use crate::subscription::SubscriptionId;

use super::{EventWindow, MaxLengthPolicy, RetentionPolicy, WindowStats};

/// Window length used when no retention policy is given.
pub const DEFAULT_WINDOW_LEN: usize = 1024;

/// Function deriving a metric key from an event.
pub type KeyFn = dyn Fn(&Event) -> Option<String> + Send + Sync;

/// Function deriving a sample value from an event.
pub type ValueFn = dyn Fn(&Event) -> Option<f64> + Send + Sync;

/// How events are grouped into windows.
#[derive(Clone, Default)]
pub enum KeyBy {
    /// One window per producer.
    #[default]
    Producer,
    /// One window per event type.
    Type,
    /// One window per key returned by the function; `None` skips the event.
    Custom(Arc<KeyFn>),
}

impl KeyBy {
    /// Groups by a caller-supplied key.
    pub fn custom<F>(key: F) -> Self
    where
        F: Fn(&Event) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(key))
    }

    fn key_of(&self, event: &Event) -> Option<String> {
        match self {
            Self::Producer => Some(event.producer_id().to_string()),
            Self::Type => Some(event.event_type().to_string()),
            Self::Custom(key) => key(event),
        }
    }
}

impl fmt::Debug for KeyBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => f.write_str("Producer"),
            Self::Type => f.write_str("Type"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Where a sample value comes from.
#[derive(Clone)]
enum Extractor {
    Field(String),
    Custom(Arc<ValueFn>),
}

impl Extractor {
    fn value_of(&self, event: &Event) -> Option<f64> {
        match self {
            Self::Field(field) => event.field_f64(field),
            Self::Custom(extract) => extract(event),
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => f.debug_tuple("Field").field(field).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A scalar metric tracked in one [`EventWindow`] per key.
///
/// Clones share the same windows, so a clone can be attached to a bus
/// while the original is read elsewhere.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use signalbus::metric::{KeyBy, KeyedMetric, MaxLengthPolicy};
/// use signalbus::{EventBus, ProducerConfig};
///
/// let bus = EventBus::new();
/// let bpm = KeyedMetric::from_field("bpm")
///     .with_key(KeyBy::Producer)
///     .with_retention(MaxLengthPolicy::new(120));
/// bpm.attach(&bus, "hr.bpm").unwrap();
///
/// let hrm = bus
///     .register_producer(ProducerConfig::new("hrm-1").with_type("hr.bpm"))
///     .unwrap();
/// for value in [60, 62, 64] {
///     hrm.emit("hr.bpm", &json!({"bpm": value})).unwrap();
/// }
///
/// let stats = bpm.stats("hrm-1").unwrap();
/// assert_eq!(stats.count, 3);
/// assert_eq!(stats.max, Some(64.0));
/// ```
#[derive(Debug, Clone)]
pub struct KeyedMetric {
    key_by: KeyBy,
    extractor: Extractor,
    policy: Arc<dyn RetentionPolicy>,
    windows: Arc<RwLock<BTreeMap<String, EventWindow>>>,
}

impl KeyedMetric {
    /// Tracks a numeric payload field.
    #[must_use]
    pub fn from_field(field: impl Into<String>) -> Self {
        Self::with_extractor(Extractor::Field(field.into()))
    }

    /// Tracks the value computed by `extract`; `None` skips the event.
    #[must_use]
    pub fn from_fn<F>(extract: F) -> Self
    where
        F: Fn(&Event) -> Option<f64> + Send + Sync + 'static,
    {
        Self::with_extractor(Extractor::Custom(Arc::new(extract)))
    }

    fn with_extractor(extractor: Extractor) -> Self {
        Self {
            key_by: KeyBy::default(),
            extractor,
            policy: Arc::new(MaxLengthPolicy::new(DEFAULT_WINDOW_LEN)),
            windows: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Sets how events are grouped.
    #[must_use]
    pub fn with_key(mut self, key_by: KeyBy) -> Self {
        self.key_by = key_by;
        self
    }

    /// Sets the retention policy applied to every window.
    #[must_use]
    pub fn with_retention(mut self, policy: impl RetentionPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Records an event.
    ///
    /// Returns `Ok(false)` if no key or no finite value could be derived
    /// from the event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrderSample`](crate::Error::OutOfOrderSample)
    /// if the event is older than the newest sample for its key.
    pub fn observe(&self, event: &Event) -> Result<bool> {
        let Some(key) = self.key_by.key_of(event) else {
            return Ok(false);
        };
        let Some(value) = self.extractor.value_of(event).filter(|v| v.is_finite()) else {
            return Ok(false);
        };

        let mut windows = self.windows.write();
        windows
            .entry(key)
            .or_insert_with(|| EventWindow::with_shared_policy(self.policy.clone()))
            .append(event.timestamp(), value)?;
        Ok(true)
    }

    /// Subscribes the metric to `pattern` on `bus`.
    ///
    /// Out-of-order events are reported as subscriber failures and logged
    /// by the bus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`](crate::Error::InvalidPattern) if
    /// the pattern cannot be parsed.
    pub fn attach(&self, bus: &EventBus, pattern: &str) -> Result<SubscriptionId> {
        let metric = self.clone();
        bus.subscribe(pattern, move |event| {
            metric.observe(event)?;
            Ok(())
        })
    }

    /// Returns statistics for every key.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, WindowStats> {
        self.windows
            .read()
            .iter()
            .map(|(key, window)| (key.clone(), window.stats()))
            .collect()
    }

    /// Returns statistics for one key.
    #[must_use]
    pub fn stats(&self, key: &str) -> Option<WindowStats> {
        self.windows.read().get(key).map(EventWindow::stats)
    }

    /// Returns the `q` quantile (`0.0..=1.0`) for one key.
    #[must_use]
    pub fn percentile(&self, key: &str, q: f64) -> Option<f64> {
        self.windows.read().get(key)?.percentile(q)
    }

    /// Returns the known keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.windows.read().keys().cloned().collect()
    }

    /// Drops every window.
    pub fn clear(&self) {
        self.windows.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::event::Timestamp;
    use serde_json::json;

    fn event(event_type: &str, producer: &str, millis: u64, value: serde_json::Value) -> Event {
        Event::new(
            event_type,
            producer,
            Timestamp::from_millis(millis),
            value.as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn keys_by_producer() {
        let metric = KeyedMetric::from_field("value");
        metric.observe(&event("accel.magnitude", "accel-a", 1, json!({"value": 2.0}))).unwrap();
        metric.observe(&event("accel.magnitude", "accel-b", 1, json!({"value": 3.0}))).unwrap();
        metric.observe(&event("accel.magnitude", "accel-a", 2, json!({"value": 4.0}))).unwrap();

        assert_eq!(metric.keys(), vec!["accel-a", "accel-b"]);
        let snapshot = metric.snapshot();
        assert_eq!(snapshot["accel-a"].count, 2);
        assert_eq!(snapshot["accel-b"].sum, 3.0);
    }

    #[test]
    fn keys_by_type() {
        let metric = KeyedMetric::from_field("value").with_key(KeyBy::Type);
        metric.observe(&event("accel.magnitude", "accel-a", 1, json!({"value": 2.0}))).unwrap();
        metric.observe(&event("accel.magnitude", "accel-b", 2, json!({"value": 3.0}))).unwrap();

        assert_eq!(metric.keys(), vec!["accel.magnitude"]);
        assert_eq!(metric.stats("accel.magnitude").unwrap().sum, 5.0);
    }

    #[test]
    fn custom_key_and_extractor() {
        let metric = KeyedMetric::from_fn(|event| {
            event
                .payload()
                .get("pressed")
                .and_then(serde_json::Value::as_bool)
                .map(|pressed| if pressed { 1.0 } else { 0.0 })
        })
        .with_key(KeyBy::custom(|event| {
            event
                .payload()
                .get("port")
                .and_then(serde_json::Value::as_u64)
                .map(|port| format!("port-{port}"))
        }));

        let pressed = |millis, payload| event("switch.pressed", "switch-1", millis, payload);
        assert!(metric.observe(&pressed(1, json!({"port": 1, "pressed": true}))).unwrap());
        assert!(metric.observe(&pressed(2, json!({"port": 2, "pressed": false}))).unwrap());
        assert!(!metric.observe(&pressed(3, json!({"pressed": true}))).unwrap());

        assert_eq!(metric.stats("port-1").unwrap().sum, 1.0);
        assert_eq!(metric.stats("port-2").unwrap().sum, 0.0);
    }

    #[test]
    fn missing_or_non_numeric_field_is_skipped() {
        let metric = KeyedMetric::from_field("bpm");
        assert!(!metric.observe(&event("hr.bpm", "hrm-1", 1, json!({"rate": 60}))).unwrap());
        assert!(!metric.observe(&event("hr.bpm", "hrm-1", 2, json!({"bpm": "fast"}))).unwrap());
        assert!(metric.snapshot().is_empty());
        assert!(metric.stats("hrm-1").is_none());
        assert!(metric.percentile("hrm-1", 0.5).is_none());
    }

    #[test]
    fn out_of_order_per_key() {
        let metric = KeyedMetric::from_field("bpm");
        metric.observe(&event("hr.bpm", "hrm-1", 10, json!({"bpm": 60}))).unwrap();
        // Other keys have their own ordering
        metric.observe(&event("hr.bpm", "hrm-2", 5, json!({"bpm": 70}))).unwrap();

        let err = metric.observe(&event("hr.bpm", "hrm-1", 5, json!({"bpm": 61}))).unwrap_err();
        assert!(matches!(err, Error::OutOfOrderSample { .. }));
    }

    #[test]
    fn retention_applies_per_window() {
        let metric = KeyedMetric::from_field("bpm").with_retention(MaxLengthPolicy::new(2));
        for ms in 0..5 {
            metric.observe(&event("hr.bpm", "hrm-1", ms, json!({"bpm": 60 + ms}))).unwrap();
        }
        let stats = metric.stats("hrm-1").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, Some(63.0));
        assert_eq!(metric.percentile("hrm-1", 1.0), Some(64.0));
    }

    #[test]
    fn clones_share_windows() {
        let metric = KeyedMetric::from_field("bpm");
        let clone = metric.clone();
        clone.observe(&event("hr.bpm", "hrm-1", 1, json!({"bpm": 60}))).unwrap();
        assert_eq!(metric.keys(), vec!["hrm-1"]);

        metric.clear();
        assert!(clone.keys().is_empty());
    }
}
