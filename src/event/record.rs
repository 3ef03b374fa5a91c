// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The event record and its timestamp.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::naming::{validate_event_type, validate_producer_id};

/// Schema-less structured payload carried by every event.
pub type Payload = serde_json::Map<String, Value>;

/// Monotonic timestamp, in nanoseconds since the bus clock epoch.
///
/// Serializes as a plain number so events keep their wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The clock epoch.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a timestamp from a duration since the epoch.
    #[must_use]
    pub fn from_duration(elapsed: Duration) -> Self {
        Self(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Returns the raw nanosecond value.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time since the epoch.
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Returns the time elapsed between `earlier` and `self`, or zero.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_duration().as_secs_f64())
    }
}

/// Monotonic clock shared by a bus and its producers.
#[derive(Debug, Clone, Copy)]
pub struct BusClock {
    epoch: Instant,
}

impl BusClock {
    /// Starts a clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Returns the current monotonic timestamp.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.epoch.elapsed())
    }
}

impl Default for BusClock {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable input event.
///
/// Wire shape:
/// `{"type": "...", "producer_id": "...", "timestamp": 123, "payload": {...}}`
/// with an optional RFC 3339 `wall_clock` field for display.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use signalbus::event::{Event, Timestamp};
///
/// let event = Event::new(
///     "switch.pressed",
///     "switch-1",
///     Timestamp::from_millis(10),
///     json!({"port": 1, "pressed": true}).as_object().cloned().unwrap(),
/// );
/// assert_eq!(event.event_type(), "switch.pressed");
/// assert!(event.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    event_type: String,
    producer_id: String,
    timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wall_clock: Option<DateTime<Utc>>,
    payload: Payload,
}

impl Event {
    /// Creates an event. Naming rules are checked later by
    /// [`validate`](Self::validate) or at emit time.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        producer_id: impl Into<String>,
        timestamp: Timestamp,
        payload: Payload,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            producer_id: producer_id.into(),
            timestamp,
            wall_clock: None,
            payload,
        }
    }

    /// Creates an event from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] if `payload` fails to serialize or
    /// does not serialize to a JSON object.
    pub fn from_serializable<T: Serialize + ?Sized>(
        event_type: impl Into<String>,
        producer_id: impl Into<String>,
        timestamp: Timestamp,
        payload: &T,
    ) -> Result<Self> {
        let value = serde_json::to_value(payload)
            .map_err(|e| Error::InvalidEvent(format!("payload is not serializable: {e}")))?;
        match value {
            Value::Object(map) => Ok(Self::new(event_type, producer_id, timestamp, map)),
            other => Err(Error::InvalidEvent(format!(
                "payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Attaches a wall-clock time for display purposes.
    #[must_use]
    pub fn with_wall_clock(mut self, wall_clock: DateTime<Utc>) -> Self {
        self.wall_clock = Some(wall_clock);
        self
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Returns the event type.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the producer id.
    #[must_use]
    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    /// Returns the monotonic timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the wall-clock time, if any.
    #[must_use]
    pub fn wall_clock(&self) -> Option<DateTime<Utc>> {
        self.wall_clock
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns a numeric payload field as `f64`.
    #[must_use]
    pub fn field_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }

    /// Deserializes the payload into a typed view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.payload.clone()))?)
    }

    /// Checks the naming rules for the type and producer id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] for a malformed type or producer id.
    pub fn validate(&self) -> Result<()> {
        validate_event_type(&self.event_type)?;
        validate_producer_id(&self.producer_id)
            .map_err(|_| Error::InvalidEvent(format!("invalid producer id {:?}", self.producer_id)))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
