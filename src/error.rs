// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `signalbus` library.
//!
//! Every fallible operation on the bus, the state store, the producer
//! registry and the metric windows reports one of the variants below.
//! Subscriber callback failures are deliberately absent: they are logged
//! by the bus and never reach the emitting caller.

use thiserror::Error;

use crate::event::Timestamp;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The event is malformed: bad type syntax, bad producer id or a
    /// payload that is not a JSON object.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The producer is unknown, no longer live, or did not declare the
    /// event type at registration.
    #[error("producer {producer_id} is not authorized to emit {event_type}")]
    UnauthorizedProducer {
        /// The offending producer.
        producer_id: String,
        /// The event type it tried to emit.
        event_type: String,
    },

    /// A live registration already uses this producer id.
    #[error("producer {0} is already registered")]
    ProducerConflict(String),

    /// The producer id does not match `[a-z0-9-]+`.
    #[error("invalid producer id: {0:?}")]
    InvalidProducerId(String),

    /// A subscription pattern could not be parsed.
    #[error("invalid type pattern: {0:?}")]
    InvalidPattern(String),

    /// Ordinary producers may not declare reserved `system.*` types.
    #[error("event type {0} is reserved")]
    ReservedType(String),

    /// A type is already bound to a different aggregation contract.
    #[error("event type {event_type} uses {existing} aggregation, cannot rebind to {requested}")]
    AggregationConflict {
        /// The event type.
        event_type: String,
        /// Contract already bound to the type.
        existing: String,
        /// Contract requested by the new registration.
        requested: String,
    },

    /// The handle refers to a producer that was disconnected or replaced.
    #[error("producer {0} is not connected")]
    NotConnected(String),

    /// A window sample is older than the newest sample already held.
    #[error("sample at {timestamp} is older than newest sample at {newest}")]
    OutOfOrderSample {
        /// Timestamp of the rejected sample.
        timestamp: Timestamp,
        /// Newest timestamp in the window.
        newest: Timestamp,
    },

    /// JSON conversion failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates an [`Error::UnauthorizedProducer`].
    pub(crate) fn unauthorized(
        producer_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self::UnauthorizedProducer {
            producer_id: producer_id.into(),
            event_type: event_type.into(),
        }
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_display() {
        let err = Error::unauthorized("switch-1", "accel.magnitude");
        assert_eq!(
            err.to_string(),
            "producer switch-1 is not authorized to emit accel.magnitude"
        );
    }

    #[test]
    fn conflict_display() {
        let err = Error::ProducerConflict("accel-a".to_string());
        assert_eq!(err.to_string(), "producer accel-a is already registered");
    }

    #[test]
    fn aggregation_conflict_display() {
        let err = Error::AggregationConflict {
            event_type: "accel.magnitude".to_string(),
            existing: "sum".to_string(),
            requested: "overwrite".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "event type accel.magnitude uses sum aggregation, cannot rebind to overwrite"
        );
    }

    #[test]
    fn error_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn out_of_order_display() {
        let err = Error::OutOfOrderSample {
            timestamp: Timestamp::from_millis(5),
            newest: Timestamp::from_millis(10),
        };
        assert_eq!(
            err.to_string(),
            "sample at 0.005000s is older than newest sample at 0.010000s"
        );
    }
}
