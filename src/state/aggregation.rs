// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Aggregation contracts.
//!
//! An aggregation contract decides how the latest payloads of every
//! producer of a type are combined into the type's shared aggregate.
//!
//! - [`AggregationContract::Overwrite`] - most recent payload wins (default)
//! - [`AggregationContract::Sum`] - field-wise sum across live producers
//! - [`AggregationContract::Difference`] - newest payload minus a baseline
//! - [`AggregationContract::Sequence`] - bounded append-only history
//! - [`AggregationContract::Custom`] - a named, deterministic fold function

use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::event::{Event, Payload};

/// Fold function signature for custom aggregation.
///
/// Receives the previous aggregate (if any) and the new event, returns the
/// new aggregate and the snapshot to store for the emitting producer.
pub type CustomFold = dyn Fn(Option<&Value>, &Event) -> (Value, Value) + Send + Sync;

/// A named custom aggregation function.
///
/// The function must be deterministic and free of side effects: the
/// store may call it while holding its write lock.
///
/// # Examples
///
/// ```
/// use serde_json::{json, Value};
/// use signalbus::state::CustomAggregator;
///
/// // Keep the maximum "value" ever seen.
/// let max = CustomAggregator::new("max-value", |previous, event| {
///     let current = event.field_f64("value").unwrap_or(f64::MIN);
///     let best = previous
///         .and_then(|p| p.get("value"))
///         .and_then(Value::as_f64)
///         .map_or(current, |p| p.max(current));
///     (json!({"value": best}), Value::Object(event.payload().clone()))
/// });
/// assert_eq!(max.name(), "max-value");
/// ```
#[derive(Clone)]
pub struct CustomAggregator {
    name: String,
    fold: Arc<CustomFold>,
}

impl CustomAggregator {
    /// Creates a custom aggregator.
    pub fn new<F>(name: impl Into<String>, fold: F) -> Self
    where
        F: Fn(Option<&Value>, &Event) -> (Value, Value) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fold: Arc::new(fold),
        }
    }

    /// Returns the aggregator's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the fold.
    pub(crate) fn fold(&self, previous: Option<&Value>, event: &Event) -> (Value, Value) {
        (self.fold)(previous, event)
    }
}

impl fmt::Debug for CustomAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAggregator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// How producers of the same event type are combined.
#[derive(Debug, Clone, Default)]
pub enum AggregationContract {
    /// Aggregate is the most recently emitted payload.
    #[default]
    Overwrite,
    /// Aggregate is the field-wise sum of every live producer's latest
    /// payload. Non-numeric fields are ignored.
    Sum,
    /// Aggregate is the newest payload's numeric fields minus the previous
    /// payload. The first payload after a reset becomes the baseline.
    ///
    /// The baseline is the previous payload of the type from any producer,
    /// so two producers sharing a `Difference` type yield deltas between
    /// each other. Declare one type per producer for per-device deltas.
    Difference,
    /// Aggregate is the list of emitted payloads, oldest first.
    Sequence {
        /// Maximum number of payloads kept; `None` uses the store default.
        max_len: Option<usize>,
    },
    /// Aggregate is produced by a custom fold.
    Custom(CustomAggregator),
}

impl AggregationContract {
    /// A sequence bounded to `max_len` payloads.
    #[must_use]
    pub fn sequence(max_len: usize) -> Self {
        Self::Sequence {
            max_len: Some(max_len),
        }
    }

    /// Returns the contract's name, e.g. `sum` or `custom:max-value`.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Overwrite => "overwrite".to_string(),
            Self::Sum => "sum".to_string(),
            Self::Difference => "difference".to_string(),
            Self::Sequence { .. } => "sequence".to_string(),
            Self::Custom(custom) => format!("custom:{}", custom.name()),
        }
    }

    /// Returns `true` if the aggregate only reflects currently live
    /// producers and must be refolded when one leaves.
    #[must_use]
    pub fn tracks_live_producers(&self) -> bool {
        matches!(self, Self::Sum)
    }

    /// Returns `true` if both contracts would aggregate identically.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Sequence { max_len: a }, Self::Sequence { max_len: b }) => a == b,
            _ => self.name() == other.name(),
        }
    }
}

impl fmt::Display for AggregationContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Running numeric value that stays integral as long as every input is.
#[derive(Debug, Clone, Copy)]
enum Accumulator {
    Int(i64),
    Float(f64),
}

impl Accumulator {
    fn from_value(value: &Value) -> Option<Self> {
        let Value::Number(number) = value else {
            return None;
        };
        number
            .as_i64()
            .map(Self::Int)
            .or_else(|| number.as_f64().map(Self::Float))
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map_or_else(|| Self::Float(self.as_f64() + other.as_f64()), Self::Int),
            _ => Self::Float(self.as_f64() + other.as_f64()),
        }
    }

    fn sub(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_sub(b)
                .map_or_else(|| Self::Float(self.as_f64() - other.as_f64()), Self::Int),
            _ => Self::Float(self.as_f64() - other.as_f64()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Int(i) => Value::from(i),
            Self::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        }
    }
}

/// Field-wise sum of the numeric fields of every payload.
pub(crate) fn sum_fields<'a>(payloads: impl IntoIterator<Item = &'a Value>) -> Payload {
    let mut totals: Vec<(String, Accumulator)> = Vec::new();

    for payload in payloads {
        let Some(fields) = payload.as_object() else {
            continue;
        };
        for (key, value) in fields {
            let Some(number) = Accumulator::from_value(value) else {
                continue;
            };
            match totals.iter_mut().find(|(k, _)| k == key) {
                Some((_, total)) => *total = total.add(number),
                None => totals.push((key.clone(), number)),
            }
        }
    }

    totals
        .into_iter()
        .map(|(key, total)| (key, total.into_value()))
        .collect()
}

/// Numeric fields of `current` minus the matching fields of `baseline`.
///
/// Fields missing or non-numeric on either side are dropped.
pub(crate) fn difference_fields(current: &Payload, baseline: &Payload) -> Payload {
    current
        .iter()
        .filter_map(|(key, value)| {
            let now = Accumulator::from_value(value)?;
            let base = baseline.get(key).and_then(Accumulator::from_value)?;
            Some((key.clone(), now.sub(base).into_value()))
        })
        .collect()
}
