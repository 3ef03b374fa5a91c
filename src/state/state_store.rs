// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keyed state store.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::{Event, Payload, Timestamp};

use super::aggregation::{AggregationContract, difference_fields, sum_fields};

/// Default bound for [`AggregationContract::Sequence`] without an explicit length.
pub const DEFAULT_SEQUENCE_LEN: usize = 64;

/// A value read from the store together with the time it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// The stored payload or aggregate.
    pub value: Value,
    /// Timestamp of the event that last changed it.
    pub timestamp: Timestamp,
}

/// Last snapshot of one `(producer_id, type)` pair.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    timestamp: Timestamp,
    /// Cleared when the producer disconnects or is replaced.
    live: bool,
}

/// Everything the store knows about one event type.
#[derive(Debug)]
struct TypeState {
    contract: AggregationContract,
    aggregate: Option<Value>,
    updated_at: Option<Timestamp>,
    /// Previous payload, used by [`AggregationContract::Difference`].
    baseline: Option<Payload>,
    entries: BTreeMap<String, Entry>,
}

impl TypeState {
    fn new(contract: AggregationContract) -> Self {
        Self {
            contract,
            aggregate: None,
            updated_at: None,
            baseline: None,
            entries: BTreeMap::new(),
        }
    }

    fn has_live_entries(&self) -> bool {
        self.entries.values().any(|e| e.live)
    }

    fn refold_sum(&mut self) {
        self.aggregate = if self.has_live_entries() {
            Some(Value::Object(sum_fields(
                self.entries.values().filter(|e| e.live).map(|e| &e.value),
            )))
        } else {
            None
        };
    }

    fn reset(&mut self) {
        self.aggregate = None;
        self.baseline = None;
        self.updated_at = None;
    }
}

/// Per-type, per-producer state with pluggable aggregation.
///
/// The store itself is not synchronized; [`EventBus`](crate::EventBus)
/// owns it behind a single `RwLock` so that every fold is atomic with
/// respect to concurrent emits and readers only see committed aggregates.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use signalbus::event::{Event, Timestamp};
/// use signalbus::state::{AggregationContract, StateStore};
///
/// let mut store = StateStore::new();
/// store.bind_contract("accel.magnitude", AggregationContract::Sum).unwrap();
///
/// for (producer, value) in [("accel-a", 2.0), ("accel-b", 3.0)] {
///     let payload = json!({"value": value}).as_object().cloned().unwrap();
///     store.update(&Event::new("accel.magnitude", producer, Timestamp::ZERO, payload));
/// }
///
/// let total = store.get_latest("accel.magnitude", None).unwrap();
/// assert_eq!(total.value, json!({"value": 5.0}));
/// assert_eq!(store.get_all("accel.magnitude").len(), 2);
/// ```
#[derive(Debug)]
pub struct StateStore {
    types: HashMap<String, TypeState>,
    default_sequence_len: usize,
}

impl StateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_sequence_len(DEFAULT_SEQUENCE_LEN)
    }

    /// Creates an empty store using `len` for unbounded sequence contracts.
    #[must_use]
    pub fn with_default_sequence_len(len: usize) -> Self {
        Self {
            types: HashMap::new(),
            default_sequence_len: len.max(1),
        }
    }

    /// Binds an aggregation contract to a type.
    ///
    /// Binding the same contract twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AggregationConflict`] if the type is already bound
    /// to a different contract.
    pub fn bind_contract(&mut self, event_type: &str, contract: AggregationContract) -> Result<()> {
        if let Some(state) = self.types.get(event_type) {
            if state.contract.is_compatible_with(&contract) {
                return Ok(());
            }
            return Err(Error::AggregationConflict {
                event_type: event_type.to_string(),
                existing: state.contract.name(),
                requested: contract.name(),
            });
        }

        self.types
            .insert(event_type.to_string(), TypeState::new(contract));
        Ok(())
    }

    /// Returns the contract bound to a type, if any.
    #[must_use]
    pub fn contract(&self, event_type: &str) -> Option<&AggregationContract> {
        self.types.get(event_type).map(|s| &s.contract)
    }

    /// Folds an event into the producer's entry and the type's aggregate.
    ///
    /// Types without a bound contract use [`AggregationContract::Overwrite`].
    /// The event is assumed to be valid; the bus checks it before calling.
    pub fn update(&mut self, event: &Event) {
        let default_sequence_len = self.default_sequence_len;
        let state = self
            .types
            .entry(event.event_type().to_string())
            .or_insert_with(|| TypeState::new(AggregationContract::default()));

        let payload = event.payload();
        let contract = state.contract.clone();
        let snapshot = match &contract {
            AggregationContract::Overwrite => {
                state.aggregate = Some(Value::Object(payload.clone()));
                Value::Object(payload.clone())
            }
            AggregationContract::Sum => Value::Object(payload.clone()),
            AggregationContract::Difference => {
                let baseline = state.baseline.as_ref().unwrap_or(payload);
                state.aggregate = Some(Value::Object(difference_fields(payload, baseline)));
                state.baseline = Some(payload.clone());
                Value::Object(payload.clone())
            }
            AggregationContract::Sequence { max_len } => {
                let cap = max_len.unwrap_or(default_sequence_len).max(1);
                let mut history = match state.aggregate.take() {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                history.push(Value::Object(payload.clone()));
                if history.len() > cap {
                    let excess = history.len() - cap;
                    history.drain(..excess);
                }
                state.aggregate = Some(Value::Array(history));
                Value::Object(payload.clone())
            }
            AggregationContract::Custom(custom) => {
                let (aggregate, snapshot) = custom.fold(state.aggregate.as_ref(), event);
                state.aggregate = Some(aggregate);
                snapshot
            }
        };

        state.entries.insert(
            event.producer_id().to_string(),
            Entry {
                value: snapshot,
                timestamp: event.timestamp(),
                live: true,
            },
        );
        if contract.tracks_live_producers() {
            state.refold_sum();
        }
        state.updated_at = Some(event.timestamp());
    }

    /// Returns the latest value for a type.
    ///
    /// With a producer id, returns that producer's last snapshot, even if
    /// it has since disconnected. Without one, returns the type's aggregate.
    #[must_use]
    pub fn get_latest(&self, event_type: &str, producer_id: Option<&str>) -> Option<StateSnapshot> {
        let state = self.types.get(event_type)?;
        match producer_id {
            Some(producer_id) => state.entries.get(producer_id).map(|entry| StateSnapshot {
                value: entry.value.clone(),
                timestamp: entry.timestamp,
            }),
            None => Some(StateSnapshot {
                value: state.aggregate.clone()?,
                timestamp: state.updated_at?,
            }),
        }
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
        self.get_latest(event_type, producer_id)
            .map(|snapshot| serde_json::from_value(snapshot.value))
            .transpose()
            .map_err(Error::from)
    }

    /// Returns the last snapshot of every live producer of a type.
    #[must_use]
    pub fn get_all(&self, event_type: &str) -> BTreeMap<String, Value> {
        self.types
            .get(event_type)
            .map(|state| {
                state
                    .entries
                    .iter()
                    .filter(|(_, entry)| entry.live)
                    .map(|(producer, entry)| (producer.clone(), entry.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Clears a type's aggregate so the next emit starts from scratch.
    ///
    /// Per-producer entries are kept. Returns `false` if the type is unknown.
    pub fn reset_aggregate(&mut self, event_type: &str) -> bool {
        match self.types.get_mut(event_type) {
            Some(state) => {
                state.reset();
                true
            }
            None => false,
        }
    }

    /// Withdraws a producer from every live aggregate.
    ///
    /// Its entries stay readable through [`get_latest`](Self::get_latest)
    /// but no longer appear in [`get_all`](Self::get_all) or in sums.
    pub(crate) fn retire_producer(&mut self, producer_id: &str) {
        for (event_type, state) in &mut self.types {
            let Some(entry) = state.entries.get_mut(producer_id) else {
                continue;
            };
            if !entry.live {
                continue;
            }
            entry.live = false;

            if state.contract.tracks_live_producers() {
                state.refold_sum();
            } else if matches!(state.contract, AggregationContract::Difference)
                && !state.has_live_entries()
            {
                state.reset();
            }
            tracing::debug!(%producer_id, %event_type, "Withdrew producer from aggregate");
        }
    }

    /// Returns the known event types, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.types.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CustomAggregator;
    use serde::Deserialize;
    use serde_json::json;

    fn event(event_type: &str, producer: &str, millis: u64, payload: Value) -> Event {
        Event::new(
            event_type,
            producer,
            Timestamp::from_millis(millis),
            payload.as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn overwrite_is_default() {
        let mut store = StateStore::new();
        store.update(&event("switch.pressed", "switch-1", 1, json!({"port": 1, "pressed": true})));
        store.update(&event("switch.pressed", "switch-2", 2, json!({"port": 2, "pressed": false})));

        let latest = store.get_latest("switch.pressed", Some("switch-1")).unwrap();
        assert_eq!(latest.value, json!({"port": 1, "pressed": true}));
        assert_eq!(latest.timestamp, Timestamp::from_millis(1));

        let aggregate = store.get_latest("switch.pressed", None).unwrap();
        assert_eq!(aggregate.value, json!({"port": 2, "pressed": false}));
        assert_eq!(store.contract("switch.pressed").unwrap().name(), "overwrite");
    }

    #[test]
    fn unknown_keys_are_not_found() {
        let store = StateStore::new();
        assert!(store.get_latest("switch.pressed", None).is_none());
        assert!(store.get_latest("switch.pressed", Some("switch-1")).is_none());
        assert!(store.get_all("switch.pressed").is_empty());
    }

    #[test]
    fn sum_uses_latest_payload_per_producer() {
        let mut store = StateStore::new();
        store.bind_contract("accel.magnitude", AggregationContract::Sum).unwrap();

        store.update(&event("accel.magnitude", "accel-a", 1, json!({"value": 2.0})));
        store.update(&event("accel.magnitude", "accel-b", 2, json!({"value": 3.0})));
        store.update(&event("accel.magnitude", "accel-a", 3, json!({"value": 4.0})));

        let total = store.get_latest("accel.magnitude", None).unwrap();
        assert_eq!(total.value, json!({"value": 7.0}));
        assert_eq!(total.timestamp, Timestamp::from_millis(3));

        let all = store.get_all("accel.magnitude");
        assert_eq!(all.get("accel-a"), Some(&json!({"value": 4.0})));
        assert_eq!(all.get("accel-b"), Some(&json!({"value": 3.0})));
    }

    #[test]
    fn retire_refolds_sum_and_keeps_audit_entry() {
        let mut store = StateStore::new();
        store.bind_contract("accel.magnitude", AggregationContract::Sum).unwrap();
        store.update(&event("accel.magnitude", "accel-a", 1, json!({"value": 2.0})));
        store.update(&event("accel.magnitude", "accel-b", 2, json!({"value": 3.0})));

        store.retire_producer("accel-b");

        assert_eq!(
            store.get_latest("accel.magnitude", None).unwrap().value,
            json!({"value": 2.0})
        );
        assert!(!store.get_all("accel.magnitude").contains_key("accel-b"));
        assert_eq!(
            store.get_latest("accel.magnitude", Some("accel-b")).unwrap().value,
            json!({"value": 3.0})
        );

        store.retire_producer("accel-a");
        assert!(store.get_latest("accel.magnitude", None).is_none());
    }

    #[test]
    fn difference_tracks_previous_payload() {
        let mut store = StateStore::new();
        store.bind_contract("probe.temp", AggregationContract::Difference).unwrap();

        store.update(&event("probe.temp", "probe-1", 1, json!({"celsius": 20.0})));
        assert_eq!(
            store.get_latest("probe.temp", None).unwrap().value,
            json!({"celsius": 0.0})
        );

        store.update(&event("probe.temp", "probe-1", 2, json!({"celsius": 21.5})));
        assert_eq!(
            store.get_latest("probe.temp", None).unwrap().value,
            json!({"celsius": 1.5})
        );

        assert!(store.reset_aggregate("probe.temp"));
        assert!(store.get_latest("probe.temp", None).is_none());
        store.update(&event("probe.temp", "probe-1", 3, json!({"celsius": 30.0})));
        assert_eq!(
            store.get_latest("probe.temp", None).unwrap().value,
            json!({"celsius": 0.0})
        );
    }

    #[test]
    fn difference_baseline_is_shared_across_producers() {
        let mut store = StateStore::new();
        store.bind_contract("probe.temp", AggregationContract::Difference).unwrap();
        store.update(&event("probe.temp", "probe-1", 1, json!({"celsius": 20.0})));
        store.update(&event("probe.temp", "probe-2", 2, json!({"celsius": 26.0})));

        assert_eq!(
            store.get_latest("probe.temp", None).unwrap().value,
            json!({"celsius": 6.0})
        );
    }

    #[test]
    fn difference_resets_when_last_producer_leaves() {
        let mut store = StateStore::new();
        store.bind_contract("probe.temp", AggregationContract::Difference).unwrap();
        store.update(&event("probe.temp", "probe-1", 1, json!({"celsius": 20.0})));
        store.update(&event("probe.temp", "probe-1", 2, json!({"celsius": 25.0})));

        store.retire_producer("probe-1");
        assert!(store.get_latest("probe.temp", None).is_none());

        store.update(&event("probe.temp", "probe-2", 3, json!({"celsius": 40.0})));
        assert_eq!(
            store.get_latest("probe.temp", None).unwrap().value,
            json!({"celsius": 0.0})
        );
    }

    #[test]
    fn sequence_is_bounded() {
        let mut store = StateStore::new();
        store
            .bind_contract("pad.button", AggregationContract::sequence(3))
            .unwrap();

        for i in 0..5 {
            store.update(&event("pad.button", "pad-1", i, json!({"n": i})));
        }

        let history = store.get_latest("pad.button", None).unwrap().value;
        assert_eq!(history, json!([{"n": 2}, {"n": 3}, {"n": 4}]));
    }

    #[test]
    fn sequence_uses_store_default_len() {
        let mut store = StateStore::with_default_sequence_len(2);
        store
            .bind_contract("pad.button", AggregationContract::Sequence { max_len: None })
            .unwrap();
        for i in 0..4 {
            store.update(&event("pad.button", "pad-1", i, json!({"n": i})));
        }
        assert_eq!(
            store.get_latest("pad.button", None).unwrap().value,
            json!([{"n": 2}, {"n": 3}])
        );
    }

    #[test]
    fn custom_fold_controls_aggregate_and_snapshot() {
        let mut store = StateStore::new();
        let counter = CustomAggregator::new("count", |previous, event| {
            let count = previous.and_then(Value::as_u64).unwrap_or(0) + 1;
            (json!(count), json!({"seen": event.timestamp().as_nanos()}))
        });
        store
            .bind_contract("hr.beat", AggregationContract::Custom(counter))
            .unwrap();

        store.update(&event("hr.beat", "hrm-1", 1, json!({"bpm": 60})));
        store.update(&event("hr.beat", "hrm-1", 2, json!({"bpm": 62})));

        assert_eq!(store.get_latest("hr.beat", None).unwrap().value, json!(2));
        assert_eq!(
            store.get_latest("hr.beat", Some("hrm-1")).unwrap().value,
            json!({"seen": 2_000_000})
        );
    }

    #[test]
    fn conflicting_contract_is_rejected() {
        let mut store = StateStore::new();
        store.bind_contract("accel.magnitude", AggregationContract::Sum).unwrap();
        store.bind_contract("accel.magnitude", AggregationContract::Sum).unwrap();

        let err = store
            .bind_contract("accel.magnitude", AggregationContract::Overwrite)
            .unwrap_err();
        assert!(matches!(err, Error::AggregationConflict { .. }));
    }

    #[test]
    fn typed_view() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Pressed {
            port: u8,
            pressed: bool,
        }

        let mut store = StateStore::new();
        store.update(&event(
            "switch.pressed",
            "switch-1",
            1,
            json!({"port": 1, "pressed": true}),
        ));

        let typed: Option<Pressed> = store
            .get_latest_as("switch.pressed", Some("switch-1"))
            .unwrap();
        assert_eq!(typed, Some(Pressed { port: 1, pressed: true }));

        let missing: Option<Pressed> = store.get_latest_as("switch.pressed", Some("nope")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn event_types_sorted() {
        let mut store = StateStore::new();
        store.update(&event("switch.pressed", "switch-1", 1, json!({})));
        store.update(&event("accel.magnitude", "accel-a", 1, json!({})));
        assert_eq!(store.event_types(), vec!["accel.magnitude", "switch.pressed"]);
    }
}
