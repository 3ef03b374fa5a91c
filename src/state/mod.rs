// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keyed state management.
//!
//! The [`StateStore`] keeps the last payload of every `(producer_id, type)`
//! pair plus one aggregate per type, combined according to the type's
//! [`AggregationContract`].
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use signalbus::event::{Event, Timestamp};
//! use signalbus::state::StateStore;
//!
//! let mut store = StateStore::new();
//! let payload = json!({"port": 1, "pressed": true}).as_object().cloned().unwrap();
//! store.update(&Event::new("switch.pressed", "switch-1", Timestamp::ZERO, payload));
//!
//! let latest = store.get_latest("switch.pressed", Some("switch-1")).unwrap();
//! assert_eq!(latest.value, json!({"port": 1, "pressed": true}));
//! ```

mod aggregation;
mod state_store;

pub use aggregation::{AggregationContract, CustomAggregator, CustomFold};
pub use state_store::{DEFAULT_SEQUENCE_LEN, StateSnapshot, StateStore};
