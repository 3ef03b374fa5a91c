// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rolling metrics over bus events.
//!
//! An [`EventWindow`] keeps time-ordered samples bounded by a
//! [`RetentionPolicy`]; a [`KeyedMetric`] keeps one window per producer,
//! per type, or per custom key and summarizes them as [`WindowStats`].
//! Statistics of an empty window are `None`, never zero.

mod keyed_metric;
mod retention;
mod window;

pub use keyed_metric::{DEFAULT_WINDOW_LEN, KeyBy, KeyFn, KeyedMetric, ValueFn};
pub use retention::{CompositePolicy, MaxAgePolicy, MaxLengthPolicy, RetentionPolicy};
pub use window::{EventWindow, WindowStats};
