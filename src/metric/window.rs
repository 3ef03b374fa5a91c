// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-ordered sample window.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};

use crate::error::{Error, Result};
use crate::event::Timestamp;

use super::RetentionPolicy;

/// Ordered `(timestamp, value)` samples bounded by a retention policy.
///
/// Timestamps never decrease. The window is pruned on
/// [`append`](Self::append) only, so reads never lose samples.
///
/// # Examples
///
/// ```
/// use signalbus::event::Timestamp;
/// use signalbus::metric::{EventWindow, MaxLengthPolicy};
///
/// let mut window = EventWindow::new(MaxLengthPolicy::new(2));
/// for (ms, value) in [(10, 1.0), (20, 2.0), (30, 3.0)] {
///     window.append(Timestamp::from_millis(ms), value).unwrap();
/// }
///
/// let values: Vec<f64> = window.values().copied().collect();
/// assert_eq!(values, vec![2.0, 3.0]);
/// assert!(window.append(Timestamp::from_millis(5), 0.0).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct EventWindow<T = f64> {
    timestamps: VecDeque<Timestamp>,
    values: VecDeque<T>,
    policy: Arc<dyn RetentionPolicy>,
}

impl<T> EventWindow<T> {
    /// Creates an empty window.
    #[must_use]
    pub fn new(policy: impl RetentionPolicy + 'static) -> Self {
        Self::with_shared_policy(Arc::new(policy))
    }

    /// Creates an empty window sharing a policy with other windows.
    #[must_use]
    pub fn with_shared_policy(policy: Arc<dyn RetentionPolicy>) -> Self {
        Self {
            timestamps: VecDeque::new(),
            values: VecDeque::new(),
            policy,
        }
    }

    /// Appends a sample, then prunes according to the policy.
    ///
    /// Samples with the same timestamp as the newest one are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrderSample`] if `timestamp` is older than the
    /// newest sample. The window is left unchanged.
    pub fn append(&mut self, timestamp: Timestamp, value: T) -> Result<()> {
        if let Some(&newest) = self.timestamps.back()
            && timestamp < newest
        {
            return Err(Error::OutOfOrderSample { timestamp, newest });
        }

        self.timestamps.push_back(timestamp);
        self.values.push_back(value);
        self.prune();
        Ok(())
    }

    fn prune(&mut self) {
        let evict = self
            .policy
            .evict_count(self.timestamps.make_contiguous())
            .min(self.timestamps.len());
        if evict > 0 {
            self.timestamps.drain(..evict);
            self.values.drain(..evict);
        }
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Returns `true` if the window holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Returns the timestamp of the oldest sample.
    #[must_use]
    pub fn oldest(&self) -> Option<Timestamp> {
        self.timestamps.front().copied()
    }

    /// Returns the timestamp of the newest sample.
    #[must_use]
    pub fn newest(&self) -> Option<Timestamp> {
        self.timestamps.back().copied()
    }

    /// Iterates over the values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    /// Iterates over `(timestamp, value)` samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &T)> {
        self.timestamps.iter().copied().zip(self.values.iter())
    }
}

/// Summary statistics over a window's current contents.
///
/// Everything except `count` and `sum` is `None` for an empty window.
/// `rate_per_sec` also needs two samples spread over a non-zero span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    /// Number of samples.
    pub count: usize,
    /// Sum of the values.
    pub sum: f64,
    /// Smallest value.
    pub min: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Samples per second between the oldest and newest sample.
    pub rate_per_sec: Option<f64>,
    /// Median.
    pub p50: Option<f64>,
    /// 90th percentile.
    pub p90: Option<f64>,
    /// 99th percentile.
    pub p99: Option<f64>,
}

impl WindowStats {
    /// Statistics of an empty window.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
            mean: None,
            rate_per_sec: None,
            p50: None,
            p90: None,
            p99: None,
        }
    }
}

impl EventWindow<f64> {
    /// Computes summary statistics without modifying the window.
    #[must_use]
    pub fn stats(&self) -> WindowStats {
        if self.is_empty() {
            return WindowStats::empty();
        }

        let mut data = Data::new(self.values.iter().copied().collect::<Vec<f64>>());
        WindowStats {
            count: self.len(),
            sum: self.values.iter().sum(),
            min: Some(data.min()),
            max: Some(data.max()),
            mean: data.mean(),
            rate_per_sec: self.rate_per_sec(),
            p50: Some(data.quantile(0.5)),
            p90: Some(data.quantile(0.9)),
            p99: Some(data.quantile(0.99)),
        }
    }

    /// Returns the `q` quantile (`0.0..=1.0`) of the values.
    ///
    /// Returns `None` for an empty window or a `q` outside the range.
    #[must_use]
    pub fn percentile(&self, q: f64) -> Option<f64> {
        if self.is_empty() || !(0.0..=1.0).contains(&q) {
            return None;
        }
        let mut data = Data::new(self.values.iter().copied().collect::<Vec<f64>>());
        Some(data.quantile(q))
    }

    #[allow(clippy::cast_precision_loss)]
    fn rate_per_sec(&self) -> Option<f64> {
        let span = self.newest()?.saturating_duration_since(self.oldest()?);
        if self.len() < 2 || span.is_zero() {
            return None;
        }
        Some((self.len() - 1) as f64 / span.as_secs_f64())
    }
}
