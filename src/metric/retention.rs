// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retention policies for event windows.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::event::Timestamp;

/// Decides which samples an [`EventWindow`](super::EventWindow) drops.
///
/// Windows are ordered oldest first, so a policy only ever evicts a
/// prefix: it returns how many of the oldest samples to drop.
pub trait RetentionPolicy: fmt::Debug + Send + Sync {
    /// Returns the number of leading samples to evict.
    ///
    /// `timestamps` is non-empty and sorted in non-decreasing order.
    fn evict_count(&self, timestamps: &[Timestamp]) -> usize;
}

/// Drops samples older than `max_age` relative to the newest sample.
///
/// A sample exactly `max_age` older than the newest is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxAgePolicy {
    max_age: Duration,
}

impl MaxAgePolicy {
    /// Creates the policy.
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// Returns the maximum age.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl RetentionPolicy for MaxAgePolicy {
    fn evict_count(&self, timestamps: &[Timestamp]) -> usize {
        let Some(&newest) = timestamps.last() else {
            return 0;
        };
        timestamps.partition_point(|ts| newest.saturating_duration_since(*ts) > self.max_age)
    }
}

/// Keeps only the `max_len` most recent samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxLengthPolicy {
    max_len: usize,
}

impl MaxLengthPolicy {
    /// Creates the policy. A length of zero is raised to one.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
        }
    }

    /// Returns the maximum length.
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

impl RetentionPolicy for MaxLengthPolicy {
    fn evict_count(&self, timestamps: &[Timestamp]) -> usize {
        timestamps.len().saturating_sub(self.max_len)
    }
}

/// Applies several policies; a sample is kept only if all of them keep it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use signalbus::metric::{CompositePolicy, MaxAgePolicy, MaxLengthPolicy};
///
/// let policy = CompositePolicy::new()
///     .with(MaxAgePolicy::new(Duration::from_secs(30)))
///     .with(MaxLengthPolicy::new(500));
/// assert_eq!(policy.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompositePolicy {
    policies: Vec<Arc<dyn RetentionPolicy>>,
}

impl CompositePolicy {
    /// Creates an empty composite that retains everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a policy.
    #[must_use]
    pub fn with(mut self, policy: impl RetentionPolicy + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Returns the number of policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns `true` if no policy was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl RetentionPolicy for CompositePolicy {
    fn evict_count(&self, timestamps: &[Timestamp]) -> usize {
        self.policies
            .iter()
            .map(|policy| policy.evict_count(timestamps))
            .max()
            .unwrap_or(0)
    }
}
