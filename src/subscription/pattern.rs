// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event type patterns used by subscriptions.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::event::naming::{is_slug, validate_event_type};
use crate::lifecycle::is_lifecycle_topic;

/// Selects which event types a subscription receives.
///
/// # Examples
///
/// ```
/// use signalbus::subscription::TypePattern;
///
/// let exact: TypePattern = "switch.pressed".parse().unwrap();
/// let domain: TypePattern = "switch.*".parse().unwrap();
/// let lifecycle: TypePattern = "system.lifecycle.*".parse().unwrap();
///
/// assert!(exact.matches("switch.pressed"));
/// assert!(domain.matches("switch.released"));
/// assert!(!domain.matches("switchboard.pressed"));
/// assert!(lifecycle.matches("system.lifecycle.connected"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypePattern {
    /// Every event on the bus (`*`).
    All,
    /// Exactly one event type.
    Exact(String),
    /// Every type under a domain or domain/qualifier prefix (`switch.*`).
    Prefix(String),
}

impl TypePattern {
    /// Parses a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the pattern is neither `*`, a
    /// valid event type, a reserved lifecycle topic, nor one or two slugs
    /// followed by `.*`.
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern == "*" {
            return Ok(Self::All);
        }
        if is_lifecycle_topic(pattern) {
            return Ok(Self::Exact(pattern.to_string()));
        }

        if let Some(prefix) = pattern.strip_suffix(".*") {
            let segments: Vec<&str> = prefix.split('.').collect();
            if (1..=2).contains(&segments.len()) && segments.iter().all(|s| is_slug(s)) {
                return Ok(Self::Prefix(prefix.to_string()));
            }
            return Err(Error::InvalidPattern(pattern.to_string()));
        }

        validate_event_type(pattern).map_err(|_| Error::InvalidPattern(pattern.to_string()))?;
        Ok(Self::Exact(pattern.to_string()))
    }

    /// Returns `true` if `event_type` is selected by this pattern.
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(exact) => exact == event_type,
            Self::Prefix(prefix) => event_type
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.')),
        }
    }
}

impl FromStr for TypePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "*"),
            Self::Exact(exact) => write!(f, "{exact}"),
            Self::Prefix(prefix) => write!(f, "{prefix}.*"),
        }
    }
}
