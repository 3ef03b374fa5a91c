// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Naming rules for event types and producer ids.
//!
//! - A producer id matches `[a-z0-9-]+`.
//! - An event type is `<slug>.<slug>` or `<slug>.<slug>.<slug>` where
//!   every slug matches `[a-z0-9]+`.

use crate::error::{Error, Result};

/// Producer id used for synthetic lifecycle events.
pub const SYSTEM_PRODUCER_ID: &str = "system";

/// Domain reserved for events emitted by the bus itself.
pub const SYSTEM_DOMAIN: &str = "system";

const MIN_TYPE_SEGMENTS: usize = 2;
const MAX_TYPE_SEGMENTS: usize = 3;

/// Returns `true` if `segment` is a non-empty run of `[a-z0-9]`.
#[must_use]
pub fn is_slug(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Validates an event type such as `switch.pressed` or `accel.raw.sampled`.
///
/// # Errors
///
/// Returns [`Error::InvalidEvent`] if the type does not have two or three
/// dot-separated slugs.
pub fn validate_event_type(event_type: &str) -> Result<()> {
    let segments: Vec<&str> = event_type.split('.').collect();
    if !(MIN_TYPE_SEGMENTS..=MAX_TYPE_SEGMENTS).contains(&segments.len()) {
        return Err(Error::InvalidEvent(format!(
            "type {event_type:?} must have 2 or 3 segments"
        )));
    }
    if let Some(bad) = segments.iter().find(|s| !is_slug(s)) {
        return Err(Error::InvalidEvent(format!(
            "type {event_type:?} has invalid segment {bad:?}"
        )));
    }
    Ok(())
}

/// Validates a producer id such as `accel-a`.
///
/// # Errors
///
/// Returns [`Error::InvalidProducerId`] if the id is empty or contains
/// anything outside `[a-z0-9-]`.
pub fn validate_producer_id(producer_id: &str) -> Result<()> {
    let valid = !producer_id.is_empty()
        && producer_id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidProducerId(producer_id.to_string()))
    }
}

/// Returns `true` if the type lives in the reserved `system` domain.
#[must_use]
pub fn is_reserved_type(event_type: &str) -> bool {
    event_type.split('.').next() == Some(SYSTEM_DOMAIN)
}
