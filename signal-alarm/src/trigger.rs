//! Decides whether a signal is due.
//!
//! [`should_fire`] is a level check evaluated on every poll tick: it is true
//! for the whole one-second window that starts at the signal's trigger
//! instant. Keeping a signal from firing again on the following ticks is
//! the job of the [`DeduplicationRegistry`](crate::registry::DeduplicationRegistry),
//! not of this function.

use std::time::Duration;

use time::OffsetDateTime;

use crate::signal::{AntidelaySeconds, Signal};

/// Polling cadence of the engine, and the width of the firing window.
pub const EVALUATION_WINDOW: Duration = Duration::from_secs(1);

const WINDOW: time::Duration = time::Duration::new(
    EVALUATION_WINDOW.as_secs() as i64,
    EVALUATION_WINDOW.subsec_nanos() as i32,
);

/// Instant at which `signal` becomes eligible under `antidelay`.
///
/// `None` when the lead time reaches before the earliest representable
/// instant.
pub fn fire_at(signal: &Signal, antidelay: AntidelaySeconds) -> Option<OffsetDateTime> {
    signal
        .timestamp
        .checked_sub(time::Duration::seconds(i64::from(antidelay.0)))
}

/// True iff `now` falls inside `[fire_at, fire_at + EVALUATION_WINDOW)`.
///
/// A signal without a representable trigger instant is never due.
pub fn should_fire(signal: &Signal, now: OffsetDateTime, antidelay: AntidelaySeconds) -> bool {
    let Some(start) = fire_at(signal, antidelay) else {
        return false;
    };
    match start.checked_add(WINDOW) {
        Some(end) => now >= start && now < end,
        // Window runs past the last representable instant.
        None => now >= start,
    }
}

/// True once the firing window has closed without the signal firing.
pub fn is_missed(signal: &Signal, now: OffsetDateTime, antidelay: AntidelaySeconds) -> bool {
    match fire_at(signal, antidelay).map(|start| start.checked_add(WINDOW)) {
        Some(Some(end)) => now >= end,
        Some(None) => false,
        None => true,
    }
}

/// Middle of the firing window, the safest instant for an external wake-up.
pub fn window_midpoint(signal: &Signal, antidelay: AntidelaySeconds) -> Option<OffsetDateTime> {
    fire_at(signal, antidelay)?.checked_add(WINDOW / 2)
}

/// Whether `signal` can be scheduled under `antidelay`: a non-negative
/// timestamp whose whole firing window is representable.
pub fn is_schedulable(signal: &Signal, antidelay: AntidelaySeconds) -> bool {
    signal.timestamp.unix_timestamp() >= 0
        && fire_at(signal, antidelay).is_some_and(|start| start.checked_add(WINDOW).is_some())
}
