//! Signal definitions and the keys derived from them.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Expected price direction of a signal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Deserialize, Serialize, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// A user-defined alarm: ring for `asset` moving in `direction` at
/// `timestamp`.
///
/// Signals are never mutated. Editing one produces a new timestamp and
/// therefore a new [`SignalIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, ToSchema)]
pub struct Signal {
    pub asset: String,
    pub direction: Direction,
    /// Trigger instant, Unix seconds on the wire.
    #[serde(with = "time::serde::timestamp")]
    #[schema(value_type = i64)]
    pub timestamp: OffsetDateTime,
}

impl Signal {
    /// Create a signal. Sub-second precision is dropped.
    pub fn new(asset: impl Into<String>, direction: Direction, timestamp: OffsetDateTime) -> Self {
        let timestamp = timestamp - time::Duration::nanoseconds(timestamp.nanosecond() as i64);
        Self {
            asset: asset.into(),
            direction,
            timestamp,
        }
    }

    pub fn identity(&self) -> SignalIdentity {
        SignalIdentity(format!(
            "{}|{}|{}",
            self.asset,
            self.direction,
            self.timestamp.unix_timestamp()
        ))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {}",
            self.asset,
            self.direction,
            self.timestamp.unix_timestamp()
        )
    }
}

/// Deduplication key: asset, direction and timestamp.
///
/// Two signals with identical fields share an identity and are the same
/// alarm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalIdentity(String);

impl SignalIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lead time subtracted from every signal's timestamp.
///
/// Unsigned on purpose: a negative antidelay cannot be represented, so it
/// is rejected wherever the value is parsed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, ToSchema,
)]
#[serde(transparent)]
pub struct AntidelaySeconds(pub u32);

impl AntidelaySeconds {
    pub const ZERO: Self = Self(0);

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0 as u64)
    }
}

impl From<u32> for AntidelaySeconds {
    fn from(secs: u32) -> Self {
        Self(secs)
    }
}

impl fmt::Display for AntidelaySeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
