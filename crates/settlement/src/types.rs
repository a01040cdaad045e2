use crate::constants::NANOS_PER_UNIT;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base units (nano-units). `1 unit == NANOS_PER_UNIT`.
pub type Amount = u64;

pub type EpochId = u64;

/// Unix seconds.
pub type Timestamp = i64;

/// Basis points, 10_000 == 100%.
pub type Bps = u16;

/// Participant identity, which doubles as the payout destination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Who is calling and when. The host runtime supplies both; the engine never reads a clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub caller: ParticipantId,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: impl Into<ParticipantId>, now: Timestamp) -> Self {
        Self {
            caller: caller.into(),
            now,
        }
    }
}

/// Whole units to base units, saturating.
pub const fn units(whole: u64) -> Amount {
    whole.saturating_mul(NANOS_PER_UNIT)
}

/// Render base units as a decimal unit string, e.g. `48.764614000`.
pub fn format_amount(amount: Amount) -> String {
    format!(
        "{}.{:09}",
        amount / NANOS_PER_UNIT,
        amount % NANOS_PER_UNIT
    )
}
