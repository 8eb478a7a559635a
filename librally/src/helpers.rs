use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

pub fn to_hex<S>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    hex::encode(bytes).serialize(s)
}

pub fn array_from_hex<'de, D, const N: usize>(de: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    let hex_str = String::deserialize(de)?;
    let mut result = [0u8; N];
    hex::decode_to_slice(hex_str, &mut result)
        .map_err(|e| serde::de::Error::custom(format!("Invalid hex string: {e}")))?;
    Ok(result)
}

/// A UTC Unix timestamp representing seconds since January 1, 1970.
///
/// Used for challenge expiries, which the adjudicator reports in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(seconds: u64) -> Self {
        Self(seconds)
    }

    /// Returns the current UTC time as a Timestamp.
    pub fn now() -> Self {
        Self(Utc::now().timestamp() as u64)
    }

    /// Creates a Timestamp that is `duration` time from now.
    pub fn from_now(duration: Duration) -> Self {
        Self(Utc::now().timestamp() as u64 + duration.as_secs())
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// The time remaining until this timestamp, or zero if it has passed.
    pub fn remaining(&self) -> Duration {
        Duration::from_secs(self.0.saturating_sub(Self::now().0))
    }

    pub fn has_passed(&self) -> bool {
        Self::now() >= *self
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
